//! Process-local views over mapped region bytes

use std::{
    ffi::c_void,
    mem,
    ops::{Deref, Range},
    ptr::NonNull,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::{debug, warn};
use memmap2::{Mmap, MmapMut};
use nix::{errno::Errno, sys::mman::munmap};

use crate::error::{RegionError, Result};

use super::config::Access;

#[derive(Debug)]
enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Mapping::ReadOnly(m) => &m[..],
            Mapping::ReadWrite(m) => &m[..],
        }
    }

    fn raw_parts(&self) -> (*mut u8, usize) {
        match self {
            Mapping::ReadOnly(m) => (m.as_ptr() as *mut u8, m.len()),
            Mapping::ReadWrite(m) => (m.as_ptr() as *mut u8, m.len()),
        }
    }
}

/// An owned, bounds-checked view over a mapped region.
///
/// The view's length is the region size at the time of mapping. Writes are
/// visible to every other mapping of the same object without a flush, but no
/// ordering is guaranteed across processes; callers needing coordination
/// must layer their own synchronization on top.
///
/// The mapping stays valid after the owning handle is closed or unlinked.
/// Dropping the view unmaps it; [`SharedRegion::unmap`](super::SharedRegion::unmap)
/// does the same but reports `munmap` failures.
#[derive(Debug)]
pub struct MappedView {
    name: String,
    access: Access,
    mapping: Option<Mapping>,
    lease: Arc<AtomicBool>,
}

impl MappedView {
    pub(crate) fn read_only(name: String, mmap: Mmap, lease: Arc<AtomicBool>) -> Self {
        Self {
            name,
            access: Access::ReadOnly,
            mapping: Some(Mapping::ReadOnly(mmap)),
            lease,
        }
    }

    pub(crate) fn read_write(name: String, mmap: MmapMut, lease: Arc<AtomicBool>) -> Self {
        Self {
            name,
            access: Access::ReadWrite,
            mapping: Some(Mapping::ReadWrite(mmap)),
            lease,
        }
    }

    pub(crate) fn belongs_to(&self, lease: &Arc<AtomicBool>) -> bool {
        Arc::ptr_eq(&self.lease, lease)
    }

    /// Unmap with `munmap` so failures reach the caller.
    ///
    /// On failure the view comes back inside the `Unmap` error, still mapped
    /// and still holding its lease, so the handle remains `Mapped`.
    pub(crate) fn release(mut self) -> Result<()> {
        let Some(mapping) = self.mapping.take() else {
            return Ok(());
        };

        let (ptr, len) = mapping.raw_parts();
        let Some(addr) = NonNull::new(ptr as *mut c_void) else {
            return Err(self.unmap_failed(mapping, Errno::EINVAL));
        };

        // SAFETY: addr/len describe a live mapping created by memmap2 with
        // offset 0, and no slice borrowed from this view can outlive `self`.
        if let Err(e) = unsafe { munmap(addr, len) } {
            return Err(self.unmap_failed(mapping, e));
        }

        // Already unmapped; memmap2 must not unmap again on drop.
        mem::forget(mapping);

        self.lease.store(false, Ordering::Release);
        debug!("Unmapped {} ({} bytes)", self.name, len);
        Ok(())
    }

    fn unmap_failed(mut self, mapping: Mapping, source: Errno) -> RegionError {
        warn!("munmap of {} failed: {}", self.name, source);
        self.mapping = Some(mapping);
        RegionError::unmap(self.name.clone(), source).carrying(self)
    }

    /// Name of the mapped object
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access mode of this view
    pub fn access(&self) -> Access {
        self.access
    }

    /// Length of the view in bytes
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the view is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the mapped bytes (read-only)
    pub fn as_slice(&self) -> &[u8] {
        self.mapping.as_ref().map(Mapping::as_slice).unwrap_or(&[])
    }

    /// Get the mapped bytes (mutable); fails on read-only views
    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        match self.mapping.as_mut() {
            Some(Mapping::ReadWrite(m)) => Ok(&mut m[..]),
            _ => Err(RegionError::read_only(&self.name)),
        }
    }

    /// Pointer to the start of the view
    pub fn as_ptr(&self) -> *const u8 {
        self.as_slice().as_ptr()
    }

    /// Mutable pointer to the start of the view, for callers placing their
    /// own synchronization structures inside the region
    pub fn as_mut_ptr(&mut self) -> Result<*mut u8> {
        Ok(self.as_mut_slice()?.as_mut_ptr())
    }

    /// Copy `buf.len()` bytes starting at `offset` into `buf`
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let range = self.checked_range(offset, buf.len())?;
        buf.copy_from_slice(&self.as_slice()[range]);
        Ok(())
    }

    /// Copy `data` into the view starting at `offset`
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let range = self.checked_range(offset, data.len())?;
        self.as_mut_slice()?[range].copy_from_slice(data);
        Ok(())
    }

    /// Set every byte of the view to `byte`
    pub fn fill(&mut self, byte: u8) -> Result<()> {
        self.as_mut_slice()?.fill(byte);
        Ok(())
    }

    /// Split the view into `parts` disjoint chunks for parallel workers.
    ///
    /// Chunk boundaries fall on multiples of `align` bytes; the last chunk
    /// takes whatever remains.
    pub fn split_mut(&mut self, parts: usize, align: usize) -> Result<Vec<&mut [u8]>> {
        let ranges = partition_ranges(self.len(), parts, align)?;
        let mut rest = self.as_mut_slice()?;
        let mut chunks = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (head, tail) = mem::take(&mut rest).split_at_mut(range.len());
            chunks.push(head);
            rest = tail;
        }
        Ok(chunks)
    }

    /// Synchronously write dirty pages back with `msync`
    pub fn flush(&self) -> Result<()> {
        match &self.mapping {
            Some(Mapping::ReadWrite(m)) => m
                .flush()
                .map_err(|e| RegionError::from_io(e, "Failed to flush memory mapping")),
            _ => Ok(()),
        }
    }

    /// Schedule write-back without waiting for it
    pub fn flush_async(&self) -> Result<()> {
        match &self.mapping {
            Some(Mapping::ReadWrite(m)) => m.flush_async().map_err(|e| {
                RegionError::from_io(e, "Failed to flush memory mapping asynchronously")
            }),
            _ => Ok(()),
        }
    }

    fn checked_range(&self, offset: usize, length: usize) -> Result<Range<usize>> {
        let size = self.len();
        match offset.checked_add(length) {
            Some(end) if end <= size => Ok(offset..end),
            _ => Err(RegionError::out_of_bounds(offset, length, size)),
        }
    }
}

impl Deref for MappedView {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl Drop for MappedView {
    fn drop(&mut self) {
        if let Some(mapping) = self.mapping.take() {
            let len = mapping.as_slice().len();
            drop(mapping);
            self.lease.store(false, Ordering::Release);
            debug!("Dropped view of {} ({} bytes)", self.name, len);
        } else if self.lease.load(Ordering::Acquire) {
            warn!("View of {} released with its lease still held", self.name);
        }
    }
}

/// Byte ranges covering `len` bytes in `parts` chunks aligned to `align`
pub fn partition_ranges(len: usize, parts: usize, align: usize) -> Result<Vec<Range<usize>>> {
    if parts == 0 {
        return Err(RegionError::invalid_parameter("parts", "Must be greater than 0"));
    }
    if align == 0 {
        return Err(RegionError::invalid_parameter("align", "Must be greater than 0"));
    }

    let step = (len / align / parts) * align;
    let ranges = (0..parts)
        .map(|i| {
            let start = i * step;
            let end = if i + 1 == parts { len } else { start + step };
            start..end
        })
        .collect();
    Ok(ranges)
}
