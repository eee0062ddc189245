//! Shared memory region handle

use std::{
    fs::File,
    os::fd::{IntoRawFd, OwnedFd},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::SystemTime,
};

use log::{debug, info, warn};
use memmap2::MmapOptions;
use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::{
        mman::{shm_open, shm_unlink},
        stat::Mode,
    },
    unistd::ftruncate,
};

use crate::{
    config::OPEN_RETRIES,
    error::{RegionError, Result},
};

use super::{
    config::{normalize_name, Access, OpenMode, RegionConfig},
    state::RegionState,
    stats::RegionStats,
    view::MappedView,
};

/// One named POSIX shared memory object bound to this process.
///
/// The handle owns the descriptor and tracks at most one active
/// [`MappedView`]. The object itself lives in the OS namespace and is shared
/// with every other handle, in this or any process, that opens the same name:
/// resizing or unlinking it is visible to all of them. This type manages only
/// its own descriptor and mapping, never the contents of the shared bytes.
///
/// Dropping the handle closes the descriptor. Views handed out earlier stay
/// valid; the name is removed only by [`unlink`](Self::unlink) or when the
/// region was configured with `unlink_on_drop`.
#[derive(Debug)]
pub struct SharedRegion {
    name: String,
    size: usize,
    file: Option<File>,
    mapping: Option<Arc<AtomicBool>>,
    state: RegionState,
    access: Access,
    created: bool,
    unlinked: bool,
    unlink_on_drop: bool,
    opened_at: SystemTime,
}

impl SharedRegion {
    /// Open or create a region from a configuration.
    ///
    /// A non-zero `config.size` resizes the object before returning (state
    /// `Sized`); size 0 adopts the object's current size (state `Open`). If
    /// the object was created here and sizing fails, it is unlinked again.
    pub fn new(config: RegionConfig) -> Result<Self> {
        config.validate()?;
        let name = config.shm_name()?;

        let (fd, created) = open_object(&name, &config)?;
        let mut rollback = CreatedName::new(&name, created);

        let file = File::from(fd);
        let current = object_size(&file).map_err(|e| RegionError::creation(&name, e))?;

        let mut region = Self {
            name: name.clone(),
            size: current,
            file: Some(file),
            mapping: None,
            state: RegionState::Open,
            access: config.access,
            created,
            unlinked: false,
            unlink_on_drop: false,
            opened_at: SystemTime::now(),
        };

        if config.size > 0 {
            region.resize(config.size)?;
        }

        rollback.disarm();
        region.unlink_on_drop = config.unlink_on_drop;

        if created {
            info!("Created shared memory object {} ({} bytes)", name, region.size);
        } else {
            debug!("Opened shared memory object {} ({} bytes)", name, region.size);
        }
        Ok(region)
    }

    /// Create the named object if absent, open it if present, and size it
    /// to `desired_size` (0 keeps the current size)
    pub fn open_or_create(name: &str, desired_size: usize, permissions: u32) -> Result<Self> {
        Self::new(RegionConfig::new(name, desired_size).with_permissions(permissions))
    }

    /// Open an existing object without changing its size
    pub fn open_existing(name: &str, access: Access) -> Result<Self> {
        Self::new(
            RegionConfig::new(name, 0)
                .with_access(access)
                .with_open_mode(OpenMode::OpenExisting),
        )
    }

    /// Check whether a name is present in the shared memory namespace
    pub fn exists(name: &str) -> Result<bool> {
        let name = normalize_name(name)?;
        match shm_open(name.as_str(), OFlag::O_RDONLY, Mode::empty()) {
            Ok(_fd) => Ok(true),
            Err(Errno::ENOENT) => Ok(false),
            // Present but not readable by us
            Err(Errno::EACCES) => Ok(true),
            Err(e) => Err(RegionError::creation(name, e)),
        }
    }

    /// Set the backing size of the object.
    ///
    /// Rejected with `InvalidState` while a view is active or after close.
    /// An unchanged size performs no syscall.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        self.refresh_state();
        self.state.check_resize()?;
        let file = self.descriptor("resize")?;

        let current = object_size(file).map_err(|e| RegionError::resize(&self.name, size, e))?;
        if current != size {
            let len = libc::off_t::try_from(size)
                .map_err(|_| RegionError::resize(&self.name, size, Errno::EFBIG))?;
            ftruncate(file, len).map_err(|e| RegionError::resize(&self.name, size, e))?;
            debug!("Resized {} from {} to {} bytes", self.name, current, size);
        }

        self.size = size;
        self.state = RegionState::Sized;
        Ok(())
    }

    /// Map the object into this process.
    ///
    /// The view covers the object's current size, re-read from the OS so a
    /// size set through another handle is honored. Zero-sized objects cannot
    /// be mapped. Only one view per handle may be active.
    pub fn map(&mut self, access: Access) -> Result<MappedView> {
        self.refresh_state();
        self.state.check_map()?;
        let file = self.descriptor("map")?;

        let len = object_size(file).map_err(|e| RegionError::mapping(&self.name, e))?;
        if len == 0 {
            return Err(RegionError::mapping(&self.name, Errno::EINVAL));
        }

        let mut options = MmapOptions::new();
        options.len(len);

        let lease = Arc::new(AtomicBool::new(true));
        // SAFETY: the object is shared with other processes by design. The
        // bytes may change underneath the view at any time, and a peer that
        // shrinks the object makes accesses past the new end fault.
        let view = match access {
            Access::ReadOnly => {
                let mmap = unsafe { options.map(file) }
                    .map_err(|e| RegionError::mapping(&self.name, e))?;
                MappedView::read_only(self.name.clone(), mmap, Arc::clone(&lease))
            }
            Access::ReadWrite => {
                let mmap = unsafe { options.map_mut(file) }
                    .map_err(|e| RegionError::mapping(&self.name, e))?;
                MappedView::read_write(self.name.clone(), mmap, Arc::clone(&lease))
            }
        };

        if len != self.size {
            debug!("{} changed size externally: {} -> {} bytes", self.name, self.size, len);
        }
        self.size = len;
        self.mapping = Some(lease);
        self.state = RegionState::Mapped;
        debug!("Mapped {} ({} bytes, {})", self.name, len, access.name());
        Ok(view)
    }

    /// Release a view obtained from [`map`](Self::map).
    ///
    /// Every failure hands the view back through
    /// [`RegionError::into_view`], untouched. That covers a handle that is
    /// not `Mapped`, a view mapped by another handle (`InvalidState`), and a
    /// failed `munmap` (`Unmap`). The handle stays in its current state.
    pub fn unmap(&mut self, view: MappedView) -> Result<()> {
        self.refresh_state();
        if let Err(e) = self.state.check_unmap() {
            return Err(e.carrying(view));
        }

        let owned = matches!(&self.mapping, Some(lease) if view.belongs_to(lease));
        if !owned {
            warn!("{} refused a view of {} mapped by another handle", self.name, view.name());
            return Err(RegionError::invalid_state("unmap", self.state).carrying(view));
        }

        view.release()?;
        self.mapping = None;
        self.state = RegionState::Unmapped;
        Ok(())
    }

    /// Release the descriptor.
    ///
    /// Must follow `unmap`; closing twice is an `InvalidState` error. If
    /// `close(2)` reports an error the descriptor is released anyway and the
    /// handle is `Closed`.
    pub fn close(&mut self) -> Result<()> {
        self.refresh_state();
        self.state.check_close()?;
        let file = self
            .file
            .take()
            .ok_or_else(|| RegionError::invalid_state("close", self.state))?;
        self.state = RegionState::Closed;

        let fd = file.into_raw_fd();
        // SAFETY: fd came out of the owning File and is closed exactly once.
        if unsafe { libc::close(fd) } == -1 {
            return Err(RegionError::close(&self.name, Errno::last()));
        }
        debug!("Closed {}", self.name);
        Ok(())
    }

    /// Remove this region's name from the namespace.
    ///
    /// Legal in every state. Existing mappings, here and in other processes,
    /// remain valid until they are unmapped; a later open of the same name
    /// gets a new, independent object.
    pub fn unlink(&mut self) -> Result<()> {
        unlink(&self.name)?;
        self.unlinked = true;
        Ok(())
    }

    /// Get the normalized name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size known to this handle
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> RegionState {
        self.current_state()
    }

    /// Access mode of the descriptor
    pub fn access(&self) -> Access {
        self.access
    }

    /// Whether this handle created the object
    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Whether this handle unlinked the name
    pub fn is_unlinked(&self) -> bool {
        self.unlinked
    }

    /// Whether a view from this handle is active
    pub fn is_mapped(&self) -> bool {
        self.current_state() == RegionState::Mapped
    }

    /// Get statistics for this handle
    pub fn stats(&self) -> RegionStats {
        RegionStats {
            name: self.name.clone(),
            size: self.size,
            os_size: self.file.as_ref().and_then(|f| object_size(f).ok()),
            state: self.current_state(),
            access: self.access,
            created: self.created,
            unlinked: self.unlinked,
            opened_at: self.opened_at,
        }
    }

    fn descriptor(&self, operation: &'static str) -> Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| RegionError::invalid_state(operation, self.state))
    }

    fn current_state(&self) -> RegionState {
        match &self.mapping {
            Some(lease) if self.state == RegionState::Mapped && !lease.load(Ordering::Acquire) => {
                RegionState::Unmapped
            }
            _ => self.state,
        }
    }

    /// Pick up views that were dropped instead of passed to `unmap`
    fn refresh_state(&mut self) {
        let state = self.current_state();
        if state != self.state {
            self.mapping = None;
            self.state = state;
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if self.unlink_on_drop && !self.unlinked {
            if let Err(e) = unlink(&self.name) {
                warn!("Failed to unlink {} on drop: {}", self.name, e);
            }
        }
    }
}

/// Remove a name from the shared memory namespace.
///
/// Fails with `Unlink` if the name does not exist. Processes that still map
/// the object keep their mappings.
pub fn unlink(name: &str) -> Result<()> {
    let name = normalize_name(name)?;
    shm_unlink(name.as_str()).map_err(|e| RegionError::unlink(&name, e))?;
    info!("Unlinked shared memory object {}", name);
    Ok(())
}

/// Open the object, reporting whether this call created it
fn open_object(name: &str, config: &RegionConfig) -> Result<(OwnedFd, bool)> {
    let access = match config.access {
        Access::ReadOnly => OFlag::O_RDONLY,
        Access::ReadWrite => OFlag::O_RDWR,
    };
    let mode = Mode::from_bits_truncate(config.permissions as libc::mode_t);
    let exclusive = access | OFlag::O_CREAT | OFlag::O_EXCL;

    match config.open_mode {
        OpenMode::CreateExclusive => shm_open(name, exclusive, mode)
            .map(|fd| (fd, true))
            .map_err(|e| RegionError::creation(name, e)),
        OpenMode::OpenExisting => shm_open(name, access, Mode::empty())
            .map(|fd| (fd, false))
            .map_err(|e| RegionError::creation(name, e)),
        OpenMode::OpenOrCreate => {
            for _ in 0..OPEN_RETRIES {
                match shm_open(name, exclusive, mode) {
                    Ok(fd) => return Ok((fd, true)),
                    Err(Errno::EEXIST) => {}
                    Err(e) => return Err(RegionError::creation(name, e)),
                }
                match shm_open(name, access, Mode::empty()) {
                    Ok(fd) => return Ok((fd, false)),
                    // Unlinked between the two calls
                    Err(Errno::ENOENT) => continue,
                    Err(e) => return Err(RegionError::creation(name, e)),
                }
            }
            Err(RegionError::creation(name, Errno::EAGAIN))
        }
    }
}

fn object_size(file: &File) -> std::io::Result<usize> {
    let len = file.metadata()?.len();
    usize::try_from(len).map_err(|_| std::io::Error::from(Errno::EOVERFLOW))
}

/// Unlinks a freshly created name unless construction completes
struct CreatedName<'a> {
    name: &'a str,
    armed: bool,
}

impl<'a> CreatedName<'a> {
    fn new(name: &'a str, created: bool) -> Self {
        Self {
            name,
            armed: created,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CreatedName<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = shm_unlink(self.name) {
                warn!("Failed to roll back creation of {}: {}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn existing_name(tag: &str) -> String {
        let name = format!(
            "/shm_region_guard_{}_{}_{}",
            std::process::id(),
            tag,
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        drop(SharedRegion::open_or_create(&name, 4096, 0o600).unwrap());
        assert!(SharedRegion::exists(&name).unwrap());
        name
    }

    #[test]
    fn test_armed_guard_removes_created_name() {
        let name = existing_name("armed");
        drop(CreatedName::new(&name, true));
        assert!(!SharedRegion::exists(&name).unwrap());
    }

    #[test]
    fn test_disarmed_guard_keeps_name() {
        let name = existing_name("disarmed");
        let mut guard = CreatedName::new(&name, true);
        guard.disarm();
        drop(guard);
        assert!(SharedRegion::exists(&name).unwrap());

        // Names this call did not create are never armed
        drop(CreatedName::new(&name, false));
        assert!(SharedRegion::exists(&name).unwrap());

        unlink(&name).unwrap();
    }
}
