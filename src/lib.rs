//! # shm-region - Named Shared Memory Regions
//!
//! Lifecycle-safe creation, mapping and teardown of POSIX shared memory
//! objects (`shm_open` / `ftruncate` / `mmap` / `munmap` / `close` /
//! `shm_unlink`), with one error variant per lifecycle step.
//!
//! ## Lifecycle
//!
//! ```text
//!  open_or_create ──► Open ──resize──► Sized ──map──► Mapped
//!                                        ▲              │
//!                                        └──resize── Unmapped ◄──unmap
//!                                                       │
//!                                                     close ──► Closed
//!
//!  unlink: legal in any state once opened; existing mappings survive it
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use shm_region::{Access, SharedRegion};
//!
//! # fn main() -> shm_region::Result<()> {
//! let mut region = SharedRegion::open_or_create("/example", 4096, 0o600)?;
//! let mut view = region.map(Access::ReadWrite)?;
//! view.write_at(0, b"hello")?;
//! region.unmap(view)?;
//! region.close()?;
//! region.unlink()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Handles never lock the shared bytes. Several handles, in one process or
//! many, may map the same object and see each other's writes, but ordering
//! across processes is only what the hardware and `MAP_SHARED` provide.
//! Callers that need coordination embed their own primitives (atomics, a
//! named semaphore, a file lock) and reach the bytes through
//! [`MappedView::as_mut_ptr`].

pub mod error;
pub mod region;

// Main API re-exports
pub use error::{RegionError, Result};
pub use region::{
    unlink, Access, MappedView, OpenMode, RegionConfig, RegionState, RegionStats, SharedRegion,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod config {
    /// Default mode bits for newly created objects
    pub const DEFAULT_PERMISSIONS: u32 = 0o644;

    /// Longest object name accepted, excluding the leading slash
    #[cfg(target_os = "macos")]
    pub const MAX_NAME_LEN: usize = 31;

    /// Longest object name accepted, excluding the leading slash
    #[cfg(not(target_os = "macos"))]
    pub const MAX_NAME_LEN: usize = 255;

    /// Attempts at open-or-create when the object vanishes between the
    /// exclusive create and the plain open
    pub const OPEN_RETRIES: usize = 8;
}
