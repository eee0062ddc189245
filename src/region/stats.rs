//! Point-in-time snapshot of a region handle

use std::time::SystemTime;

use super::{config::Access, state::RegionState};

/// Statistics for a region handle
#[derive(Debug, Clone)]
pub struct RegionStats {
    pub name: String,
    /// Size tracked by the handle
    pub size: usize,
    /// Size reported by `fstat`; `None` once the descriptor is closed
    pub os_size: Option<usize>,
    pub state: RegionState,
    pub access: Access,
    pub created: bool,
    pub unlinked: bool,
    pub opened_at: SystemTime,
}

impl RegionStats {
    /// Get the age of the handle in seconds
    pub fn age_seconds(&self) -> Option<u64> {
        self.opened_at.elapsed().ok().map(|d| d.as_secs())
    }

    /// Whether another handle changed the object's size since this one last looked
    pub fn size_drifted(&self) -> bool {
        matches!(self.os_size, Some(os) if os != self.size)
    }
}
