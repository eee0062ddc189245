//! Lifecycle state machine of a region handle

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{RegionError, Result};

/// Lifecycle state of a [`SharedRegion`](super::SharedRegion).
///
/// `Open -> Sized -> Mapped -> Unmapped -> Closed`, with `Sized` reachable
/// again from `Unmapped`. Whether the name was unlinked is tracked apart from
/// this state, since unlinking is legal at any point after opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionState {
    /// Descriptor open, size not set by this handle
    Open,
    /// Backing size set
    Sized,
    /// A view is active
    Mapped,
    /// The last view was released
    Unmapped,
    /// Descriptor released
    Closed,
}

impl RegionState {
    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            RegionState::Open => "open",
            RegionState::Sized => "sized",
            RegionState::Mapped => "mapped",
            RegionState::Unmapped => "unmapped",
            RegionState::Closed => "closed",
        }
    }

    /// Whether the descriptor is still held
    pub fn is_open(&self) -> bool {
        !matches!(self, RegionState::Closed)
    }

    /// Guard for `resize`
    pub fn check_resize(self) -> Result<()> {
        match self {
            RegionState::Open | RegionState::Sized | RegionState::Unmapped => Ok(()),
            RegionState::Mapped | RegionState::Closed => {
                Err(RegionError::invalid_state("resize", self))
            }
        }
    }

    /// Guard for `map`
    pub fn check_map(self) -> Result<()> {
        match self {
            RegionState::Open | RegionState::Sized | RegionState::Unmapped => Ok(()),
            RegionState::Mapped | RegionState::Closed => {
                Err(RegionError::invalid_state("map", self))
            }
        }
    }

    /// Guard for `unmap`
    pub fn check_unmap(self) -> Result<()> {
        match self {
            RegionState::Mapped => Ok(()),
            _ => Err(RegionError::invalid_state("unmap", self)),
        }
    }

    /// Guard for `close`; double close is an error, not a no-op
    pub fn check_close(self) -> Result<()> {
        match self {
            RegionState::Open | RegionState::Sized | RegionState::Unmapped => Ok(()),
            RegionState::Mapped | RegionState::Closed => {
                Err(RegionError::invalid_state("close", self))
            }
        }
    }
}

impl fmt::Display for RegionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
