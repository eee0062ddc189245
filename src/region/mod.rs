//! Named shared memory regions: configuration, lifecycle and views

pub mod config;
pub mod handle;
pub mod state;
pub mod stats;
pub mod view;

pub use config::{normalize_name, validate_name, Access, OpenMode, RegionConfig};
pub use handle::{unlink, SharedRegion};
pub use state::RegionState;
pub use stats::RegionStats;
pub use view::{partition_ranges, MappedView};
