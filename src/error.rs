//! Error types and handling for shared memory regions

use std::io;

use crate::region::{MappedView, RegionState};

/// Result type alias for region operations
pub type Result<T> = std::result::Result<T, RegionError>;

/// Errors raised by the region lifecycle.
///
/// Every OS-level variant names the region and carries the underlying
/// `std::io::Error`, so `raw_os_error()` yields the errno reported by the
/// failing syscall.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// `shm_open` refused to create or open the object
    #[error("Creation failed for {name}: {source}")]
    Creation {
        name: String,
        #[source]
        source: io::Error,
    },

    /// `ftruncate` could not set the backing size
    #[error("Resize of {name} to {size} bytes failed: {source}")]
    Resize {
        name: String,
        size: usize,
        #[source]
        source: io::Error,
    },

    /// `mmap` could not establish the view
    #[error("Mapping {name} failed: {source}")]
    Mapping {
        name: String,
        #[source]
        source: io::Error,
    },

    /// `munmap` failed; the still-mapped view is handed back in `view`
    #[error("Unmapping {name} failed: {source}")]
    Unmap {
        name: String,
        #[source]
        source: io::Error,
        view: Option<Box<MappedView>>,
    },

    /// `close` reported an error; the descriptor is released regardless
    #[error("Closing {name} failed: {source}")]
    Close {
        name: String,
        #[source]
        source: io::Error,
    },

    /// `shm_unlink` failed, typically because the name does not exist
    #[error("Unlinking {name} failed: {source}")]
    Unlink {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Operation not permitted in the handle's current state. A view passed
    /// to a rejected `unmap` is handed back in `view`
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: RegionState,
        view: Option<Box<MappedView>>,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Access outside the mapped range
    #[error("Out of bounds: offset {offset} + length {length} exceeds size {size}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        size: usize,
    },

    /// Mutable access requested through a read-only view
    #[error("View of {name} is read-only")]
    ReadOnlyView { name: String },

    /// Other I/O errors (fstat, msync)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: io::Error,
    },
}

impl RegionError {
    /// Create an I/O error with context
    pub fn from_io(source: io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source,
        }
    }

    /// Create a creation error
    pub fn creation(name: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Creation {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create a resize error
    pub fn resize(name: impl Into<String>, size: usize, source: impl Into<io::Error>) -> Self {
        Self::Resize {
            name: name.into(),
            size,
            source: source.into(),
        }
    }

    /// Create a mapping error
    pub fn mapping(name: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Mapping {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create an unmap error
    pub fn unmap(name: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Unmap {
            name: name.into(),
            source: source.into(),
            view: None,
        }
    }

    /// Create a close error
    pub fn close(name: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Close {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create an unlink error
    pub fn unlink(name: impl Into<String>, source: impl Into<io::Error>) -> Self {
        Self::Unlink {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(operation: &'static str, state: RegionState) -> Self {
        Self::InvalidState {
            operation,
            state,
            view: None,
        }
    }

    /// Attach a view that a failed operation did not consume
    pub(crate) fn carrying(mut self, returned: MappedView) -> Self {
        match &mut self {
            Self::Unmap { view, .. } | Self::InvalidState { view, .. } => {
                *view = Some(Box::new(returned));
            }
            // Other variants never carry a view; dropping it unmaps it.
            _ => drop(returned),
        }
        self
    }

    /// The view a failed `unmap` handed back, if any
    pub fn view(&self) -> Option<&MappedView> {
        match self {
            Self::Unmap { view, .. } | Self::InvalidState { view, .. } => view.as_deref(),
            _ => None,
        }
    }

    /// Take back the view a failed `unmap` did not release
    pub fn into_view(self) -> Option<MappedView> {
        match self {
            Self::Unmap { view, .. } | Self::InvalidState { view, .. } => view.map(|v| *v),
            _ => None,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(offset: usize, length: usize, size: usize) -> Self {
        Self::OutOfBounds {
            offset,
            length,
            size,
        }
    }

    /// Create a read-only view error
    pub fn read_only(name: impl Into<String>) -> Self {
        Self::ReadOnlyView { name: name.into() }
    }

    /// The errno reported by the OS, if this error came from a syscall
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Creation { source, .. }
            | Self::Resize { source, .. }
            | Self::Mapping { source, .. }
            | Self::Unmap { source, .. }
            | Self::Close { source, .. }
            | Self::Unlink { source, .. }
            | Self::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// The lifecycle step that failed
    pub fn step(&self) -> &'static str {
        match self {
            Self::Creation { .. } => "open_or_create",
            Self::Resize { .. } => "resize",
            Self::Mapping { .. } => "map",
            Self::Unmap { .. } => "unmap",
            Self::Close { .. } => "close",
            Self::Unlink { .. } => "unlink",
            Self::InvalidState { operation, .. } => *operation,
            Self::InvalidParameter { .. } => "validate",
            Self::OutOfBounds { .. } | Self::ReadOnlyView { .. } => "access",
            Self::Io { .. } => "io",
        }
    }

    /// Whether this is a state-machine violation
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

impl From<io::Error> for RegionError {
    fn from(err: io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}
