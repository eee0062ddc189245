//! Configuration types for shared memory regions

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_PERMISSIONS, MAX_NAME_LEN};
use crate::error::{RegionError, Result};

/// Access mode for descriptors and views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    /// Read-only access
    ReadOnly,
    /// Read and write access
    ReadWrite,
}

impl Default for Access {
    fn default() -> Self {
        Self::ReadWrite
    }
}

impl Access {
    /// Whether writes are permitted
    pub fn is_writable(&self) -> bool {
        matches!(self, Access::ReadWrite)
    }

    /// Get a human-readable name for the access mode
    pub fn name(&self) -> &'static str {
        match self {
            Access::ReadOnly => "read-only",
            Access::ReadWrite => "read-write",
        }
    }
}

/// How the named object is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenMode {
    /// Create the object if absent, open it if present
    OpenOrCreate,
    /// Fail if the object already exists
    CreateExclusive,
    /// Fail if the object does not exist
    OpenExisting,
}

impl Default for OpenMode {
    fn default() -> Self {
        Self::OpenOrCreate
    }
}

/// Configuration for opening shared memory regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Name of the shared memory object, with or without the leading `/`
    pub name: String,
    /// Desired size in bytes; 0 keeps the object's current size
    pub size: usize,
    /// Permissions for a newly created object (Unix mode bits, subject to umask)
    pub permissions: u32,
    /// Access mode of the descriptor
    pub access: Access,
    /// Create/open behavior
    pub open_mode: OpenMode,
    /// Remove the name from the namespace when the handle is dropped
    pub unlink_on_drop: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            permissions: DEFAULT_PERMISSIONS,
            access: Access::default(),
            open_mode: OpenMode::default(),
            unlink_on_drop: false,
        }
    }
}

impl RegionConfig {
    /// Create a new region configuration
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Set the permissions for a newly created object
    pub fn with_permissions(mut self, permissions: u32) -> Self {
        self.permissions = permissions;
        self
    }

    /// Set the descriptor access mode
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Set the create/open behavior
    pub fn with_open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }

    /// Unlink the name when the handle is dropped
    pub fn with_unlink_on_drop(mut self, unlink_on_drop: bool) -> Self {
        self.unlink_on_drop = unlink_on_drop;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;

        if self.permissions & !0o7777 != 0 {
            return Err(RegionError::invalid_parameter(
                "permissions",
                format!("{:#o} is not a valid mode", self.permissions),
            ));
        }

        if self.size > 0 && self.access == Access::ReadOnly {
            return Err(RegionError::invalid_parameter(
                "size",
                "A read-only descriptor cannot size the object; use size 0",
            ));
        }

        if i64::try_from(self.size).is_err() {
            return Err(RegionError::invalid_parameter(
                "size",
                format!("{} bytes exceeds the maximum object size", self.size),
            ));
        }

        Ok(())
    }

    /// Get the normalized object name (`/name`)
    pub fn shm_name(&self) -> Result<String> {
        normalize_name(&self.name)
    }
}

/// Check a name against the POSIX shared memory naming rules.
///
/// A single optional leading `/` is accepted; the rest must be non-empty,
/// free of `/` and NUL, and at most `MAX_NAME_LEN` bytes.
pub fn validate_name(name: &str) -> Result<()> {
    let bare = name.strip_prefix('/').unwrap_or(name);

    if bare.is_empty() {
        return Err(RegionError::invalid_parameter(
            "name",
            "Region name cannot be empty",
        ));
    }

    if bare.contains('/') {
        return Err(RegionError::invalid_parameter(
            "name",
            format!("{:?} may only contain a leading slash", name),
        ));
    }

    if bare.contains('\0') {
        return Err(RegionError::invalid_parameter(
            "name",
            "Name contains null bytes",
        ));
    }

    if bare.len() > MAX_NAME_LEN {
        return Err(RegionError::invalid_parameter(
            "name",
            format!("{} bytes exceeds the limit of {}", bare.len(), MAX_NAME_LEN),
        ));
    }

    Ok(())
}

/// Validate a name and return it in `/name` form
pub fn normalize_name(name: &str) -> Result<String> {
    validate_name(name)?;
    if name.starts_with('/') {
        Ok(name.to_string())
    } else {
        Ok(format!("/{}", name))
    }
}
