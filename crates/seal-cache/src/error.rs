#![forbid(unsafe_code)]

//! Error types for the cache subsystem.
//!
//! None of these are fatal to the host. Release failures are logged and
//! swallowed by the caches; configuration errors leave the prior value in
//! place; load errors are surfaced to whoever requested the load. A cache
//! miss is never an error and is reported as `None`.

use std::fmt;

/// Which host call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStep {
    /// Adding a font face to the rendering engine's registry.
    Register,
    /// Revoking a blob-backed object URL.
    Revoke,
    /// Removing a font face from the rendering engine's registry.
    Unregister,
}

impl fmt::Display for ReleaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Register => f.write_str("register"),
            Self::Revoke => f.write_str("revoke"),
            Self::Unregister => f.write_str("unregister"),
        }
    }
}

/// A call into the host's font registry or handle allocator failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseError {
    pub step: ReleaseStep,
    pub detail: String,
}

impl ReleaseError {
    #[must_use]
    pub fn register(detail: impl Into<String>) -> Self {
        Self {
            step: ReleaseStep::Register,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn revoke(detail: impl Into<String>) -> Self {
        Self {
            step: ReleaseStep::Revoke,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn unregister(detail: impl Into<String>) -> Self {
        Self {
            step: ReleaseStep::Unregister,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for ReleaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.detail)
    }
}

impl std::error::Error for ReleaseError {}

/// A configuration change was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Requested capacity lies outside the accepted range.
    CacheSizeOutOfRange {
        requested: usize,
        min: usize,
        max: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CacheSizeOutOfRange {
                requested,
                min,
                max,
            } => write!(
                f,
                "cache size {requested} outside accepted range {min}..={max}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A font load did not produce a usable face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The resource could not be fetched or read.
    Fetch(String),
    /// The engine rejected the font data.
    Decode(String),
    /// The engine refused to register the decoded face.
    Register(ReleaseError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetch(msg) => write!(f, "font fetch failed: {msg}"),
            Self::Decode(msg) => write!(f, "font decode failed: {msg}"),
            Self::Register(e) => write!(f, "font registration failed: {}", e.detail),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Register(e) => Some(e),
            Self::Fetch(_) | Self::Decode(_) => None,
        }
    }
}

/// Errors from a [`SettingsStore`](crate::settings::SettingsStore) backend.
#[derive(Debug)]
pub enum StorageError {
    /// Serialization or deserialization error.
    Serialization(serde_json::Error),
    /// Backend is not available (e.g. storage disabled by the browser).
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Serialization(e) => write!(f, "serialization error: {e}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Serialization(e) => Some(e),
            StorageError::Unavailable(_) => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e)
    }
}
