//! Core error types for the cache engine

use std::path::PathBuf;
use std::time::Duration;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Comprehensive error type for cache operations
#[derive(Debug)]
pub enum CacheError {
    /// I/O errors during cache operations
    Io {
        path: PathBuf,
        operation: &'static str,
        source: std::io::Error,
        recovery_hint: RecoveryHint,
    },

    /// Serialization/deserialization errors
    Serialization {
        key: String,
        operation: SerializationOp,
        source: Box<dyn std::error::Error + Send + Sync>,
        recovery_hint: RecoveryHint,
    },

    /// An entry file could not be decoded as a valid envelope
    Corruption {
        key: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// Invalid cache key
    InvalidKey {
        key: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// A configuration value was rejected before any I/O
    InvalidConfig {
        field: &'static str,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// The stored value cannot take part in the requested operation
    InvalidValue {
        key: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// The cache directory cannot be created, read or written
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints for error handling
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryHint {
    /// Retry the operation
    Retry { after: Duration },

    /// Clear the cache and retry
    ClearAndRetry,

    /// Check file permissions
    CheckPermissions { path: PathBuf },

    /// Recreate cache file/directory
    Recreate,

    /// Update cache configuration
    UpdateConfiguration,

    /// No automated recovery possible
    Manual { instructions: String },

    /// Operation can be safely ignored
    Ignore,

    /// No recovery possible
    NoRecovery,
}

/// Serialization operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationOp {
    Encode,
    Decode,
    Compress,
    Decompress,
}

impl CacheError {
    /// Invalid key with a manual fix hint
    pub(crate) fn invalid_key(key: &str, reason: impl Into<String>, fix: &str) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
            recovery_hint: RecoveryHint::Manual {
                instructions: fix.to_string(),
            },
        }
    }

    /// Rejected configuration field
    pub(crate) fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }

    /// Undecodable entry; the caller is expected to drop the file
    pub(crate) fn corruption(key: &str, reason: impl Into<String>) -> Self {
        Self::Corruption {
            key: key.to_string(),
            reason: reason.into(),
            recovery_hint: RecoveryHint::ClearAndRetry,
        }
    }

    /// Stored value cannot take part in the requested operation
    pub(crate) fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Delete the key or store an integer in it".to_string(),
            },
        }
    }

    /// I/O failure on a concrete path
    pub(crate) fn io(
        path: impl Into<PathBuf>,
        operation: &'static str,
        source: std::io::Error,
    ) -> Self {
        let path = path.into();
        let recovery_hint = match source.kind() {
            std::io::ErrorKind::PermissionDenied => RecoveryHint::CheckPermissions {
                path: path.clone(),
            },
            std::io::ErrorKind::NotFound => RecoveryHint::Recreate,
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => {
                RecoveryHint::Retry {
                    after: Duration::from_millis(100),
                }
            }
            _ => RecoveryHint::Manual {
                instructions: format!("Check the filesystem holding '{}'", path.display()),
            },
        };

        Self::Io {
            path,
            operation,
            source,
            recovery_hint,
        }
    }
}
