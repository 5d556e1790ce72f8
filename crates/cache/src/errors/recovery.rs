//! Recovery utilities for cache errors

use super::types::{CacheError, RecoveryHint};

impl CacheError {
    /// Get the recovery hint for this error
    #[must_use]
    pub const fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::Io { recovery_hint, .. }
            | Self::Serialization { recovery_hint, .. }
            | Self::Corruption { recovery_hint, .. }
            | Self::InvalidKey { recovery_hint, .. }
            | Self::InvalidConfig { recovery_hint, .. }
            | Self::InvalidValue { recovery_hint, .. }
            | Self::Configuration { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Rejected before touching the filesystem; retrying cannot help
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidKey { .. } | Self::InvalidConfig { .. })
    }

    /// Check if this error is transient and can be retried
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.recovery_hint(), RecoveryHint::Retry { .. })
    }

    /// Check if this error indicates data corruption
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let key_err = CacheError::invalid_key("", "Key cannot be empty", "Provide a key");
        assert!(key_err.is_validation());
        assert!(!key_err.is_corruption());

        let corrupt = CacheError::corruption("k", "bad magic");
        assert!(corrupt.is_corruption());
        assert_eq!(corrupt.recovery_hint(), &RecoveryHint::ClearAndRetry);

        let busy = CacheError::io(
            "/tmp",
            "lock file",
            std::io::Error::from(std::io::ErrorKind::WouldBlock),
        );
        assert!(busy.is_transient());
    }
}
