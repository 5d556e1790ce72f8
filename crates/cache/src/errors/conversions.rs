//! Error conversion utilities

use super::types::{CacheError, RecoveryHint, SerializationOp};
use std::path::PathBuf;

impl From<std::io::Error> for CacheError {
    fn from(error: std::io::Error) -> Self {
        CacheError::io(PathBuf::from("."), "unknown", error)
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        let operation = if error.is_data() || error.is_syntax() || error.is_eof() {
            SerializationOp::Decode
        } else {
            SerializationOp::Encode
        };
        Self::Serialization {
            key: String::new(),
            operation,
            source: Box::new(error),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check JSON format and data types".to_string(),
            },
        }
    }
}

impl From<bincode::Error> for CacheError {
    fn from(error: bincode::Error) -> Self {
        Self::Serialization {
            key: String::new(),
            operation: SerializationOp::Encode,
            source: error,
            recovery_hint: RecoveryHint::NoRecovery,
        }
    }
}

impl From<filecache_utils::Error> for CacheError {
    fn from(error: filecache_utils::Error) -> Self {
        match error {
            filecache_utils::Error::FileSystem {
                path,
                operation,
                source,
            } => {
                // Keep the kind for the recovery hint, fold the operation into the message
                let source = std::io::Error::new(source.kind(), format!("{operation}: {source}"));
                CacheError::io(path, "filesystem operation", source)
            }
            filecache_utils::Error::Configuration { message } => Self::Configuration {
                message,
                recovery_hint: RecoveryHint::UpdateConfiguration,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_points_at_path() {
        let err: CacheError = filecache_utils::Error::file_system(
            "/root/cache",
            "open lock file",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        )
        .into();

        match err.recovery_hint() {
            RecoveryHint::CheckPermissions { path } => {
                assert_eq!(path, &PathBuf::from("/root/cache"))
            }
            other => panic!("unexpected hint {other:?}"),
        }
    }

    #[test]
    fn test_json_syntax_error_is_decode() {
        let err: CacheError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(
            err,
            CacheError::Serialization {
                operation: SerializationOp::Decode,
                ..
            }
        ));
    }
}
