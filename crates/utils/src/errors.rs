use std::path::PathBuf;

/// Result type alias for filesystem utilities
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the filesystem primitives in this crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Create a file system error with the path and operation that failed
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Whether the underlying I/O failure was a missing file or directory
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::FileSystem { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// The path involved in the failure, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Error::FileSystem { path, .. } => Some(path),
            Error::Configuration { .. } => None,
        }
    }
}
