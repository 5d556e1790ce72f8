//! Read-only health probe of the cache root

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of [`FileCache::health_check`](crate::FileCache::health_check)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub root: PathBuf,
    pub exists: bool,
    pub readable: bool,
    pub writable: bool,
}

impl HealthReport {
    /// Probe `root` without creating or modifying anything
    pub fn probe(root: &Path) -> Self {
        let exists = root.is_dir();
        Self {
            root: root.to_path_buf(),
            exists,
            readable: exists && fs::read_dir(root).is_ok(),
            writable: exists && is_writable(root),
        }
    }

    /// True iff the root exists and is readable and writable
    pub fn healthy(&self) -> bool {
        self.exists && self.readable && self.writable
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}
