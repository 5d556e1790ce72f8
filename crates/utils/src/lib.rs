//! Filesystem primitives shared by the filecache workspace
//!
//! Atomic replace-on-write, scoped advisory file locks and XDG directory
//! lookup. Nothing here knows about cache entries.

pub mod atomic_file;
pub mod errors;
pub mod file_lock;
pub mod xdg;

pub use atomic_file::{is_temp_file, write_atomic, TEMP_FILE_PREFIX};
pub use errors::{Error, Result};
pub use file_lock::FileLock;
pub use xdg::XdgPaths;
