//! Scoped advisory file locks shared between threads and processes

use crate::errors::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Lock files may be unlinked by maintenance while someone waits on them, so
/// acquisition re-opens the path a bounded number of times
const MAX_ACQUIRE_ATTEMPTS: usize = 16;

/// An exclusive lock on a lock file, released when dropped
///
/// The lock file is never the data file itself: data files are replaced by
/// rename, which would leave a waiter holding a lock on a dead inode.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until an exclusive lock on `path` is held
    pub fn acquire(path: &Path) -> Result<Self> {
        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            let file = open_lock_file(path)?;
            file.lock_exclusive()
                .map_err(|e| Error::file_system(path, "lock file", e))?;

            if still_linked(&file, path) {
                return Ok(Self {
                    file,
                    path: path.to_path_buf(),
                });
            }
            // Unlinked by vacuum while we waited; the fresh file is the real lock
            tracing::debug!("lock file {} was replaced while waiting", path.display());
            let _ = FileExt::unlock(&file);
        }

        Err(Error::file_system(
            path,
            "lock file",
            io::Error::new(
                io::ErrorKind::Other,
                "lock file kept being replaced while waiting",
            ),
        ))
    }

    /// Take the lock only if nobody else holds it
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) if still_linked(&file, path) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                Ok(None)
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(Error::file_system(path, "try lock file", e)),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlink the lock file while still holding it, then release
    ///
    /// Anyone blocked on the old inode notices the unlink and re-opens.
    pub fn remove(self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::file_system(&self.path, "remove lock file", e)),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::file_system(parent, "create lock directory", e))?;
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| Error::file_system(path, "open lock file", e))
}

fn is_contended(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (file.metadata(), fs::metadata(path)) {
        (Ok(held), Ok(current)) => held.dev() == current.dev() && held.ino() == current.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}
