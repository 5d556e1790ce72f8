//! Atomic file operations so readers never observe a partially written file

use crate::errors::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Prefix shared by every temporary file created by [`write_atomic`]
pub const TEMP_FILE_PREFIX: &str = ".tmp-";

/// Write data to a file atomically by writing to a temporary file and renaming
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::configuration("Invalid file path: no parent directory"))?;

    let (temp_path, mut file) = create_temp_file(parent)?;

    let result = (|| -> Result<()> {
        file.write_all(content)
            .map_err(|e| Error::file_system(&temp_path, "write to temporary file", e))?;

        file.sync_all()
            .map_err(|e| Error::file_system(&temp_path, "sync temporary file", e))?;

        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
        return result;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::file_system(path, "atomic rename", e)
    })?;

    Ok(())
}

/// Attempts at creating a temp file whose directory a concurrent cleanup removed
const CREATE_ATTEMPTS: usize = 3;

/// Create a temp file next to the target, recreating `parent` if a concurrent
/// cleanup removes it first
fn create_temp_file(parent: &Path) -> Result<(PathBuf, File)> {
    let mut attempt = 1;
    loop {
        fs::create_dir_all(parent)
            .map_err(|e| Error::file_system(parent, "create parent directory", e))?;

        // Same directory as the target so the rename never crosses filesystems
        let temp_path = parent.join(format!("{TEMP_FILE_PREFIX}{}", Uuid::new_v4().simple()));
        match OpenOptions::new().create_new(true).write(true).open(&temp_path) {
            Ok(file) => return Ok((temp_path, file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < CREATE_ATTEMPTS => {
                attempt += 1;
            }
            Err(e) => return Err(Error::file_system(&temp_path, "create temporary file", e)),
        }
    }
}

/// Whether a file name belongs to a temporary file left by [`write_atomic`]
pub fn is_temp_file(name: &str) -> bool {
    name.starts_with(TEMP_FILE_PREFIX)
}
