//! Enumeration of the on-disk entry tree

use crate::paths::{is_entry_file, PathResolver};
use filecache_utils::is_temp_file;
use std::path::PathBuf;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Walk the entry tree, skipping the tag and lock namespaces
fn walk(resolver: &PathResolver) -> impl Iterator<Item = DirEntry> + '_ {
    WalkDir::new(resolver.root())
        .min_depth(1)
        .into_iter()
        .filter_entry(move |entry| !resolver.is_internal_dir(entry.path()))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            // Directories vanish under concurrent vacuum or clear
            Err(e) => {
                debug!("skipping unreadable cache path: {e}");
                None
            }
        })
}

/// Every entry file under the root
pub(crate) fn entry_files(resolver: &PathResolver) -> impl Iterator<Item = PathBuf> + '_ {
    walk(resolver)
        .filter(|entry| entry.file_type().is_file() && is_entry_file(entry.path()))
        .map(DirEntry::into_path)
}

/// Temporary files left in the entry tree or the tag index by interrupted writes
pub(crate) fn temp_files(resolver: &PathResolver) -> Vec<PathBuf> {
    let tags_dir = resolver.tags_dir();
    let in_tags = WalkDir::new(&tags_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok());

    walk(resolver)
        .chain(in_tags)
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.file_name().to_str().is_some_and(is_temp_file)
        })
        .map(DirEntry::into_path)
        .collect()
}

/// Shard directories, deepest first so parents empty out after their children
pub(crate) fn shard_dirs(resolver: &PathResolver) -> Vec<PathBuf> {
    let mut dirs: Vec<(usize, PathBuf)> = walk(resolver)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    dirs.sort_by(|a, b| b.0.cmp(&a.0));
    dirs.into_iter().map(|(_, path)| path).collect()
}
