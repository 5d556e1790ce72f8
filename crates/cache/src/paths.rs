//! Path generation and hashing utilities for the cache
//!
//! Entry files are named after the 128-bit xxh3 hash of their key, so any
//! valid key maps to a short, filesystem-safe name. With sharding enabled the
//! leading hash bytes become nested directories (`root/ab/cd/<hash>.cache`),
//! which bounds the number of files in any single directory.

use crate::config::ShardingConfig;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_128;

/// Extension of entry files
pub const ENTRY_EXTENSION: &str = "cache";

/// Extension of tag index files
pub const TAG_EXTENSION: &str = "tag";

/// Extension of lock files
pub const LOCK_EXTENSION: &str = "lock";

/// Directory holding the tag index, separate from entry files
pub const TAGS_DIR: &str = ".tags";

/// Directory holding per-key and per-tag lock files
pub const LOCKS_DIR: &str = ".locks";

/// Hex encoding of the xxh3-128 hash of a key or tag
#[inline]
pub fn hash_name(name: &str) -> String {
    format!("{:032x}", xxh3_128(name.as_bytes()))
}

/// Resolve the entry path for `key`
///
/// Each shard level consumes one hash byte (two hex digits).
pub fn resolve(root: &Path, key: &str, sharding_enabled: bool, depth: usize) -> PathBuf {
    let hash = hash_name(key);
    let mut path = root.to_path_buf();
    if sharding_enabled {
        push_shards(&mut path, &hash, depth);
    }
    path.push(format!("{hash}.{ENTRY_EXTENSION}"));
    path
}

fn push_shards(path: &mut PathBuf, hash: &str, depth: usize) {
    for level in 0..depth.min(hash.len() / 2) {
        path.push(&hash[level * 2..level * 2 + 2]);
    }
}

/// Maps keys and tags to files under one root
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    sharding: ShardingConfig,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>, sharding: ShardingConfig) -> Self {
        Self {
            root: root.into(),
            sharding,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry file for a validated key
    #[inline]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        resolve(
            &self.root,
            key,
            self.sharding.enabled,
            self.sharding.depth,
        )
    }

    /// Lock file guarding read-modify-write on a key
    pub fn entry_lock_path(&self, key: &str) -> PathBuf {
        let hash = hash_name(key);
        let mut path = self.locks_dir();
        if self.sharding.enabled {
            push_shards(&mut path, &hash, self.sharding.depth);
        }
        path.push(format!("{hash}.{LOCK_EXTENSION}"));
        path
    }

    /// Lock file of whatever key the entry file at `entry` belongs to
    ///
    /// Matches [`entry_lock_path`](Self::entry_lock_path) for files in this
    /// layout, so a scan can lock an entry it cannot decode.
    pub fn lock_path_for_entry(&self, entry: &Path) -> Option<PathBuf> {
        let relative = entry.strip_prefix(&self.root).ok()?;
        Some(self.locks_dir().join(relative).with_extension(LOCK_EXTENSION))
    }

    /// Index file listing the keys carrying `tag`
    pub fn tag_index_path(&self, tag: &str) -> PathBuf {
        self.tags_dir()
            .join(format!("{}.{TAG_EXTENSION}", hash_name(tag)))
    }

    /// Lock file guarding a tag's index file
    pub fn tag_lock_path(&self, tag: &str) -> PathBuf {
        self.locks_dir()
            .join("tags")
            .join(format!("{}.{LOCK_EXTENSION}", hash_name(tag)))
    }

    pub fn tags_dir(&self) -> PathBuf {
        self.root.join(TAGS_DIR)
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join(LOCKS_DIR)
    }

    /// Internal namespaces that are not part of the entry tree
    pub fn is_internal_dir(&self, path: &Path) -> bool {
        path == self.tags_dir() || path == self.locks_dir()
    }
}

/// Whether `path` names an entry file
pub fn is_entry_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION)
}
