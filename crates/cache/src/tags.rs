//! Tag index and the tagged write scope
//!
//! Each tag owns one JSON index file under `.tags/` listing the keys written
//! with it. Index files are only modified under the tag's lock file. Entry
//! headers carry their own tag list, which stays authoritative: invalidation
//! re-checks it before deleting, so a stale index member is harmless.

use crate::cache::{FileCache, Ttl};
use crate::errors::{CacheError, Result};
use crate::paths::{PathResolver, LOCK_EXTENSION, TAG_EXTENSION};
use crate::value::Value;
use filecache_utils::{write_atomic, FileLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Default, Serialize, Deserialize)]
struct TagFile {
    tag: String,
    keys: BTreeSet<String>,
}

/// Reverse index from tag to keys
#[derive(Debug, Clone)]
pub(crate) struct TagIndex {
    resolver: PathResolver,
}

impl TagIndex {
    pub fn new(resolver: PathResolver) -> Self {
        Self { resolver }
    }

    /// Keys currently listed under `tag`
    pub fn members(&self, tag: &str) -> Result<BTreeSet<String>> {
        Ok(self.read(tag)?.keys)
    }

    pub fn add(&self, tag: &str, key: &str) -> Result<()> {
        let _lock = self.lock(tag)?;
        let mut file = self.read(tag)?;
        if file.keys.insert(key.to_string()) {
            file.tag = tag.to_string();
            self.store(tag, &file)?;
        }
        Ok(())
    }

    pub fn remove(&self, tag: &str, key: &str) -> Result<()> {
        let _lock = self.lock(tag)?;
        let mut file = self.read(tag)?;
        if !file.keys.remove(key) {
            return Ok(());
        }
        if file.keys.is_empty() {
            self.discard(tag)
        } else {
            self.store(tag, &file)
        }
    }

    /// Tags that currently have a usable index file
    ///
    /// Unusable index files are removed under their tag's lock.
    pub fn tags(&self) -> Result<Vec<String>> {
        let dir = self.resolver.tags_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(dir, "list tag indexes", e)),
        };

        let mut tags = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TAG_EXTENSION) {
                continue;
            }
            match self.owner_of(&path) {
                Some(tag) => tags.push(tag),
                None => {
                    let Some(name) = path.file_name() else { continue };
                    let lock_path = self
                        .resolver
                        .locks_dir()
                        .join("tags")
                        .join(name)
                        .with_extension(LOCK_EXTENSION);
                    let _lock = FileLock::acquire(&lock_path)?;
                    if self.owner_of(&path).is_none() {
                        warn!("removing unusable tag index {}", path.display());
                        remove_index(&path)?;
                    }
                }
            }
        }
        Ok(tags)
    }

    /// Tag recorded in the index file at `path`, if it is readable and in place
    fn owner_of(&self, path: &Path) -> Option<String> {
        let bytes = fs::read(path).ok()?;
        let file = serde_json::from_slice::<TagFile>(&bytes).ok()?;
        (self.resolver.tag_index_path(&file.tag) == path).then_some(file.tag)
    }

    fn lock(&self, tag: &str) -> Result<FileLock> {
        Ok(FileLock::acquire(&self.resolver.tag_lock_path(tag))?)
    }

    fn read(&self, tag: &str) -> Result<TagFile> {
        let path = self.resolver.tag_index_path(tag);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(TagFile::default()),
            Err(e) => return Err(CacheError::io(path, "read tag index", e)),
        };
        match serde_json::from_slice::<TagFile>(&bytes) {
            Ok(file) if file.tag == tag => Ok(file),
            Ok(file) => {
                warn!("tag index {} belongs to '{}', rebuilding", path.display(), file.tag);
                Ok(TagFile::default())
            }
            Err(e) => {
                warn!("unreadable tag index {}, rebuilding: {e}", path.display());
                Ok(TagFile::default())
            }
        }
    }

    fn store(&self, tag: &str, file: &TagFile) -> Result<()> {
        let bytes = serde_json::to_vec(file)?;
        write_atomic(&self.resolver.tag_index_path(tag), &bytes)?;
        Ok(())
    }

    fn discard(&self, tag: &str) -> Result<()> {
        let path = self.resolver.tag_index_path(tag);
        remove_index(&path)
    }
}

fn remove_index(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, "remove tag index", e)),
    }
}

/// Writes through this scope attach its tags to every entry
///
/// Created by [`FileCache::tags`].
#[derive(Debug, Clone)]
pub struct TaggedCache<'a> {
    cache: &'a FileCache,
    tags: Vec<String>,
}

impl<'a> TaggedCache<'a> {
    pub(crate) fn new(cache: &'a FileCache, tags: Vec<String>) -> Self {
        Self { cache, tags }
    }

    /// Tags attached by this scope
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Store `value` under `key` with this scope's tags
    pub fn set(&self, key: &str, value: impl Into<Value>, ttl: impl Into<Ttl>) -> Result<bool> {
        self.cache
            .store(key, value.into(), ttl.into(), self.tags.clone())
    }

    /// Store every pair with this scope's tags
    pub fn set_multiple<K, V, I>(&self, items: I, ttl: impl Into<Ttl>) -> Result<bool>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.cache
            .store_multiple(items, ttl.into(), self.tags.clone())
    }

    /// Store `value` with no expiry
    pub fn forever(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.set(key, value, Ttl::Never)
    }

    /// Delete every entry carrying any of this scope's tags
    pub fn flush(&self) -> Result<usize> {
        let mut deleted = 0;
        for tag in &self.tags {
            deleted += self.cache.delete_by_tag(tag)?;
        }
        Ok(deleted)
    }
}
