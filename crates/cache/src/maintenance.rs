//! Garbage collection, vacuum, clear and enumerated statistics
//!
//! Scans never trust what they saw: an entry found expired is only removed
//! after re-checking it under its key lock, so a concurrent `touch` or `set`
//! wins. Per-entry failures are logged and skipped.

use crate::cache::FileCache;
use crate::codec::now_millis;
use crate::errors::Result;
use crate::paths::{is_entry_file, PathResolver, ENTRY_EXTENSION, LOCK_EXTENSION, TAG_EXTENSION};
use crate::stats::CacheStatistics;
use crate::storage::scan;
use crate::storage::{read_header_at, remove_file, Lookup};
use filecache_utils::FileLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Temp files younger than this may belong to a write in progress
const STALE_TEMP_AGE: Duration = Duration::from_secs(60);

/// Per-pass counters for vacuum's summary log
#[derive(Debug, Default)]
struct VacuumTally {
    temp_files: usize,
    lock_files: usize,
    directories: usize,
    failures: usize,
}

impl FileCache {
    /// Remove expired entries; returns how many files were removed
    ///
    /// Without `force`, nothing happens until the configured GC interval has
    /// passed since this handle last collected.
    pub fn gc(&self, force: bool) -> Result<usize> {
        {
            let mut last_gc = self.last_gc().lock();
            if !force {
                if let Some(at) = *last_gc {
                    if at.elapsed() < self.config().gc_interval {
                        debug!("skipping collection, last one ran {:?} ago", at.elapsed());
                        return Ok(0);
                    }
                }
            }
            *last_gc = Some(Instant::now());
        }

        let now = now_millis();
        let paths: Vec<PathBuf> = self.storage().entry_files().collect();
        let mut removed = 0;
        for path in &paths {
            match self.collect_entry(path, now) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("skipping {} during collection: {e}", path.display()),
            }
        }

        info!(scanned = paths.len(), removed, "garbage collection finished");
        Ok(removed)
    }

    /// `gc(true)`
    pub fn prune(&self) -> Result<usize> {
        self.gc(true)
    }

    fn collect_entry(&self, path: &Path, now: i64) -> Result<bool> {
        let header = match read_header_at(path)? {
            None => return Ok(false),
            Some(Ok(header)) => header,
            Some(Err(e)) => {
                debug!("found corrupt entry file {}: {e}", path.display());
                return self.remove_if_corrupt(path);
            }
        };
        if !header.is_expired_at(now) {
            return Ok(false);
        }

        let key = header.key;
        if self.storage().entry_path(&key) != path {
            // Left behind by a different layout; nothing else can reach it
            return remove_file(path);
        }

        let guard = self.storage().lock(&key)?;
        match self.storage().lookup_header(&key)? {
            Lookup::Expired(_) => self.storage().remove(&guard, &key),
            Lookup::Live(_) | Lookup::Corrupt(_) | Lookup::Absent => Ok(false),
        }
    }

    /// Remove an undecodable entry file once its key lock is held and it is
    /// still undecodable, so a write that replaced it in the meantime survives
    fn remove_if_corrupt(&self, path: &Path) -> Result<bool> {
        let Some(lock_path) = self.storage().resolver().lock_path_for_entry(path) else {
            return Ok(false);
        };
        let _lock = FileLock::acquire(&lock_path)?;
        match read_header_at(path)? {
            Some(Err(e)) => {
                warn!("removing corrupt entry file {}: {e}", path.display());
                remove_file(path)
            }
            Some(Ok(_)) | None => Ok(false),
        }
    }

    /// Collect expired entries, then reclaim what writers and deletes leave
    /// behind: stale temp files, idle lock files, empty shard directories
    ///
    /// Returns `false` if anything could not be removed; details are logged.
    pub fn vacuum(&self) -> Result<bool> {
        self.gc(true)?;

        let resolver = self.storage().resolver();
        let mut tally = VacuumTally::default();

        for path in stale_temp_files(resolver) {
            match remove_file(&path) {
                Ok(_) => tally.temp_files += 1,
                Err(e) => {
                    warn!("could not remove temp file: {e}");
                    tally.failures += 1;
                }
            }
        }

        self.reclaim_lock_files(&mut tally);
        self.remove_empty_dirs(&mut tally);

        info!(
            temp_files = tally.temp_files,
            lock_files = tally.lock_files,
            directories = tally.directories,
            failures = tally.failures,
            "vacuum finished"
        );
        Ok(tally.failures == 0)
    }

    /// Unlink lock files whose entry or tag index no longer exists and that
    /// nobody holds
    fn reclaim_lock_files(&self, tally: &mut VacuumTally) {
        let resolver = self.storage().resolver();
        let locks_dir = resolver.locks_dir();

        let lock_files = WalkDir::new(&locks_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry.path().extension().and_then(|e| e.to_str()) == Some(LOCK_EXTENSION)
            })
            .map(walkdir::DirEntry::into_path);

        for lock_path in lock_files {
            let Some(owner) = lock_owner(resolver.root(), &locks_dir, &resolver.tags_dir(), &lock_path)
            else {
                continue;
            };
            if owner.exists() {
                continue;
            }

            match FileLock::try_acquire(&lock_path) {
                Ok(Some(lock)) if !owner.exists() => match lock.remove() {
                    Ok(()) => tally.lock_files += 1,
                    Err(e) => {
                        warn!("could not remove lock file: {e}");
                        tally.failures += 1;
                    }
                },
                Ok(_) => {}
                Err(e) => {
                    warn!("could not inspect lock file: {e}");
                    tally.failures += 1;
                }
            }
        }
    }

    fn remove_empty_dirs(&self, tally: &mut VacuumTally) {
        for dir in scan::shard_dirs(self.storage().resolver()) {
            let empty = fs::read_dir(&dir)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if !empty {
                continue;
            }
            // A concurrent write may repopulate it first, which is fine
            match fs::remove_dir(&dir) {
                Ok(()) => tally.directories += 1,
                Err(e) => debug!("kept directory {}: {e}", dir.display()),
            }
        }
    }

    /// Remove every entry, then every tag index member left without one
    ///
    /// Returns `false` if anything could not be removed; details are logged.
    pub fn clear(&self) -> Result<bool> {
        let resolver = self.storage().resolver();
        let mut removed = 0;
        let mut failures = 0;

        let paths: Vec<PathBuf> = self.storage().entry_files().collect();
        let temp_files = stale_temp_files(resolver);
        for path in paths.iter().chain(&temp_files) {
            match remove_file(path) {
                Ok(true) if is_entry_file(path) => removed += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!("could not remove {}: {e}", path.display());
                    failures += 1;
                }
            }
        }

        match self.storage().tag_index().tags() {
            Ok(tags) => {
                for tag in tags {
                    if let Err(e) = self.prune_tag(&tag) {
                        warn!(tag = %tag, "could not prune tag index: {e}");
                        failures += 1;
                    }
                }
            }
            Err(e) => {
                warn!("could not list tag indexes: {e}");
                failures += 1;
            }
        }
        // Still populated if an entry was written during the clear
        if let Err(e) = fs::remove_dir(resolver.tags_dir()) {
            debug!("kept tag index directory: {e}");
        }

        let mut tally = VacuumTally::default();
        self.remove_empty_dirs(&mut tally);

        info!(removed, failures, "cache cleared");
        Ok(failures == 0)
    }

    /// Drop members of `tag` whose entry no longer carries it
    ///
    /// Each member is checked under its key lock, so an entry a concurrent
    /// write tagged stays reachable.
    fn prune_tag(&self, tag: &str) -> Result<()> {
        for key in self.storage().tag_index().members(tag)? {
            let _guard = self.storage().lock(&key)?;
            if !self.carries_tag(&key, tag)? {
                self.storage().tag_index().remove(tag, &key)?;
            }
        }
        Ok(())
    }

    /// Alias of [`clear`](Self::clear)
    pub fn flush(&self) -> Result<bool> {
        self.clear()
    }

    /// Counters plus freshly enumerated item count and size
    pub fn get_stats(&self) -> CacheStatistics {
        let (item_count, size) = self.live_totals();
        self.stats().snapshot(item_count, size)
    }

    pub fn reset_stats(&self) {
        self.stats().reset();
    }

    /// Number of live entries on disk
    pub fn get_item_count(&self) -> u64 {
        self.live_totals().0
    }

    /// Total payload size of live entries in bytes
    pub fn get_size(&self) -> u64 {
        self.live_totals().1
    }

    fn live_totals(&self) -> (u64, u64) {
        let now = now_millis();
        self.storage()
            .entry_files()
            .filter_map(|path| match read_header_at(&path) {
                Ok(Some(Ok(header))) if !header.is_expired_at(now) => Some(header.size),
                _ => None,
            })
            .fold((0, 0), |(count, size), entry_size| (count + 1, size + entry_size))
    }
}

/// Temp files old enough that no write in progress still owns them
fn stale_temp_files(resolver: &PathResolver) -> Vec<PathBuf> {
    scan::temp_files(resolver)
        .into_iter()
        .filter(|path| {
            fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|modified| modified.elapsed().unwrap_or_default() >= STALE_TEMP_AGE)
                .unwrap_or(false)
        })
        .collect()
}

/// File whose existence keeps a lock file in use
///
/// Entry locks mirror the entry tree under the locks directory; tag locks
/// live in its `tags` subdirectory.
fn lock_owner(root: &Path, locks_dir: &Path, tags_dir: &Path, lock_path: &Path) -> Option<PathBuf> {
    let relative = lock_path.strip_prefix(locks_dir).ok()?;
    let mut components = relative.components();
    let first = components.next()?;

    if first.as_os_str() == "tags" {
        let name = relative.file_name()?;
        return Some(tags_dir.join(name).with_extension(TAG_EXTENSION));
    }
    Some(root.join(relative).with_extension(ENTRY_EXTENSION))
}
