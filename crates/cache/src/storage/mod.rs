//! Storage engine: entry files, per-key locks and the tag index
//!
//! Every read path goes through one resolve-and-validate step that classifies
//! an entry file as [`Lookup::Absent`], [`Lookup::Live`], [`Lookup::Expired`]
//! or [`Lookup::Corrupt`]. Unlocked readers never delete anything directly;
//! stale or corrupt files are dropped by [`Storage::heal`], which re-checks
//! under the key lock so a concurrent rewrite is never lost.
//!
//! Lock order is always key before tag.

pub(crate) mod scan;

use crate::codec::{now_millis, EntryCodec, EnvelopeHeader};
use crate::errors::{CacheError, Result};
use crate::paths::PathResolver;
use crate::tags::TagIndex;
use crate::value::Value;
use filecache_utils::{write_atomic, FileLock};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A write can race with vacuum removing the (empty) shard directory it
/// targets; the directory is recreated on retry
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Outcome of resolving a key to its entry file
#[derive(Debug)]
pub(crate) enum Lookup<T> {
    /// No file, or a file belonging to a different key
    Absent,
    Live(T),
    Expired(EnvelopeHeader),
    Corrupt(CacheError),
}

/// A validated entry file held in memory
#[derive(Debug)]
pub(crate) struct RawEntry {
    pub header: EnvelopeHeader,
    bytes: Vec<u8>,
    offset: usize,
}

impl RawEntry {
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.offset..]
    }

    pub fn value(&self) -> Result<Value> {
        EntryCodec::decode_value(&self.header, self.payload())
    }
}

/// Proof that the exclusive lock for one key is held
#[derive(Debug)]
pub(crate) struct KeyGuard {
    _lock: FileLock,
}

#[derive(Debug)]
pub(crate) struct Storage {
    resolver: PathResolver,
    codec: EntryCodec,
    tags: TagIndex,
}

impl Storage {
    pub fn new(resolver: PathResolver, codec: EntryCodec) -> Self {
        let tags = TagIndex::new(resolver.clone());
        Self {
            resolver,
            codec,
            tags,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn tag_index(&self) -> &TagIndex {
        &self.tags
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.resolver.entry_path(key)
    }

    /// Block until the exclusive lock for `key` is held
    pub fn lock(&self, key: &str) -> Result<KeyGuard> {
        let lock = FileLock::acquire(&self.resolver.entry_lock_path(key))?;
        Ok(KeyGuard { _lock: lock })
    }

    /// Read and validate the whole entry file for `key`
    pub fn lookup(&self, key: &str) -> Result<Lookup<RawEntry>> {
        let path = self.entry_path(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Lookup::Absent),
            Err(e) => return Err(CacheError::io(path, "read entry", e)),
        };

        let (header, offset) = match EnvelopeHeader::split(&bytes) {
            Ok((header, payload)) => (header, bytes.len() - payload.len()),
            Err(e) => return Ok(Lookup::Corrupt(e)),
        };

        Ok(match classify(key, header) {
            Lookup::Live(header) => Lookup::Live(RawEntry {
                header,
                bytes,
                offset,
            }),
            Lookup::Expired(header) => Lookup::Expired(header),
            Lookup::Corrupt(e) => Lookup::Corrupt(e),
            Lookup::Absent => Lookup::Absent,
        })
    }

    /// Read and validate only the header for `key`
    pub fn lookup_header(&self, key: &str) -> Result<Lookup<EnvelopeHeader>> {
        let path = self.entry_path(key);
        match read_header_at(&path)? {
            None => Ok(Lookup::Absent),
            Some(Err(e)) => Ok(Lookup::Corrupt(e)),
            Some(Ok(header)) => Ok(classify(key, header)),
        }
    }

    /// Tags currently recorded in `key`'s file, whether or not it has expired
    fn recorded_tags(&self, key: &str) -> Result<Vec<String>> {
        Ok(match self.lookup_header(key)? {
            Lookup::Live(header) | Lookup::Expired(header) => header.tags,
            Lookup::Absent | Lookup::Corrupt(_) => Vec::new(),
        })
    }

    /// Encode and store `value`, moving tag memberships from the previous entry
    ///
    /// New memberships are recorded before the entry is written and stale
    /// ones dropped after, so an interrupted write leaves at worst an extra
    /// index member, which tag invalidation ignores.
    pub fn write(
        &self,
        _guard: &KeyGuard,
        key: &str,
        value: &Value,
        created_at: Option<i64>,
        expires_at: Option<i64>,
        tags: Vec<String>,
    ) -> Result<()> {
        let previous = self.recorded_tags(key)?;
        for tag in &tags {
            self.tags.add(tag, key)?;
        }

        let bytes = self.codec.encode(
            key,
            value,
            created_at.unwrap_or_else(now_millis),
            expires_at,
            tags.clone(),
        )?;
        self.write_file(key, &bytes)?;

        for tag in previous.iter().filter(|tag| !tags.contains(tag)) {
            self.tags.remove(tag, key)?;
        }
        Ok(())
    }

    /// Store `entry`'s payload again under a modified header
    pub fn rewrite_header(
        &self,
        _guard: &KeyGuard,
        entry: &RawEntry,
        header: EnvelopeHeader,
    ) -> Result<()> {
        let key = header.key.clone();
        let bytes = EntryCodec::reencode(header, entry.payload())?;
        self.write_file(&key, &bytes)
    }

    fn write_file(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.entry_path(key);
        let mut attempt = 1;
        loop {
            match write_atomic(&path, bytes) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_not_found() && attempt < MAX_WRITE_ATTEMPTS => {
                    debug!("shard directory for {} vanished, retrying write", path.display());
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Delete `key`'s entry and its tag memberships; `false` if there was none
    pub fn remove(&self, _guard: &KeyGuard, key: &str) -> Result<bool> {
        let tags = self.recorded_tags(key)?;
        let removed = remove_file(&self.entry_path(key))?;
        for tag in &tags {
            self.tags.remove(tag, key)?;
        }
        Ok(removed)
    }

    /// Drop `key`'s file if it still cannot be served once the lock is held
    pub fn heal(&self, key: &str) -> Result<()> {
        let guard = self.lock(key)?;
        match self.lookup(key)? {
            Lookup::Expired(_) => {
                debug!("removing expired entry for '{key}'");
                self.remove(&guard, key)?;
            }
            Lookup::Corrupt(e) => {
                warn!("removing corrupt entry for '{key}': {e}");
                remove_file(&self.entry_path(key))?;
            }
            Lookup::Live(entry) => {
                if let Err(e) = entry.value() {
                    warn!("removing undecodable entry for '{key}': {e}");
                    self.remove(&guard, key)?;
                }
            }
            Lookup::Absent => {}
        }
        Ok(())
    }

    /// Paths of every entry file under the root
    pub fn entry_files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        scan::entry_files(&self.resolver)
    }
}

/// Apply collision and expiry checks to a header that decoded cleanly
fn classify(key: &str, header: EnvelopeHeader) -> Lookup<EnvelopeHeader> {
    if header.key != key {
        debug!("entry file for '{key}' belongs to '{}'", header.key);
        return Lookup::Absent;
    }
    if header.is_expired_at(now_millis()) {
        return Lookup::Expired(header);
    }
    Lookup::Live(header)
}

/// Header of the entry file at `path`; `None` when the file does not exist
pub(crate) fn read_header_at(path: &Path) -> Result<Option<Result<EnvelopeHeader>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::io(path, "open entry", e)),
    };
    Ok(Some(EnvelopeHeader::read_from(BufReader::new(file))))
}

/// Remove a file, treating a missing file as already removed
pub(crate) fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CacheError::io(path, "remove entry", e)),
    }
}
