//! The `FileCache` facade
//!
//! A `FileCache` is a cheap handle: clones share the same configuration,
//! statistics and GC schedule. Several handles (or processes) may operate on
//! one root concurrently; the filesystem is the only shared state between
//! them.

use crate::codec::{now_millis, EntryCodec, EnvelopeHeader};
use crate::config::{CacheConfig, SerializerKind};
use crate::errors::{CacheError, RecoveryHint, Result};
use crate::health::HealthReport;
use crate::keys::{validate_tag, CacheKey};
use crate::paths::PathResolver;
use crate::stats::StatsTracker;
use crate::storage::{remove_file, Lookup, Storage};
use crate::tags::TaggedCache;
use crate::value::Value;
use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifetime of a written entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ttl {
    /// The configured default TTL
    #[default]
    Default,
    /// Never expires
    Never,
    /// Expires this many seconds from now; `<= 0` is expired on write
    Seconds(i64),
}

impl Ttl {
    /// Absolute expiry in unix ms, given the configured default in seconds
    pub fn expires_at(self, default_ttl: Option<i64>, now: i64) -> Option<i64> {
        let seconds = match self {
            Ttl::Default => default_ttl?,
            Ttl::Never => return None,
            Ttl::Seconds(seconds) => seconds,
        };
        Some(now.saturating_add(seconds.saturating_mul(1000)))
    }
}

impl From<i64> for Ttl {
    fn from(seconds: i64) -> Self {
        Ttl::Seconds(seconds)
    }
}

impl From<i32> for Ttl {
    fn from(seconds: i32) -> Self {
        Ttl::Seconds(i64::from(seconds))
    }
}

impl From<u32> for Ttl {
    fn from(seconds: u32) -> Self {
        Ttl::Seconds(i64::from(seconds))
    }
}

impl From<u64> for Ttl {
    fn from(seconds: u64) -> Self {
        Ttl::Seconds(i64::try_from(seconds).unwrap_or(i64::MAX))
    }
}

/// `None` never expires
impl From<Option<i64>> for Ttl {
    fn from(seconds: Option<i64>) -> Self {
        seconds.map_or(Ttl::Never, Ttl::Seconds)
    }
}

impl From<Duration> for Ttl {
    fn from(duration: Duration) -> Self {
        Ttl::Seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
    }
}

/// Metadata of a live entry, read from its header alone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryMetadata {
    pub key: String,
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
    /// Serialized payload size in bytes
    pub size: u64,
    /// Bytes stored on disk after compression
    pub stored_size: u64,
    pub compressed: bool,
    pub serializer: SerializerKind,
    pub tags: Vec<String>,
}

impl EntryMetadata {
    fn from_header(header: EnvelopeHeader, path: PathBuf) -> Self {
        Self {
            path,
            created_at: millis_to_datetime(header.created_at),
            expires_at: header.expires_at.map(millis_to_datetime),
            size: header.size,
            stored_size: header.stored_len,
            compressed: header.is_compressed(),
            serializer: header.serializer,
            tags: header.tags,
            key: header.key,
        }
    }
}

/// Out-of-range timestamps clamp to the nearest representable instant
fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or(if millis < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// File-backed key/value cache
#[derive(Debug, Clone)]
pub struct FileCache {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: CacheConfig,
    storage: Storage,
    stats: StatsTracker,
    last_gc: Mutex<Option<Instant>>,
}

impl FileCache {
    /// Open a cache, creating the root directory if needed
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let root = config.root_dir.clone();
        fs::create_dir_all(&root).map_err(|e| CacheError::Configuration {
            message: format!("cannot create cache directory '{}': {e}", root.display()),
            recovery_hint: RecoveryHint::CheckPermissions { path: root.clone() },
        })?;

        let health = HealthReport::probe(&root);
        if !health.healthy() {
            return Err(CacheError::Configuration {
                message: format!(
                    "cache directory '{}' must be readable and writable (readable: {}, writable: {})",
                    root.display(),
                    health.readable,
                    health.writable
                ),
                recovery_hint: RecoveryHint::CheckPermissions { path: root },
            });
        }

        let storage = Storage::new(
            PathResolver::new(&config.root_dir, config.sharding),
            EntryCodec::from_config(&config),
        );
        debug!("opened file cache at {}", config.root_dir.display());

        Ok(Self {
            inner: Arc::new(Inner {
                stats: StatsTracker::new(config.statistics_enabled),
                config,
                storage,
                last_gc: Mutex::new(None),
            }),
        })
    }

    /// Open a cache at `root` with default settings
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::new(CacheConfig::new(root))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub(crate) fn storage(&self) -> &Storage {
        &self.inner.storage
    }

    pub(crate) fn stats(&self) -> &StatsTracker {
        &self.inner.stats
    }

    pub(crate) fn last_gc(&self) -> &Mutex<Option<Instant>> {
        &self.inner.last_gc
    }

    /// Absolute expiry for a write made now
    pub(crate) fn expiry(&self, ttl: Ttl) -> Option<i64> {
        ttl.expires_at(self.inner.config.default_ttl, now_millis())
    }

    /// Entry file path for `key`, for diagnostics
    pub fn get_path(&self, key: &str) -> Result<PathBuf> {
        key.validate()?;
        Ok(self.storage().entry_path(key))
    }

    /// Store `value` under `key`
    pub fn set(&self, key: &str, value: impl Into<Value>, ttl: impl Into<Ttl>) -> Result<bool> {
        self.store(key, value.into(), ttl.into(), Vec::new())
    }

    /// Store `value` with no expiry
    pub fn forever(&self, key: &str, value: impl Into<Value>) -> Result<bool> {
        self.set(key, value, Ttl::Never)
    }

    pub(crate) fn store(&self, key: &str, value: Value, ttl: Ttl, tags: Vec<String>) -> Result<bool> {
        key.validate()?;
        let tags = normalize_tags(tags)?;
        self.store_validated(key, &value, ttl, tags)
    }

    fn store_validated(&self, key: &str, value: &Value, ttl: Ttl, tags: Vec<String>) -> Result<bool> {
        let expires_at = self.expiry(ttl);
        let guard = self.storage().lock(key)?;
        self.storage().write(&guard, key, value, None, expires_at, tags)?;
        self.stats().write();
        debug!(key, "stored entry");
        Ok(true)
    }

    /// Store every pair; keys are all validated before the first write
    pub fn set_multiple<K, V, I>(&self, items: I, ttl: impl Into<Ttl>) -> Result<bool>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.store_multiple(items, ttl.into(), Vec::new())
    }

    pub(crate) fn store_multiple<K, V, I>(&self, items: I, ttl: Ttl, tags: Vec<String>) -> Result<bool>
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let items: Vec<(K, Value)> = items
            .into_iter()
            .map(|(key, value)| (key, value.into()))
            .collect();
        for (key, _) in &items {
            key.validate()?;
        }
        let tags = normalize_tags(tags)?;

        for (key, value) in &items {
            self.store_validated(key.as_ref(), value, ttl, tags.clone())?;
        }
        Ok(true)
    }

    /// Value stored under `key`; `None` when absent, expired or unreadable
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        key.validate()?;
        let value = self.read_live(key);
        self.stats().lookup(value.is_some());
        debug!(key, hit = value.is_some(), "get");
        Ok(value)
    }

    /// Value stored under `key`, or `default`
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or_else(|| default.into()))
    }

    /// Values for every key, `None` for misses
    pub fn get_multiple<K, I>(&self, keys: I) -> Result<IndexMap<String, Option<Value>>>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = K>,
    {
        let keys = validated_keys(keys)?;
        Ok(keys
            .into_iter()
            .map(|key| {
                let value = self.read_live(&key);
                self.stats().lookup(value.is_some());
                (key, value)
            })
            .collect())
    }

    /// Unlocked read of a live value; anything unservable is healed and missed
    pub(crate) fn read_live(&self, key: &str) -> Option<Value> {
        let lookup = match self.storage().lookup(key) {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("treating unreadable entry for '{key}' as a miss: {e}");
                return None;
            }
        };

        match lookup {
            Lookup::Live(entry) => match entry.value() {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("entry for '{key}' failed to decode: {e}");
                    self.heal(key);
                    None
                }
            },
            Lookup::Expired(_) | Lookup::Corrupt(_) => {
                self.heal(key);
                None
            }
            Lookup::Absent => None,
        }
    }

    fn heal(&self, key: &str) {
        if let Err(e) = self.storage().heal(key) {
            warn!("could not remove stale entry for '{key}': {e}");
        }
    }

    /// Whether a live entry exists, without decoding its payload
    pub fn has(&self, key: &str) -> Result<bool> {
        key.validate()?;
        Ok(self.has_validated(key))
    }

    fn has_validated(&self, key: &str) -> bool {
        match self.storage().lookup_header(key) {
            Ok(Lookup::Live(_)) => true,
            Ok(Lookup::Expired(_) | Lookup::Corrupt(_)) => {
                self.heal(key);
                false
            }
            Ok(Lookup::Absent) => false,
            Err(e) => {
                warn!("treating unreadable entry for '{key}' as absent: {e}");
                false
            }
        }
    }

    /// Presence of every key
    pub fn has_multiple<K, I>(&self, keys: I) -> Result<IndexMap<String, bool>>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = K>,
    {
        let keys = validated_keys(keys)?;
        Ok(keys
            .into_iter()
            .map(|key| {
                let present = self.has_validated(&key);
                (key, present)
            })
            .collect())
    }

    /// Remove `key`; `Ok(false)` when there was nothing to remove
    pub fn delete(&self, key: &str) -> Result<bool> {
        key.validate()?;
        self.delete_validated(key)
    }

    fn delete_validated(&self, key: &str) -> Result<bool> {
        let guard = self.storage().lock(key)?;
        let removed = self.storage().remove(&guard, key)?;
        if removed {
            self.stats().delete(1);
        }
        debug!(key, removed, "delete");
        Ok(removed)
    }

    /// Remove every key, reporting whether each one had an entry
    pub fn delete_multiple<K, I>(&self, keys: I) -> Result<IndexMap<String, bool>>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = K>,
    {
        let keys = validated_keys(keys)?;
        let mut removed = IndexMap::with_capacity(keys.len());
        for key in keys {
            let existed = self.delete_validated(&key)?;
            removed.insert(key, existed);
        }
        Ok(removed)
    }

    /// Give a live entry a new TTL; `false` if it is absent or expired
    pub fn touch(&self, key: &str, ttl: impl Into<Ttl>) -> Result<bool> {
        key.validate()?;
        let expires_at = self.expiry(ttl.into());

        let guard = self.storage().lock(key)?;
        match self.storage().lookup(key)? {
            Lookup::Live(entry) => {
                let mut header = entry.header.clone();
                header.expires_at = expires_at;
                self.storage().rewrite_header(&guard, &entry, header)?;
                debug!(key, "touched entry");
                Ok(true)
            }
            Lookup::Expired(_) => {
                self.storage().remove(&guard, key)?;
                Ok(false)
            }
            Lookup::Corrupt(e) => {
                warn!("removing corrupt entry for '{key}': {e}");
                remove_file(&self.storage().entry_path(key))?;
                Ok(false)
            }
            Lookup::Absent => Ok(false),
        }
    }

    /// Metadata of a live entry
    pub fn get_metadata(&self, key: &str) -> Result<Option<EntryMetadata>> {
        key.validate()?;
        Ok(match self.storage().lookup_header(key)? {
            Lookup::Live(header) => Some(EntryMetadata::from_header(
                header,
                self.storage().entry_path(key),
            )),
            Lookup::Expired(_) | Lookup::Corrupt(_) | Lookup::Absent => None,
        })
    }

    /// True iff an entry exists on disk but has expired
    pub fn is_expired(&self, key: &str) -> Result<bool> {
        key.validate()?;
        Ok(matches!(
            self.storage().lookup_header(key)?,
            Lookup::Expired(_)
        ))
    }

    /// Remaining lifetime of a live entry in whole seconds, rounded up
    ///
    /// `Some(None)` means the entry never expires.
    pub fn ttl(&self, key: &str) -> Result<Option<Option<i64>>> {
        key.validate()?;
        Ok(match self.storage().lookup_header(key)? {
            Lookup::Live(header) => Some(header.expires_at.map(|expires_at| {
                let remaining = expires_at - now_millis();
                (remaining + 999).div_euclid(1000)
            })),
            _ => None,
        })
    }

    /// Tags of a live entry
    pub fn get_tags(&self, key: &str) -> Result<Option<Vec<String>>> {
        key.validate()?;
        Ok(match self.storage().lookup_header(key)? {
            Lookup::Live(header) => Some(header.tags),
            _ => None,
        })
    }

    /// Scope subsequent writes to a fixed tag set
    ///
    /// Tags are validated when the scope writes.
    pub fn tags<T, I>(&self, tags: I) -> TaggedCache<'_>
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        TaggedCache::new(self, tags.into_iter().map(Into::into).collect())
    }

    /// Delete every entry carrying `tag`; returns how many were removed
    pub fn delete_by_tag(&self, tag: &str) -> Result<usize> {
        validate_tag(tag)?;
        let members = self.storage().tag_index().members(tag)?;

        // Each member leaves the index only once it is settled, so members
        // that fail stay reachable by a later call
        let mut deleted = 0;
        let mut first_error = None;
        for key in members {
            match self.invalidate_member(tag, &key) {
                Ok(removed) => deleted += usize::from(removed),
                Err(e) => {
                    warn!(tag, key = %key, "could not invalidate tagged entry: {e}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        self.stats().delete(deleted as u64);
        info!(tag, deleted, "invalidated tag");
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// Delete `key` if its header still carries `tag`, otherwise drop the
    /// stale index member
    fn invalidate_member(&self, tag: &str, key: &str) -> Result<bool> {
        let guard = self.storage().lock(key)?;
        if self.carries_tag(key, tag)? {
            return self.storage().remove(&guard, key);
        }
        self.storage().tag_index().remove(tag, key)?;
        Ok(false)
    }

    /// Whether `key`'s entry header lists `tag`; call with the key lock held
    pub(crate) fn carries_tag(&self, key: &str, tag: &str) -> Result<bool> {
        Ok(match self.storage().lookup_header(key)? {
            Lookup::Live(header) | Lookup::Expired(header) => header.tags.iter().any(|t| t == tag),
            Lookup::Corrupt(_) | Lookup::Absent => false,
        })
    }

    /// Probe the root directory without modifying it
    pub fn health_check(&self) -> HealthReport {
        HealthReport::probe(&self.inner.config.root_dir)
    }
}

/// Validate and de-duplicate tags, keeping first-seen order
fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        validate_tag(&tag)?;
        if !normalized.contains(&tag) {
            normalized.push(tag);
        }
    }
    Ok(normalized)
}

fn validated_keys<K, I>(keys: I) -> Result<Vec<String>>
where
    K: AsRef<str>,
    I: IntoIterator<Item = K>,
{
    keys.into_iter()
        .map(|key| {
            key.validate()?;
            Ok(key.as_ref().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(dir: &TempDir) -> FileCache {
        FileCache::open(dir.path()).unwrap()
    }

    #[test]
    fn test_ttl_resolution() {
        assert_eq!(Ttl::Default.expires_at(None, 1_000), None);
        assert_eq!(Ttl::Default.expires_at(Some(2), 1_000), Some(3_000));
        assert_eq!(Ttl::Never.expires_at(Some(2), 1_000), None);
        assert_eq!(Ttl::Seconds(0).expires_at(None, 1_000), Some(1_000));
        assert_eq!(Ttl::from(None::<i64>), Ttl::Never);
        assert_eq!(Ttl::from(Duration::from_secs(90)), Ttl::Seconds(90));
    }

    #[test]
    fn test_set_get_has_delete() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        assert!(!cache.has("k").unwrap());
        assert!(cache.set("k", "v", Ttl::Never).unwrap());
        assert_eq!(cache.get("k").unwrap(), Some(Value::from("v")));
        assert!(cache.has("k").unwrap());
        assert!(cache.delete("k").unwrap());
        assert!(!cache.delete("k").unwrap());
        assert_eq!(cache.get_or("k", 0).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_null_and_false_are_values() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.set("null", Value::Null, Ttl::Never).unwrap();
        cache.set("false", false, Ttl::Never).unwrap();

        assert_eq!(cache.get("null").unwrap(), Some(Value::Null));
        assert_eq!(cache.get("false").unwrap(), Some(Value::Bool(false)));
    }

    #[test]
    fn test_zero_ttl_is_written_but_unobservable() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.set("gone", 1, 0).unwrap();

        assert!(cache.is_expired("gone").unwrap());
        assert!(!cache.has("gone").unwrap());
        assert!(!cache.get_path("gone").unwrap().exists());
    }

    #[test]
    fn test_invalid_key_performs_no_write() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);

        let err = cache
            .set_multiple([("fine", 1), ("bad{key", 2)], Ttl::Never)
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!cache.has("fine").unwrap());
    }

    #[test]
    fn test_metadata_ttl_and_tags() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.tags(["feed", "feed"]).set("item", "body", 60).unwrap();

        let meta = cache.get_metadata("item").unwrap().unwrap();
        assert_eq!(meta.tags, vec!["feed".to_string()]);
        assert!(meta.size > 0);
        assert!(meta.expires_at.is_some());

        let remaining = cache.ttl("item").unwrap().unwrap().unwrap();
        assert!((59..=60).contains(&remaining));
        assert_eq!(cache.get_tags("item").unwrap(), Some(vec!["feed".to_string()]));
        assert_eq!(cache.ttl("missing").unwrap(), None);
    }

    #[test]
    fn test_touch_only_live_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.set("live", 1, 60).unwrap();
        cache.set("stale", 1, -1).unwrap();

        assert!(cache.touch("live", Ttl::Never).unwrap());
        assert_eq!(cache.ttl("live").unwrap(), Some(None));
        assert!(!cache.touch("stale", 60).unwrap());
        assert!(!cache.touch("missing", 60).unwrap());
    }

    #[test]
    fn test_unwritable_root_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").unwrap();

        let err = FileCache::open(&file).unwrap_err();
        assert!(matches!(err, CacheError::Configuration { .. }));
    }

    #[test]
    fn test_far_future_expiry_stays_in_the_future() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.set("k", 1, i64::MAX).unwrap();

        assert!(cache.has("k").unwrap());
        let metadata = cache.get_metadata("k").unwrap().unwrap();
        assert_eq!(metadata.expires_at, Some(DateTime::<Utc>::MAX_UTC));
        assert_eq!(millis_to_datetime(i64::MIN), DateTime::<Utc>::MIN_UTC);
    }
}
