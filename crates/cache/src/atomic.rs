//! Locked read-modify-write operations
//!
//! Each operation holds the key's lock from the read until the write has been
//! renamed into place, so concurrent callers on the same key serialize.

use crate::cache::{FileCache, Ttl};
use crate::codec::EnvelopeHeader;
use crate::errors::{CacheError, Result};
use crate::keys::CacheKey;
use crate::storage::{remove_file, Lookup};
use crate::value::Value;
use tracing::{debug, warn};

impl FileCache {
    /// Add `by` to the integer under `key`, treating a missing entry as 0
    ///
    /// An existing entry keeps its expiry and tags; a new one gets the
    /// default TTL.
    pub fn increment(&self, key: &str, by: i64) -> Result<i64> {
        self.adjust(key, by)
    }

    /// Subtract `by` from the integer under `key`
    pub fn decrement(&self, key: &str, by: i64) -> Result<i64> {
        let delta = by
            .checked_neg()
            .ok_or_else(|| CacheError::invalid_value(key, format!("cannot decrement by {by}")))?;
        self.adjust(key, delta)
    }

    fn adjust(&self, key: &str, delta: i64) -> Result<i64> {
        key.validate()?;
        let guard = self.storage().lock(key)?;

        let (current, created_at, expires_at, tags) = match self.live_value(key)? {
            Some((value, header)) => {
                let current = value.as_counter().ok_or_else(|| {
                    CacheError::invalid_value(
                        key,
                        format!("{} value is not an integer", value.type_name()),
                    )
                })?;
                (current, Some(header.created_at), header.expires_at, header.tags)
            }
            None => (0, None, self.expiry(Ttl::Default), Vec::new()),
        };

        let next = current.checked_add(delta).ok_or_else(|| {
            CacheError::invalid_value(key, format!("{current} + {delta} overflows a 64-bit integer"))
        })?;

        self.storage()
            .write(&guard, key, &Value::Int(next), created_at, expires_at, tags)?;
        self.stats().write();
        debug!(key, value = next, "adjusted counter");
        Ok(next)
    }

    /// Decoded live value and its header; the caller must hold the key lock
    fn live_value(&self, key: &str) -> Result<Option<(Value, EnvelopeHeader)>> {
        Ok(match self.storage().lookup(key)? {
            Lookup::Live(entry) => match entry.value() {
                Ok(value) => Some((value, entry.header)),
                Err(e) => {
                    warn!("replacing undecodable entry for '{key}': {e}");
                    None
                }
            },
            Lookup::Corrupt(e) => {
                warn!("replacing corrupt entry for '{key}': {e}");
                None
            }
            Lookup::Expired(_) | Lookup::Absent => None,
        })
    }

    /// Cached value for `key`, or the result of `compute` stored with `ttl`
    ///
    /// After an unlocked miss the key lock is taken and the key checked again,
    /// so concurrent callers compute at most once per miss. `compute` runs
    /// while the lock is held and must not use this cache's `key`.
    pub fn remember<V, F>(&self, key: &str, ttl: impl Into<Ttl>, compute: F) -> Result<Value>
    where
        V: Into<Value>,
        F: FnOnce() -> V,
    {
        self.try_remember(key, ttl, || Ok::<V, CacheError>(compute()))
    }

    /// [`remember`](Self::remember) with no expiry
    pub fn remember_forever<V, F>(&self, key: &str, compute: F) -> Result<Value>
    where
        V: Into<Value>,
        F: FnOnce() -> V,
    {
        self.remember(key, Ttl::Never, compute)
    }

    /// [`remember`](Self::remember) with a fallible `compute`; nothing is stored on error
    pub fn try_remember<V, E, F>(
        &self,
        key: &str,
        ttl: impl Into<Ttl>,
        compute: F,
    ) -> std::result::Result<Value, E>
    where
        V: Into<Value>,
        E: From<CacheError>,
        F: FnOnce() -> std::result::Result<V, E>,
    {
        key.validate()?;
        if let Some(value) = self.read_live(key) {
            self.stats().hit();
            return Ok(value);
        }

        let guard = self.storage().lock(key)?;
        if let Some((value, _)) = self.live_value(key)? {
            self.stats().hit();
            return Ok(value);
        }
        self.stats().miss();

        let value = compute()?.into();
        self.storage()
            .write(&guard, key, &value, None, self.expiry(ttl.into()), Vec::new())?;
        self.stats().write();
        debug!(key, "computed and stored entry");
        Ok(value)
    }

    /// Read and delete `key` in one locked sequence
    pub fn pull(&self, key: &str) -> Result<Option<Value>> {
        key.validate()?;
        let guard = self.storage().lock(key)?;

        let value = match self.storage().lookup(key)? {
            Lookup::Live(entry) => {
                let value = entry.value().ok();
                self.storage().remove(&guard, key)?;
                self.stats().delete(1);
                value
            }
            Lookup::Expired(_) => {
                self.storage().remove(&guard, key)?;
                None
            }
            Lookup::Corrupt(e) => {
                warn!("removing corrupt entry for '{key}': {e}");
                remove_file(&self.storage().entry_path(key))?;
                None
            }
            Lookup::Absent => None,
        };

        self.stats().lookup(value.is_some());
        Ok(value)
    }

    /// [`pull`](Self::pull) with a fallback for misses
    pub fn pull_or(&self, key: &str, default: impl Into<Value>) -> Result<Value> {
        Ok(self.pull(key)?.unwrap_or_else(|| default.into()))
    }

    /// Store `value` only if `key` has no live entry; `true` if it was written
    pub fn add(&self, key: &str, value: impl Into<Value>, ttl: impl Into<Ttl>) -> Result<bool> {
        key.validate()?;
        let guard = self.storage().lock(key)?;
        if matches!(self.storage().lookup_header(key)?, Lookup::Live(_)) {
            return Ok(false);
        }

        self.storage()
            .write(&guard, key, &value.into(), None, self.expiry(ttl.into()), Vec::new())?;
        self.stats().write();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{FileCache, Ttl};
    use crate::value::Value;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[test]
    fn test_counter_arithmetic() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        assert_eq!(cache.increment("hits", 1).unwrap(), 1);
        assert_eq!(cache.increment("n", 5).unwrap(), 5);
        assert_eq!(cache.decrement("n", 2).unwrap(), 3);
        assert_eq!(cache.decrement("fresh", 1).unwrap(), -1);
    }

    #[test]
    fn test_counter_keeps_expiry_and_tags() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.tags(["stats"]).set("views", 10, 600).unwrap();

        cache.increment("views", 1).unwrap();
        assert!(cache.ttl("views").unwrap().unwrap().is_some());
        assert_eq!(cache.get_tags("views").unwrap(), Some(vec!["stats".to_string()]));
    }

    #[test]
    fn test_numeric_string_counts() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.set("n", "41", Ttl::Never).unwrap();
        assert_eq!(cache.increment("n", 1).unwrap(), 42);
    }

    #[test]
    fn test_non_numeric_and_overflow_are_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        cache.set("word", "abc", Ttl::Never).unwrap();
        cache.set("max", i64::MAX, Ttl::Never).unwrap();

        assert!(cache.increment("word", 1).is_err());
        assert!(cache.increment("max", 1).is_err());
        assert!(cache.decrement("x", i64::MIN).is_err());
        assert_eq!(cache.get("max").unwrap(), Some(Value::Int(i64::MAX)));
    }

    #[test]
    fn test_remember_computes_once() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        let calls = Cell::new(0);

        for _ in 0..3 {
            let value = cache
                .remember("report", 60, || {
                    calls.set(calls.get() + 1);
                    "built"
                })
                .unwrap();
            assert_eq!(value, Value::from("built"));
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_try_remember_stores_nothing_on_error() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        let result: Result<Value, Box<dyn std::error::Error + Send + Sync>> =
            cache.try_remember("k", Ttl::Never, || Err::<i64, _>("offline".into()));
        assert_eq!(result.unwrap_err().to_string(), "offline");
        assert!(!cache.has("k").unwrap());
    }

    #[test]
    fn test_pull_and_add() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();

        assert!(cache.add("once", 1, Ttl::Never).unwrap());
        assert!(!cache.add("once", 2, Ttl::Never).unwrap());
        assert_eq!(cache.pull("once").unwrap(), Some(Value::Int(1)));
        assert!(!cache.has("once").unwrap());
        assert_eq!(cache.pull_or("once", "d").unwrap(), Value::from("d"));
    }
}
