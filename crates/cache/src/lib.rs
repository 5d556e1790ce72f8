//! File-backed key/value cache
//!
//! Entries live one per file under a root directory, with per-entry expiry,
//! tag-based invalidation and locked read-modify-write operations that stay
//! correct across threads and processes sharing the root. The filesystem is
//! the only source of truth; nothing about entries is kept in memory between
//! calls.
//!
//! ```no_run
//! use filecache::{CacheConfig, FileCache, Ttl};
//!
//! # fn main() -> filecache::Result<()> {
//! let cache = FileCache::new(CacheConfig::builder("/tmp/feeds").sharding(2).build()?)?;
//! cache.set("feed.1", "<rss/>", 300)?;
//! cache.tags(["feeds"]).set("feed.2", "<rss/>", Ttl::Default)?;
//! assert_eq!(cache.increment("fetches", 1)?, 1);
//! cache.delete_by_tag("feeds")?;
//! # Ok(())
//! # }
//! ```

mod atomic;
pub mod cache;
pub mod codec;
pub mod config;
pub mod errors;
pub mod health;
pub mod keys;
mod maintenance;
pub mod paths;
pub mod stats;
mod storage;
pub mod tags;
pub mod value;

pub use cache::{EntryMetadata, FileCache, Ttl};
pub use config::{
    CacheConfig, CacheConfigBuilder, CacheConfigLoader, CompressionAlgorithm, CompressionConfig,
    ConfigSource, PartialConfig, SerializerKind, ShardingConfig,
};
pub use errors::{CacheError, RecoveryHint, Result, SerializationOp};
pub use health::HealthReport;
pub use keys::{validate_tag, CacheKey, MAX_KEY_LENGTH, RESERVED_CHARACTERS};
pub use stats::CacheStatistics;
pub use tags::TaggedCache;
pub use value::{Value, ValueMap};
