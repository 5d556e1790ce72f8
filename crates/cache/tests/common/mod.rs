//! Shared helpers for the filecache integration tests
#![allow(dead_code)]

use filecache::{CacheConfig, CacheConfigBuilder, CompressionAlgorithm, FileCache, SerializerKind};
use tempfile::TempDir;

/// Builder for caches rooted in a fresh temporary directory
pub struct TestCacheBuilder {
    dir: TempDir,
    builder: CacheConfigBuilder,
}

impl TestCacheBuilder {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let builder = CacheConfig::builder(dir.path());
        Self { dir, builder }
    }

    pub fn sharded(mut self, depth: usize) -> Self {
        self.builder = self.builder.sharding(depth);
        self
    }

    pub fn json(mut self) -> Self {
        self.builder = self.builder.serializer(SerializerKind::Json);
        self
    }

    pub fn compressed(mut self, algorithm: CompressionAlgorithm, min_size: usize) -> Self {
        let level = match algorithm {
            CompressionAlgorithm::Zstd => 3,
            CompressionAlgorithm::Gzip => 6,
        };
        self.builder = self.builder.compression(algorithm, level, min_size);
        self
    }

    pub fn default_ttl(mut self, seconds: i64) -> Self {
        self.builder = self.builder.default_ttl(Some(seconds));
        self
    }

    /// The cache and the directory that must outlive it
    pub fn build(self) -> (FileCache, TempDir) {
        let cache = FileCache::new(self.builder.build().unwrap()).unwrap();
        (cache, self.dir)
    }
}

/// A flat, uncompressed cache with default settings
pub fn test_cache() -> (FileCache, TempDir) {
    TestCacheBuilder::new().build()
}

/// A second handle on the same root, as another process would open it
pub fn reopen(cache: &FileCache) -> FileCache {
    FileCache::new(cache.config().clone()).unwrap()
}
