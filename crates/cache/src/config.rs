//! Cache configuration with precedence and validation
use crate::errors::{CacheError, RecoveryHint, Result, SerializationOp};
use filecache_utils::XdgPaths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default shard depth when sharding is enabled
pub const DEFAULT_SHARD_DEPTH: usize = 2;

/// Deepest supported shard nesting
pub const MAX_SHARD_DEPTH: usize = 4;

/// Default zstd compression level (3 = fast with good compression)
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Payloads smaller than this are stored uncompressed
pub const DEFAULT_COMPRESSION_MIN_SIZE: usize = 1024;

/// Minimum time between two non-forced collections by one handle
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(3600);

/// Serializer used for entry payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    /// Full-fidelity binary encoding of [`crate::Value`]
    #[default]
    Native,
    /// JSON; objects come back as maps
    Json,
}

impl SerializerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializerKind::Native => "native",
            SerializerKind::Json => "json",
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SerializerKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(SerializerKind::Native),
            "json" => Ok(SerializerKind::Json),
            other => Err(CacheError::invalid_config(
                "serializer",
                format!("unknown serializer '{other}', expected 'native' or 'json'"),
            )),
        }
    }
}

/// Compression algorithm applied to payloads above the size threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    Zstd,
    Gzip,
}

impl CompressionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Zstd => "zstd",
            CompressionAlgorithm::Gzip => "gzip",
        }
    }

    /// Accepted compression levels
    pub fn level_range(&self) -> std::ops::RangeInclusive<i32> {
        match self {
            CompressionAlgorithm::Zstd => 1..=22,
            CompressionAlgorithm::Gzip => 0..=9,
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zstd" => Ok(CompressionAlgorithm::Zstd),
            "gzip" | "gz" => Ok(CompressionAlgorithm::Gzip),
            other => Err(CacheError::invalid_config(
                "compression.algorithm",
                format!("unknown compression algorithm '{other}', expected 'zstd' or 'gzip'"),
            )),
        }
    }
}

/// Compression configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionConfig {
    /// Whether compression is enabled
    pub enabled: bool,
    pub algorithm: CompressionAlgorithm,
    /// Level within [`CompressionAlgorithm::level_range`]
    pub level: i32,
    /// Payloads larger than this many serialized bytes are compressed
    pub min_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: CompressionAlgorithm::Zstd,
            level: DEFAULT_COMPRESSION_LEVEL,
            min_size: DEFAULT_COMPRESSION_MIN_SIZE,
        }
    }
}

/// Hashed subdirectory layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardingConfig {
    pub enabled: bool,
    /// Number of nested directories, one hash byte each
    pub depth: usize,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            depth: DEFAULT_SHARD_DEPTH,
        }
    }
}

/// Immutable cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Root directory holding entries, tag index and locks
    pub root_dir: PathBuf,
    /// TTL in seconds used when a write does not specify one; `None` never expires
    pub default_ttl: Option<i64>,
    pub sharding: ShardingConfig,
    pub serializer: SerializerKind,
    pub compression: CompressionConfig,
    /// Track hit/miss/write/delete counters
    pub statistics_enabled: bool,
    /// Throttle for `gc(false)`
    pub gc_interval: Duration,
}

impl CacheConfig {
    /// Start a configuration rooted at `root_dir` with defaults everywhere else
    pub fn builder(root_dir: impl Into<PathBuf>) -> CacheConfigBuilder {
        CacheConfigBuilder::new(root_dir)
    }

    /// Defaults rooted at `root_dir`
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            default_ttl: None,
            sharding: ShardingConfig::default(),
            serializer: SerializerKind::default(),
            compression: CompressionConfig::default(),
            statistics_enabled: true,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }

    /// Check every field that can be checked without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(CacheError::invalid_config(
                "root_dir",
                "cache directory path cannot be empty",
            ));
        }

        if self.sharding.enabled
            && !(1..=MAX_SHARD_DEPTH).contains(&self.sharding.depth)
        {
            return Err(CacheError::invalid_config(
                "sharding.depth",
                format!(
                    "shard depth {} is outside 1..={MAX_SHARD_DEPTH}",
                    self.sharding.depth
                ),
            ));
        }

        let range = self.compression.algorithm.level_range();
        if self.compression.enabled && !range.contains(&self.compression.level) {
            return Err(CacheError::invalid_config(
                "compression.level",
                format!(
                    "level {} is outside {}..={} for {}",
                    self.compression.level,
                    range.start(),
                    range.end(),
                    self.compression.algorithm
                ),
            ));
        }

        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(XdgPaths::cache_dir())
    }
}

/// Builder for [`CacheConfig`]
#[derive(Debug, Clone)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: CacheConfig::new(root_dir),
        }
    }

    pub fn root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.config.root_dir = root_dir.into();
        self
    }

    /// Default TTL in seconds; `None` stores entries without expiry
    pub fn default_ttl(mut self, ttl: Option<i64>) -> Self {
        self.config.default_ttl = ttl;
        self
    }

    /// Enable hashed subdirectories `depth` levels deep
    pub fn sharding(mut self, depth: usize) -> Self {
        self.config.sharding = ShardingConfig {
            enabled: true,
            depth,
        };
        self
    }

    pub fn without_sharding(mut self) -> Self {
        self.config.sharding.enabled = false;
        self
    }

    pub fn serializer(mut self, serializer: SerializerKind) -> Self {
        self.config.serializer = serializer;
        self
    }

    /// Compress payloads larger than `min_size` bytes
    pub fn compression(mut self, algorithm: CompressionAlgorithm, level: i32, min_size: usize) -> Self {
        self.config.compression = CompressionConfig {
            enabled: true,
            algorithm,
            level,
            min_size,
        };
        self
    }

    pub fn without_compression(mut self) -> Self {
        self.config.compression.enabled = false;
        self
    }

    pub fn statistics(mut self, enabled: bool) -> Self {
        self.config.statistics_enabled = enabled;
        self
    }

    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.config.gc_interval = interval;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> Result<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default,
    ConfigFile(PathBuf),
    EnvironmentVariable(String),
    CommandLine,
}

/// A configuration layer where every field is optional
///
/// Layers are merged in precedence order; a later layer only overrides the
/// fields it sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub root_dir: Option<PathBuf>,
    pub default_ttl: Option<i64>,
    pub sharding: Option<bool>,
    pub shard_depth: Option<usize>,
    pub serializer: Option<SerializerKind>,
    pub compression: Option<bool>,
    pub compression_algorithm: Option<CompressionAlgorithm>,
    pub compression_level: Option<i32>,
    pub compression_min_size: Option<usize>,
    pub statistics: Option<bool>,
}

impl PartialConfig {
    /// Overlay `other` on top of `self`
    pub fn merge(self, other: PartialConfig) -> PartialConfig {
        PartialConfig {
            root_dir: other.root_dir.or(self.root_dir),
            default_ttl: other.default_ttl.or(self.default_ttl),
            sharding: other.sharding.or(self.sharding),
            shard_depth: other.shard_depth.or(self.shard_depth),
            serializer: other.serializer.or(self.serializer),
            compression: other.compression.or(self.compression),
            compression_algorithm: other.compression_algorithm.or(self.compression_algorithm),
            compression_level: other.compression_level.or(self.compression_level),
            compression_min_size: other.compression_min_size.or(self.compression_min_size),
            statistics: other.statistics.or(self.statistics),
        }
    }

    /// Apply the set fields to a full configuration
    pub fn apply_to(&self, mut config: CacheConfig) -> CacheConfig {
        if let Some(root_dir) = &self.root_dir {
            config.root_dir = root_dir.clone();
        }
        if let Some(ttl) = self.default_ttl {
            config.default_ttl = Some(ttl);
        }
        if let Some(enabled) = self.sharding {
            config.sharding.enabled = enabled;
        }
        if let Some(depth) = self.shard_depth {
            config.sharding.depth = depth;
        }
        if let Some(serializer) = self.serializer {
            config.serializer = serializer;
        }
        if let Some(enabled) = self.compression {
            config.compression.enabled = enabled;
        }
        if let Some(algorithm) = self.compression_algorithm {
            config.compression.algorithm = algorithm;
        }
        if let Some(level) = self.compression_level {
            config.compression.level = level;
        }
        if let Some(min_size) = self.compression_min_size {
            config.compression.min_size = min_size;
        }
        if let Some(enabled) = self.statistics {
            config.statistics_enabled = enabled;
        }
        config
    }

    fn is_empty(&self) -> bool {
        self == &PartialConfig::default()
    }
}

/// Configuration loader that handles precedence
///
/// Defaults, then the JSON config file, then `FILECACHE_*` environment
/// variables. Command line flags are applied by the caller on top.
pub struct CacheConfigLoader;

impl CacheConfigLoader {
    /// Load configuration with full precedence handling
    pub fn load() -> Result<(CacheConfig, ConfigSource)> {
        Self::load_with(None)
    }

    /// Like [`CacheConfigLoader::load`], with an extra highest-precedence layer
    pub fn load_with(overrides: Option<PartialConfig>) -> Result<(CacheConfig, ConfigSource)> {
        let mut layers = PartialConfig::default();
        let mut source = ConfigSource::Default;

        let config_path = XdgPaths::config_file();
        if let Some(file_layer) = Self::load_from_file(&config_path)? {
            layers = layers.merge(file_layer);
            source = ConfigSource::ConfigFile(config_path);
        }

        if let Some(env_layer) = Self::load_from_env()? {
            layers = layers.merge(env_layer);
            source = ConfigSource::EnvironmentVariable("FILECACHE_*".to_string());
        }

        if let Some(cli_layer) = overrides.filter(|layer| !layer.is_empty()) {
            layers = layers.merge(cli_layer);
            source = ConfigSource::CommandLine;
        }

        let config = layers.apply_to(CacheConfig::default());
        config.validate()?;
        Ok((config, source))
    }

    /// Read a JSON configuration layer; a missing file is not an error
    pub fn load_from_file(path: &Path) -> Result<Option<PartialConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            operation: "read config file",
            source: e,
            recovery_hint: RecoveryHint::CheckPermissions {
                path: path.to_path_buf(),
            },
        })?;

        let layer = serde_json::from_str(&content).map_err(|e| CacheError::Serialization {
            key: path.display().to_string(),
            operation: SerializationOp::Decode,
            source: Box::new(e),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check config file syntax".to_string(),
            },
        })?;

        Ok(Some(layer))
    }

    /// Read the `FILECACHE_*` environment variables
    pub fn load_from_env() -> Result<Option<PartialConfig>> {
        Self::load_from_vars(|name| std::env::var(name).ok())
    }

    /// Environment parsing with an injectable lookup
    pub(crate) fn load_from_vars<F>(lookup: F) -> Result<Option<PartialConfig>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let layer = PartialConfig {
            root_dir: lookup("FILECACHE_DIR").map(PathBuf::from),
            default_ttl: parse_var(&lookup, "FILECACHE_DEFAULT_TTL")?,
            sharding: parse_bool_var(&lookup, "FILECACHE_SHARDING")?,
            shard_depth: parse_var(&lookup, "FILECACHE_SHARD_DEPTH")?,
            serializer: lookup("FILECACHE_SERIALIZER")
                .map(|s| s.parse())
                .transpose()?,
            compression: parse_bool_var(&lookup, "FILECACHE_COMPRESSION")?,
            compression_algorithm: lookup("FILECACHE_COMPRESSION_ALGORITHM")
                .map(|s| s.parse())
                .transpose()?,
            compression_level: parse_var(&lookup, "FILECACHE_COMPRESSION_LEVEL")?,
            compression_min_size: parse_var(&lookup, "FILECACHE_COMPRESSION_MIN_SIZE")?,
            statistics: parse_bool_var(&lookup, "FILECACHE_STATS")?,
        };

        Ok((!layer.is_empty()).then_some(layer))
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| CacheError::invalid_config(name, format!("'{raw}': {e}")))
        })
        .transpose()
}

fn parse_bool_var<F>(lookup: &F, name: &'static str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(CacheError::invalid_config(
                name,
                format!("'{raw}' is not a boolean"),
            )),
        })
        .transpose()
}
