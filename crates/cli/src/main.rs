use clap::Parser;
use filecache::{CacheConfigLoader, CompressionAlgorithm, FileCache, PartialConfig, SerializerKind};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "filecache")]
#[command(about = "Inspect and maintain a file-backed cache directory", long_about = None)]
#[command(version)]
struct Cli {
    /// Cache root directory
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Default TTL in seconds for writes without --ttl
    #[arg(long, global = true)]
    default_ttl: Option<i64>,

    /// Enable or disable sharded directory layout
    #[arg(long, global = true)]
    sharding: Option<bool>,

    /// Shard depth (1-4)
    #[arg(long, global = true)]
    shard_depth: Option<usize>,

    /// Payload serializer (native, json)
    #[arg(long, global = true)]
    serializer: Option<SerializerKind>,

    /// Compress payloads with this algorithm (zstd, gzip)
    #[arg(long, global = true)]
    compress: Option<CompressionAlgorithm>,

    /// Compression level
    #[arg(long, global = true)]
    compression_level: Option<i32>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Flags that override the loaded configuration
    fn overrides(&self) -> PartialConfig {
        PartialConfig {
            root_dir: self.dir.clone(),
            default_ttl: self.default_ttl,
            sharding: self.sharding.or(self.shard_depth.map(|_| true)),
            shard_depth: self.shard_depth,
            serializer: self.serializer,
            compression: self.compress.map(|_| true),
            compression_algorithm: self.compress,
            compression_level: self.compression_level,
            ..PartialConfig::default()
        }
    }
}

fn init_tracing(verbose: u8) -> eyre::Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .with_target(false)
        .try_init()
        .map_err(|e| eyre::eyre!("failed to install tracing subscriber: {e}"))
}

fn main() -> eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let (config, source) = CacheConfigLoader::load_with(Some(cli.overrides()))?;
    tracing::debug!(?source, root = %config.root_dir.display(), "loaded configuration");

    let cache = FileCache::new(config)?;
    cli.command.execute(&cache)
}
