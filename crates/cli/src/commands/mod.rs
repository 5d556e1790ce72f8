use clap::Subcommand;
use filecache::{FileCache, Ttl, Value};
use serde::Serialize;
use std::process::ExitCode;

#[derive(Subcommand)]
pub enum Commands {
    /// Print a value as JSON; exits 1 on a miss
    Get { key: String },

    /// Store a value (JSON, or a plain string if it does not parse)
    Set {
        key: String,
        value: String,

        /// TTL in seconds; the configured default when omitted
        #[arg(long, allow_hyphen_values = true)]
        ttl: Option<i64>,

        /// Tag to attach (can be specified multiple times)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Delete one or more keys
    #[command(visible_alias = "rm")]
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Check whether a key is live; exits 1 if not
    Has { key: String },

    /// Give a live entry a new TTL in seconds
    Touch {
        key: String,
        #[arg(allow_hyphen_values = true)]
        ttl: i64,
    },

    /// Increment an integer counter
    Incr {
        key: String,
        #[arg(default_value = "1")]
        by: i64,
    },

    /// Decrement an integer counter
    Decr {
        key: String,
        #[arg(default_value = "1")]
        by: i64,
    },

    /// Print a value and delete it
    Pull { key: String },

    /// Delete every entry carrying a tag
    ForgetTag { tag: String },

    /// Print an entry's metadata as JSON
    Meta { key: String },

    /// Print the file backing a key
    Path { key: String },

    /// Remove expired entries
    Gc {
        /// Collect even if the GC interval has not elapsed
        #[arg(long)]
        force: bool,
    },

    /// Remove expired entries unconditionally
    Prune,

    /// Remove expired entries, idle lock files and empty directories
    Vacuum,

    /// Print statistics as JSON
    Stats,

    /// Check the cache directory; exits 1 if unhealthy
    Health,

    /// Remove every entry
    Clear,
}

impl Commands {
    pub fn execute(self, cache: &FileCache) -> eyre::Result<ExitCode> {
        match self {
            Commands::Get { key } => print_value(cache.get(&key)?),
            Commands::Set {
                key,
                value,
                ttl,
                tags,
            } => {
                let value = parse_value(&value);
                let ttl = ttl.map_or(Ttl::Default, Ttl::Seconds);
                if tags.is_empty() {
                    cache.set(&key, value, ttl)?;
                } else {
                    cache.tags(tags).set(&key, value, ttl)?;
                }
                tracing::info!(key = %key, "stored");
                Ok(ExitCode::SUCCESS)
            }
            Commands::Delete { keys } => {
                for (key, removed) in cache.delete_multiple(&keys)? {
                    println!("{key}: {}", if removed { "deleted" } else { "absent" });
                }
                Ok(ExitCode::SUCCESS)
            }
            Commands::Has { key } => {
                let present = cache.has(&key)?;
                println!("{present}");
                Ok(exit_code(present))
            }
            Commands::Touch { key, ttl } => {
                let touched = cache.touch(&key, ttl)?;
                println!("{touched}");
                Ok(exit_code(touched))
            }
            Commands::Incr { key, by } => {
                println!("{}", cache.increment(&key, by)?);
                Ok(ExitCode::SUCCESS)
            }
            Commands::Decr { key, by } => {
                println!("{}", cache.decrement(&key, by)?);
                Ok(ExitCode::SUCCESS)
            }
            Commands::Pull { key } => print_value(cache.pull(&key)?),
            Commands::ForgetTag { tag } => {
                println!("{}", cache.delete_by_tag(&tag)?);
                Ok(ExitCode::SUCCESS)
            }
            Commands::Meta { key } => match cache.get_metadata(&key)? {
                Some(metadata) => {
                    print_json(&metadata)?;
                    Ok(ExitCode::SUCCESS)
                }
                None => Ok(ExitCode::FAILURE),
            },
            Commands::Path { key } => {
                println!("{}", cache.get_path(&key)?.display());
                Ok(ExitCode::SUCCESS)
            }
            Commands::Gc { force } => {
                println!("{}", cache.gc(force)?);
                Ok(ExitCode::SUCCESS)
            }
            Commands::Prune => {
                println!("{}", cache.prune()?);
                Ok(ExitCode::SUCCESS)
            }
            Commands::Vacuum => Ok(exit_code(cache.vacuum()?)),
            Commands::Stats => {
                print_json(&cache.get_stats())?;
                Ok(ExitCode::SUCCESS)
            }
            Commands::Health => {
                let report = cache.health_check();
                print_json(&report)?;
                Ok(exit_code(report.healthy()))
            }
            Commands::Clear => {
                let cleared = cache.clear()?;
                tracing::info!(cleared, "cleared cache");
                Ok(exit_code(cleared))
            }
        }
    }
}

/// JSON when it parses, otherwise the raw text as a string
fn parse_value(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map(Value::from_json)
        .unwrap_or_else(|_| Value::from(raw))
}

fn print_value(value: Option<Value>) -> eyre::Result<ExitCode> {
    match value {
        Some(value) => {
            print_json(&value.to_json())?;
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_prefers_json() {
        assert_eq!(parse_value("42"), Value::Int(42));
        assert_eq!(parse_value("[1,2]"), Value::from(vec![1, 2]));
        assert_eq!(parse_value("hello world"), Value::from("hello world"));
    }
}
