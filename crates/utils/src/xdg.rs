use std::env;
use std::path::PathBuf;

const APP_DIR: &str = "filecache";

/// XDG Base Directory paths for filecache
pub struct XdgPaths;

impl XdgPaths {
    /// Get XDG_CONFIG_HOME/filecache or fallback
    pub fn config_dir() -> PathBuf {
        env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".config"))
                    .unwrap_or_else(|| PathBuf::from(".config"))
            })
            .join(APP_DIR)
    }

    /// Get XDG_CACHE_HOME/filecache or fallback
    pub fn cache_dir() -> PathBuf {
        env::var("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|home| home.join(".cache"))
                    .unwrap_or_else(|| PathBuf::from(".cache"))
            })
            .join(APP_DIR)
    }

    /// Location of the optional JSON configuration file
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_xdg_paths_with_env() {
        let config_orig = env::var("XDG_CONFIG_HOME").ok();
        let cache_orig = env::var("XDG_CACHE_HOME").ok();

        env::set_var("XDG_CONFIG_HOME", "/tmp/config");
        env::set_var("XDG_CACHE_HOME", "/tmp/cache");

        assert_eq!(XdgPaths::config_dir(), PathBuf::from("/tmp/config/filecache"));
        assert_eq!(
            XdgPaths::config_file(),
            PathBuf::from("/tmp/config/filecache/config.json")
        );
        assert_eq!(XdgPaths::cache_dir(), PathBuf::from("/tmp/cache/filecache"));

        match config_orig {
            Some(val) => env::set_var("XDG_CONFIG_HOME", val),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }
        match cache_orig {
            Some(val) => env::set_var("XDG_CACHE_HOME", val),
            None => env::remove_var("XDG_CACHE_HOME"),
        }
    }
}
