//! Server configuration.

use anyhow::Context;
use mnemon_sdk::SDKConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_BIND: &str = "127.0.0.1:7420";

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the engine configuration file (optional on disk)
    pub config_path: PathBuf,
    /// Memory database path
    pub database_path: PathBuf,
    /// Snapshot database path
    pub snapshot_database_path: PathBuf,
    /// Address the REST API listens on
    pub bind_addr: SocketAddr,
}

impl Config {
    /// Load configuration from the environment
    ///
    /// Standard directory structure:
    /// ```text
    /// ~/.mnemon/
    /// ├── config.toml           # Engine configuration (optional)
    /// ├── memory.db             # Memories and access events
    /// └── snapshots.db          # State snapshots
    /// ```
    ///
    /// `MNEMON_DIR` overrides the directory and `MNEMON_BIND` the listen
    /// address.
    pub fn load() -> anyhow::Result<Self> {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let data_dir = std::env::var("MNEMON_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".mnemon"));

        let bind = std::env::var("MNEMON_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("invalid MNEMON_BIND address: {bind}"))?;

        Self::in_dir(&data_dir, bind_addr)
    }

    /// Configuration rooted at `data_dir`, creating it if needed
    pub fn in_dir(data_dir: &Path, bind_addr: SocketAddr) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        Ok(Self {
            config_path: data_dir.join("config.toml"),
            database_path: data_dir.join("memory.db"),
            snapshot_database_path: data_dir.join("snapshots.db"),
            bind_addr,
        })
    }

    /// Engine configuration: `config.toml` when present, defaults otherwise.
    /// Database paths always come from the data directory.
    pub fn sdk_config(&self) -> anyhow::Result<SDKConfig> {
        let config = if self.config_path.exists() {
            SDKConfig::load(&self.config_path)
                .with_context(|| format!("failed to load {}", self.config_path.display()))?
        } else {
            SDKConfig::default()
        };

        let config = SDKConfig {
            database_path: self.database_path.clone(),
            snapshot_database_path: self.snapshot_database_path.clone(),
            ..config
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn addr() -> SocketAddr {
        DEFAULT_BIND.parse().unwrap()
    }

    #[test]
    fn test_in_dir_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(temp_dir.path(), addr()).unwrap();

        assert!(config.config_path.ends_with("config.toml"));
        assert!(config.database_path.ends_with("memory.db"));
        assert!(config.snapshot_database_path.ends_with("snapshots.db"));
        assert!(config.database_path.starts_with(temp_dir.path()));
    }

    #[test]
    fn test_in_dir_creates_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let nested = temp_dir.path().join("a").join("b");

        Config::in_dir(&nested, addr()).unwrap();
        assert!(nested.exists());
    }

    #[test]
    fn test_sdk_config_defaults_without_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(temp_dir.path(), addr()).unwrap();

        let sdk = config.sdk_config().unwrap();
        assert_eq!(sdk.database_path, config.database_path);
        assert_eq!(sdk.snapshot_database_path, config.snapshot_database_path);
        assert_eq!(sdk.retrieval.exact_weight, 0.4);
    }

    #[test]
    fn test_sdk_config_reads_file_but_keeps_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(temp_dir.path(), addr()).unwrap();
        std::fs::write(
            &config.config_path,
            "database_path = \"/elsewhere/memory.db\"\n\n[retrieval]\nexact_weight = 0.7\n",
        )
        .unwrap();

        let sdk = config.sdk_config().unwrap();
        assert_eq!(sdk.retrieval.exact_weight, 0.7);
        assert_eq!(sdk.database_path, config.database_path);
    }

    #[test]
    fn test_sdk_config_rejects_invalid_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = Config::in_dir(temp_dir.path(), addr()).unwrap();
        std::fs::write(&config.config_path, "[retrieval]\nexact_weight = 3.0\n").unwrap();

        assert!(config.sdk_config().is_err());
    }

    #[test]
    fn test_load_with_custom_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom_path = temp_dir.path().to_path_buf();

        let old_dir = env::var("MNEMON_DIR").ok();
        let old_bind = env::var("MNEMON_BIND").ok();
        // SAFETY: This test runs in isolation and we restore the env vars afterward
        unsafe {
            env::set_var("MNEMON_DIR", &custom_path);
            env::set_var("MNEMON_BIND", "127.0.0.1:9999");
        }

        let config = Config::load().unwrap();
        assert!(config.database_path.starts_with(&custom_path));
        assert_eq!(config.bind_addr.port(), 9999);

        // SAFETY: Restoring environment to previous state
        unsafe {
            match old_dir {
                Some(val) => env::set_var("MNEMON_DIR", val),
                None => env::remove_var("MNEMON_DIR"),
            }
            match old_bind {
                Some(val) => env::set_var("MNEMON_BIND", val),
                None => env::remove_var("MNEMON_BIND"),
            }
        }
    }
}
