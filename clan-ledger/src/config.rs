//! Configuration for the clan ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Leaderboard configuration
    pub ranking: RankingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/clan-ledger"),
            service_name: "clan-ledger".to_string(),
            rocksdb: RocksDBConfig::default(),
            ranking: RankingConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// How long a settlement waits for a clan row lock (milliseconds)
    pub lock_timeout_ms: i64,

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            lock_timeout_ms: 1_000,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

/// Leaderboard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Clans with fewer members are not ranked
    pub min_member_count: u32,

    /// Limit used when the caller does not pass one
    pub default_limit: usize,

    /// Upper bound on any requested limit
    pub max_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            min_member_count: 1,
            default_limit: 50,
            max_limit: 500,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CLAN_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("CLAN_LEDGER_LOCK_TIMEOUT_MS") {
            config.rocksdb.lock_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid lock timeout: {}", e)))?;
        }

        if let Ok(min_members) = std::env::var("CLAN_LEDGER_MIN_MEMBERS") {
            config.ranking.min_member_count = min_members
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid min members: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store cannot honour
    pub fn validate(&self) -> crate::Result<()> {
        if self.rocksdb.lock_timeout_ms <= 0 {
            return Err(crate::Error::Config(
                "lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.ranking.max_limit == 0 {
            return Err(crate::Error::Config("max_limit must be positive".to_string()));
        }
        Ok(())
    }
}
