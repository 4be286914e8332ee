//! Configuration for the ledger

use chrono::FixedOffset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Japan Standard Time, the default authoritative audit zone
const DEFAULT_UTC_OFFSET_SECONDS: i32 = 9 * 3600;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Balance written on first start; ignored once the ledger exists
    #[serde(with = "rust_decimal::serde::str")]
    pub initial_budget: Decimal,

    /// Offset of the authoritative audit time zone, in seconds east of UTC
    pub utc_offset_seconds: i32,

    /// fsync every commit
    pub sync_writes: bool,

    /// Writer mailbox capacity
    pub mailbox_capacity: usize,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/ledger"),
            initial_budget: Decimal::ZERO,
            utc_offset_seconds: DEFAULT_UTC_OFFSET_SECONDS,
            sync_writes: true,
            mailbox_capacity: 1000,
            rocksdb: RocksDBConfig::default(),
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

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 16,
            max_write_buffer_number: 2,
            max_background_jobs: 2,
            enable_statistics: false,
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

        if let Ok(data_dir) = std::env::var("LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(budget) = std::env::var("LEDGER_INITIAL_BUDGET") {
            config.initial_budget = budget
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_INITIAL_BUDGET: {}", e)))?;
        }

        if let Ok(offset) = std::env::var("LEDGER_UTC_OFFSET_SECONDS") {
            config.utc_offset_seconds = offset
                .parse()
                .map_err(|e| crate::Error::Config(format!("LEDGER_UTC_OFFSET_SECONDS: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> crate::Result<()> {
        self.offset()?;
        if self.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Authoritative time zone for audit timestamps
    pub fn offset(&self) -> crate::Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_seconds).ok_or_else(|| {
            crate::Error::Config(format!(
                "utc_offset_seconds out of range: {}",
                self.utc_offset_seconds
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.utc_offset_seconds, 32_400);
        assert!(config.sync_writes);
        assert_eq!(config.offset().unwrap().local_minus_utc(), 32_400);
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            data_dir = "/tmp/ledger"
            initial_budget = "10.00"
            utc_offset_seconds = 0

            [rocksdb]
            write_buffer_size_mb = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.initial_budget, Decimal::new(1000, 2));
        assert_eq!(config.rocksdb.write_buffer_size_mb, 64);
        assert_eq!(config.mailbox_capacity, 1000);
    }

    #[test]
    fn test_invalid_offset_rejected() {
        let config = Config {
            utc_offset_seconds: 90_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
