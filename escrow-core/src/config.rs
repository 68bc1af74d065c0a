//! Configuration for the escrow service

use crate::math::PRECISION;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Escrow service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,

    /// Escrow governance
    pub escrow: EscrowConfig,

    /// Actor configuration
    pub actor: ActorConfig,

    /// Block clock configuration
    pub clock: ClockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/escrow"),
            service_name: "escrow-core".to_string(),
            rocksdb: RocksDBConfig::default(),
            escrow: EscrowConfig::default(),
            actor: ActorConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
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
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

/// Privileged escrow settings applied when the ledger is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Account allowed to unlock and reconfigure the escrow
    pub owner: AccountId,

    /// Receiver of collected penalties
    pub penalty_recipient: AccountId,

    /// Maximum quit penalty (PRECISION == 100%)
    pub max_penalty_rate: u128,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            owner: AccountId::ZERO,
            penalty_recipient: AccountId::ZERO,
            max_penalty_rate: PRECISION,
        }
    }
}

/// Actor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Bounded mailbox capacity
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

/// Block clock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Timestamp of block 0
    pub genesis_timestamp: u64,

    /// Seconds per block
    pub block_time_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            genesis_timestamp: 0,
            block_time_secs: 12,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("ESCROW_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(owner) = std::env::var("ESCROW_OWNER") {
            config.escrow.owner = AccountId::from_hex(&owner)
                .map_err(|e| crate::Error::Config(format!("ESCROW_OWNER: {}", e)))?;
        }

        if let Ok(recipient) = std::env::var("ESCROW_PENALTY_RECIPIENT") {
            config.escrow.penalty_recipient = AccountId::from_hex(&recipient)
                .map_err(|e| crate::Error::Config(format!("ESCROW_PENALTY_RECIPIENT: {}", e)))?;
        }

        if let Ok(secs) = std::env::var("ESCROW_BLOCK_TIME_SECS") {
            config.clock.block_time_secs = secs
                .parse()
                .map_err(|e| crate::Error::Config(format!("ESCROW_BLOCK_TIME_SECS: {}", e)))?;
        }

        Ok(config)
    }

    /// Reject settings the escrow cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.escrow.max_penalty_rate > PRECISION {
            return Err(crate::Error::Config(format!(
                "max_penalty_rate {} exceeds 100% ({})",
                self.escrow.max_penalty_rate, PRECISION
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "escrow-core");
        assert_eq!(config.escrow.max_penalty_rate, PRECISION);
        assert_eq!(config.clock.block_time_secs, 12);
    }

    #[test]
    fn test_validate_rejects_penalty_above_full_amount() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.escrow.max_penalty_rate = PRECISION + 1;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }

    #[test]
    fn test_parse_toml() {
        let owner = AccountId::derive("owner");
        let toml = format!(
            r#"
data_dir = "/tmp/escrow"
service_name = "escrow-test"

[rocksdb]
write_buffer_size_mb = 16
max_write_buffer_number = 2
max_background_jobs = 1
enable_statistics = false

[escrow]
owner = "{owner}"
penalty_recipient = "{owner}"
max_penalty_rate = 500000000000000000

[actor]
mailbox_capacity = 8

[clock]
genesis_timestamp = 1700000000
block_time_secs = 2
"#
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.escrow.owner, owner);
        assert_eq!(config.escrow.max_penalty_rate, PRECISION / 2);
        assert_eq!(config.actor.mailbox_capacity, 8);
        assert_eq!(config.clock.block_time_secs, 2);
    }
}
