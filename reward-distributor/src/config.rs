//! Configuration for the reward distributor

use escrow_core::AccountId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Reward distributor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Account allowed to publish roots when no state exists yet
    pub guardian: AccountId,

    /// JSON state file (in-memory only when unset)
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "reward-distributor".to_string(),
            guardian: AccountId::ZERO,
            state_file: Some(PathBuf::from("./data/rewards/state.json")),
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

        if let Ok(guardian) = std::env::var("REWARDS_GUARDIAN") {
            config.guardian = AccountId::from_hex(&guardian)?;
        }

        if let Ok(file) = std::env::var("REWARDS_STATE_FILE") {
            config.state_file = Some(PathBuf::from(file));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            service_name = "rewards"
            guardian = "0x00000000000000000000000000000000000000aa"
            state_file = "/tmp/rewards.json"
        "#;
        let config: Config = toml::from_str(toml).unwrap();

        let mut expected = [0u8; 20];
        expected[19] = 0xaa;
        assert_eq!(config.guardian, AccountId::new(expected));
        assert_eq!(config.state_file, Some(PathBuf::from("/tmp/rewards.json")));
    }
}
