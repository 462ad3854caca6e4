//! Configuration management for meshchain

use crate::error::ChainError;
use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub keys: KeyConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    pub p2p_port: u16,
    #[serde(default = "default_self_address")]
    pub self_address: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_genesis_address")]
    pub genesis_address: String,
    #[serde(default = "default_reward")]
    pub reward: u64,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    #[serde(default = "default_initial_difficulty")]
    pub initial_difficulty: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            genesis_address: default_genesis_address(),
            reward: default_reward(),
            block_time_ms: default_block_time_ms(),
            initial_difficulty: default_initial_difficulty(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MinerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Address credited with block rewards; the node's own address when unset.
    #[serde(default)]
    pub reward_address: Option<String>,
    #[serde(default = "default_miner_interval")]
    pub interval_secs: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            reward_address: None,
            interval_secs: default_miner_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct KeyConfig {
    /// Hex-encoded node secret key; a fresh key is generated when unset.
    #[serde(default)]
    pub secret_key_hex: Option<String>,
}

fn default_self_address() -> String {
    "ws://localhost:3000".to_string()
}

fn default_genesis_address() -> String {
    // Devnet genesis holder, carried over from the network's first deployment.
    "04719af634ece3e9bf00bfd7c58163b2caf2b8acd1a437a3e99a093c8dd7b1485c20d8a4c9f6621557f1d583e0fcff99f3234dd1bb365596d1d67909c270c16d64"
        .to_string()
}

fn default_reward() -> u64 {
    297
}

fn default_block_time_ms() -> u64 {
    30_000
}

fn default_initial_difficulty() -> u32 {
    1
}

fn default_miner_interval() -> u64 {
    5
}

pub fn load_config() -> Result<Config, ChainError> {
    load_config_from("config.toml")
}

pub fn load_config_from(path: &str) -> Result<Config, ChainError> {
    let config_str = fs::read_to_string(path).unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        // Sane defaults when the config file is absent
        Config {
            network: NetworkConfig {
                p2p_port: 3000,
                self_address: default_self_address(),
                bootstrap_peers: Vec::new(),
            },
            ledger: LedgerConfig::default(),
            miner: MinerConfig::default(),
            keys: KeyConfig::default(),
        }
    } else {
        toml::from_str(&config_str)
            .map_err(|e| ChainError::ConfigError(format!("Failed to parse {}: {}", path, e)))?
    };

    // Validate critical values
    if config.network.self_address.is_empty() {
        return Err(ChainError::ConfigError(
            "network.self_address must be set".to_string(),
        ));
    }
    if config.ledger.genesis_address.is_empty() {
        return Err(ChainError::ConfigError(
            "ledger.genesis_address must be set".to_string(),
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_when_file_absent() {
        let config = load_config_from("does-not-exist.toml").unwrap();
        assert_eq!(config.network.p2p_port, 3000);
        assert_eq!(config.ledger.reward, 297);
        assert_eq!(config.ledger.block_time_ms, 30_000);
        assert!(!config.miner.enabled);
        assert!(config.keys.secret_key_hex.is_none());
    }

    #[test]
    fn test_parse_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[network]
p2p_port = 4100
self_address = "ws://10.0.0.2:4100"
bootstrap_peers = ["ws://10.0.0.1:4100"]

[miner]
enabled = true
"#
        )
        .unwrap();

        let config = load_config_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.network.p2p_port, 4100);
        assert_eq!(config.network.bootstrap_peers.len(), 1);
        assert!(config.miner.enabled);
        assert_eq!(config.miner.interval_secs, 5);
        // Unspecified ledger section falls back to defaults.
        assert_eq!(config.ledger.initial_difficulty, 1);
    }

    #[test]
    fn test_empty_self_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[network]
p2p_port = 4100
self_address = ""
"#
        )
        .unwrap();

        let result = load_config_from(path.to_str().unwrap());
        assert!(result.is_err());
    }
}
