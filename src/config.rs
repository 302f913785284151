/// Wallet configuration from environment variables or a TOML file
///
/// Controls Bitcoin network type, where the account snapshot lives and the
/// lookahead policy for address derivation. Defaults to Signet.
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default number of trailing unused addresses kept derived on each chain.
pub const DEFAULT_GAP_LIMIT: u32 = 20;
/// Default largest single-pass chain extension that does not force a rescan.
pub const DEFAULT_MAX_SAFE_EXTEND: u32 = 10;

/// Script form used to render derived addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    P2pkh,
    #[default]
    P2wpkh,
}

impl AddressType {
    /// BIP43 purpose matching the address form (44 for legacy, 84 for segwit v0)
    pub fn purpose(&self) -> u32 {
        match self {
            AddressType::P2pkh => 44,
            AddressType::P2wpkh => 84,
        }
    }
}

impl std::str::FromStr for AddressType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "p2pkh" | "legacy" => Ok(AddressType::P2pkh),
            "p2wpkh" | "segwit" => Ok(AddressType::P2wpkh),
            other => Err(ConfigError::InvalidValue {
                key: "address_type".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Bitcoin network type
    pub bitcoin_network: bitcoin::Network,
    /// Directory holding the account snapshot
    pub data_dir: PathBuf,
    /// Snapshot file name without extension
    pub file_prefix: String,
    /// Unused addresses kept beyond the highest used index on every chain
    pub gap_limit: u32,
    /// Extensions larger than this in one pass force a rescan from the account birthday
    pub max_safe_extend: u32,
    /// Address form for newly created accounts
    pub address_type: AddressType,
}

impl WalletConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `BITCOIN_NETWORK`: "signet" (default), "testnet", "regtest" or "bitcoin"
    /// - `HDRECEIVE_DATA_DIR`: snapshot directory (default `./wallets`)
    /// - `HDRECEIVE_FILE_PREFIX`: snapshot file prefix (default `hdreceive`)
    /// - `HDRECEIVE_GAP_LIMIT`: lookahead window (default 20)
    /// - `HDRECEIVE_MAX_SAFE_EXTEND`: rescan threshold (default 10)
    /// - `HDRECEIVE_ADDRESS_TYPE`: "p2wpkh" (default) or "p2pkh"
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(network_str) = env::var("BITCOIN_NETWORK") {
            config.bitcoin_network = parse_network(&network_str);
        }
        if let Ok(dir) = env::var("HDRECEIVE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(prefix) = env::var("HDRECEIVE_FILE_PREFIX") {
            config.file_prefix = prefix;
        }
        if let Ok(value) = env::var("HDRECEIVE_GAP_LIMIT") {
            config.gap_limit = parse_u32("HDRECEIVE_GAP_LIMIT", &value)?;
        }
        if let Ok(value) = env::var("HDRECEIVE_MAX_SAFE_EXTEND") {
            config.max_safe_extend = parse_u32("HDRECEIVE_MAX_SAFE_EXTEND", &value)?;
        }
        if let Ok(value) = env::var("HDRECEIVE_ADDRESS_TYPE") {
            config.address_type = value.parse()?;
        }

        config.validate()?;
        log::info!(
            "Using {} network, data dir {:?}, gap limit {}",
            config.bitcoin_network,
            config.data_dir,
            config.gap_limit
        );
        Ok(config)
    }

    /// Parse configuration from TOML; missing keys fall back to defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: WalletConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.gap_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "gap_limit".to_string(),
                value: "0".to_string(),
            });
        }
        if self.file_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "file_prefix".to_string(),
                value: String::new(),
            });
        }
        Ok(())
    }

    /// Get the BIP44 coin type for this network
    ///
    /// - Mainnet: 0
    /// - Testnet/Signet/Regtest: 1
    pub fn coin_type(&self) -> u32 {
        match self.bitcoin_network {
            bitcoin::Network::Bitcoin => 0,
            _ => 1,
        }
    }

    /// Account-level derivation path, e.g. "m/84'/1'/0'" for segwit on test networks
    pub fn derivation_path(&self) -> String {
        format!(
            "m/{}'/{}'/0'",
            self.address_type.purpose(),
            self.coin_type()
        )
    }

    /// Full path of the account snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.hdreceive", self.file_prefix))
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            bitcoin_network: bitcoin::Network::Signet,
            data_dir: PathBuf::from("./wallets"),
            file_prefix: "hdreceive".to_string(),
            gap_limit: DEFAULT_GAP_LIMIT,
            max_safe_extend: DEFAULT_MAX_SAFE_EXTEND,
            address_type: AddressType::default(),
        }
    }
}

fn parse_network(value: &str) -> bitcoin::Network {
    match value.to_lowercase().as_str() {
        "bitcoin" | "mainnet" => bitcoin::Network::Bitcoin,
        "testnet" => bitcoin::Network::Testnet,
        "regtest" => bitcoin::Network::Regtest,
        "signet" | "" => bitcoin::Network::Signet,
        other => {
            log::warn!("Unknown network '{}', defaulting to Signet", other);
            bitcoin::Network::Signet
        }
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_signet() {
        let config = WalletConfig::default();
        assert!(matches!(config.bitcoin_network, bitcoin::Network::Signet));
        assert_eq!(config.gap_limit, DEFAULT_GAP_LIMIT);
        assert_eq!(config.address_type, AddressType::P2wpkh);
    }

    #[test]
    fn test_coin_type() {
        let signet_config = WalletConfig {
            bitcoin_network: bitcoin::Network::Signet,
            ..Default::default()
        };
        assert_eq!(signet_config.coin_type(), 1);

        let mainnet_config = WalletConfig {
            bitcoin_network: bitcoin::Network::Bitcoin,
            ..Default::default()
        };
        assert_eq!(mainnet_config.coin_type(), 0);
    }

    #[test]
    fn test_derivation_path_follows_address_type() {
        let legacy = WalletConfig {
            address_type: AddressType::P2pkh,
            bitcoin_network: bitcoin::Network::Bitcoin,
            ..Default::default()
        };
        assert_eq!(legacy.derivation_path(), "m/44'/0'/0'");
        assert_eq!(WalletConfig::default().derivation_path(), "m/84'/1'/0'");
    }

    #[test]
    fn test_toml_partial_overrides() {
        let config = WalletConfig::from_toml_str(
            r#"
            bitcoin_network = "regtest"
            gap_limit = 5
            address_type = "p2pkh"
            "#,
        )
        .unwrap();
        assert_eq!(config.bitcoin_network, bitcoin::Network::Regtest);
        assert_eq!(config.gap_limit, 5);
        assert_eq!(config.max_safe_extend, DEFAULT_MAX_SAFE_EXTEND);
        assert_eq!(config.address_type, AddressType::P2pkh);
    }

    #[test]
    fn test_zero_gap_limit_rejected() {
        assert!(WalletConfig::from_toml_str("gap_limit = 0").is_err());
    }

    #[test]
    fn test_snapshot_path() {
        let config = WalletConfig {
            data_dir: PathBuf::from("/tmp/w"),
            file_prefix: "acct".to_string(),
            ..Default::default()
        };
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/w/acct.hdreceive"));
    }
}
