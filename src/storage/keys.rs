use bip39::Mnemonic;
use bitcoin::key::rand;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::config::WalletConfig;
use crate::error::WalletError;
use crate::wallet::KeyChain;

/// Birthday given to imported keys: 2013-01-01T00:00:00Z, before any
/// BIP32 wallet could have received funds.
pub const IMPORT_BIRTHDAY_UNIX: i64 = 1_356_998_400;

/// Where a new account's key material comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum AccountSource {
    /// Fresh 12-word seed
    Generate,
    /// BIP39 phrase to restore
    Mnemonic(String),
    /// Account-level xpub/tpub (or xprv/tprv, of which only the public half is kept)
    ExtendedKey(String),
}

impl AccountSource {
    pub fn is_import(&self) -> bool {
        !matches!(self, AccountSource::Generate)
    }
}

impl fmt::Debug for AccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountSource::Generate => f.write_str("Generate"),
            AccountSource::Mnemonic(_) => f.write_str("Mnemonic(..)"),
            AccountSource::ExtendedKey(_) => f.write_str("ExtendedKey(..)"),
        }
    }
}

pub struct AccountKeys {
    /// Set when the keys came from a seed phrase; shown to the user once and never stored
    pub mnemonic: Option<Mnemonic>,
    pub keychain: KeyChain,
    pub birthday: DateTime<Utc>,
}

pub struct KeyManager;

impl KeyManager {
    /// Generate a new random seed and derive the account key from it
    pub fn generate(config: &WalletConfig) -> Result<AccountKeys, WalletError> {
        let entropy = rand::random::<[u8; 16]>();

        let mnemonic = Mnemonic::from_entropy(&entropy)
            .map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        let keychain = Self::derive_keychain(&mnemonic, config)?;
        Ok(AccountKeys {
            mnemonic: Some(mnemonic),
            keychain,
            birthday: Utc::now(),
        })
    }

    /// Import an existing mnemonic phrase
    pub fn from_mnemonic(words: &str, config: &WalletConfig) -> Result<AccountKeys, WalletError> {
        let mnemonic =
            Mnemonic::parse(words).map_err(|e| WalletError::InvalidMnemonic(e.to_string()))?;

        let keychain = Self::derive_keychain(&mnemonic, config)?;
        Ok(AccountKeys {
            mnemonic: Some(mnemonic),
            keychain,
            birthday: import_birthday(),
        })
    }

    /// Import an account-level extended key
    pub fn from_extended_key(key: &str, config: &WalletConfig) -> Result<AccountKeys, WalletError> {
        let keychain =
            KeyChain::from_extended_key(key, config.bitcoin_network, config.address_type)?;
        Ok(AccountKeys {
            mnemonic: None,
            keychain,
            birthday: import_birthday(),
        })
    }

    pub fn from_source(source: &AccountSource, config: &WalletConfig) -> Result<AccountKeys, WalletError> {
        match source {
            AccountSource::Generate => Self::generate(config),
            AccountSource::Mnemonic(words) => Self::from_mnemonic(words, config),
            AccountSource::ExtendedKey(key) => Self::from_extended_key(key, config),
        }
    }

    fn derive_keychain(mnemonic: &Mnemonic, config: &WalletConfig) -> Result<KeyChain, WalletError> {
        let seed = mnemonic.to_seed("");
        KeyChain::from_seed(
            &seed,
            &config.derivation_path(),
            config.bitcoin_network,
            config.address_type,
        )
    }
}

fn import_birthday() -> DateTime<Utc> {
    DateTime::from_timestamp(IMPORT_BIRTHDAY_UNIX, 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_generate_yields_twelve_words() {
        let keys = KeyManager::generate(&WalletConfig::default()).unwrap();
        let mnemonic = keys.mnemonic.unwrap();
        assert_eq!(mnemonic.word_count(), 12);
        assert!(keys.birthday > import_birthday());
    }

    #[test]
    fn test_mnemonic_import_uses_epoch_birthday() {
        let keys = KeyManager::from_mnemonic(TEST_MNEMONIC, &WalletConfig::default()).unwrap();
        assert_eq!(keys.birthday.timestamp(), IMPORT_BIRTHDAY_UNIX);
    }

    #[test]
    fn test_mnemonic_and_xpub_import_agree() {
        let config = WalletConfig::default();
        let from_words = KeyManager::from_mnemonic(TEST_MNEMONIC, &config).unwrap();
        let xpub = from_words.keychain.xpub().to_string();
        let from_xpub = KeyManager::from_extended_key(&xpub, &config).unwrap();
        assert!(from_xpub.mnemonic.is_none());
        assert_eq!(from_xpub.keychain.xpub(), from_words.keychain.xpub());
    }

    #[test]
    fn test_bad_mnemonic_rejected() {
        let result = KeyManager::from_mnemonic("not a valid phrase", &WalletConfig::default());
        assert!(matches!(result, Err(WalletError::InvalidMnemonic(_))));
    }
}
