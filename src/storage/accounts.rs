use bip39::Mnemonic;

use super::file_system::{CipherKey, PersistenceStore};
use super::keys::{AccountSource, KeyManager};
use super::models::PersistedSnapshot;
use crate::config::WalletConfig;
use crate::error::{StorageError, WalletError};
use crate::wallet::Account;

pub const DEFAULT_ACCOUNT_NAME: &str = "Account 0";

/// How an opened account came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOrigin {
    /// Read back from an existing snapshot
    Loaded,
    /// Created from a freshly generated seed
    Created,
    /// Created from an imported mnemonic or extended key
    Restored,
}

pub struct OpenedAccount {
    pub account: Account,
    pub origin: AccountOrigin,
    /// Present only for a freshly generated seed
    pub mnemonic: Option<Mnemonic>,
}

/// Binds the snapshot file to account creation and restoration.
#[derive(Debug, Clone)]
pub struct AccountStore {
    config: WalletConfig,
    store: PersistenceStore,
}

impl AccountStore {
    pub fn new(config: WalletConfig, cipher: Option<CipherKey>) -> Self {
        let store = PersistenceStore::new(config.snapshot_path(), cipher);
        Self { config, store }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn persistence(&self) -> &PersistenceStore {
        &self.store
    }

    pub fn set_cipher(&mut self, cipher: Option<CipherKey>) {
        self.store.set_cipher(cipher);
    }

    /// Restore the persisted account, if any
    pub fn load(&self) -> Result<Option<Account>, WalletError> {
        match self.store.load()? {
            Some(snapshot) => Ok(Some(snapshot.restore(self.config.bitcoin_network)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, account: &Account) -> Result<(), StorageError> {
        self.store.save(&PersistedSnapshot::from_account(account))
    }

    /// Build a new, empty account from `source`. Nothing is written.
    pub fn create(&self, source: &AccountSource) -> Result<OpenedAccount, WalletError> {
        let keys = KeyManager::from_source(source, &self.config)?;
        let origin = if source.is_import() {
            AccountOrigin::Restored
        } else {
            AccountOrigin::Created
        };
        log::info!(
            "Creating {:?} account from {:?} at {}",
            origin,
            source,
            self.config.derivation_path()
        );
        Ok(OpenedAccount {
            account: Account::new(DEFAULT_ACCOUNT_NAME, keys.keychain, keys.birthday),
            origin,
            mnemonic: match origin {
                AccountOrigin::Created => keys.mnemonic,
                _ => None,
            },
        })
    }

    /// Load the persisted account, or create one from `source` when no
    /// snapshot exists. A snapshot that fails to decrypt or parse is an
    /// error; it is never silently replaced.
    pub fn open_or_create(&self, source: &AccountSource) -> Result<OpenedAccount, WalletError> {
        if let Some(account) = self.load()? {
            log::info!("Loaded account '{}' from {:?}", account.name(), self.store.path());
            return Ok(OpenedAccount {
                account,
                origin: AccountOrigin::Loaded,
                mnemonic: None,
            });
        }
        self.create(source)
    }
}
