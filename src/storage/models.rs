//! Data models for account persistence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AddressType;
use crate::error::WalletError;
use crate::wallet::{Account, ChainKind, KeyChain};

/// Current snapshot document version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub num_addrs: u32,
}

/// Everything needed to rebuild the account. Balances and transaction
/// counts are never stored; they are recomputed on the next reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub version: u32,
    pub name: String,
    pub xpub: String,
    pub network: bitcoin::Network,
    pub address_type: AddressType,
    pub birthday: DateTime<Utc>,
    pub receive: ChainState,
    pub change: ChainState,
}

impl PersistedSnapshot {
    pub fn from_account(account: &Account) -> Self {
        let keychain = account.keychain();
        Self {
            version: SNAPSHOT_VERSION,
            name: account.name().to_string(),
            xpub: keychain.xpub().to_string(),
            network: keychain.network(),
            address_type: keychain.address_type(),
            birthday: account.birthday(),
            receive: ChainState {
                num_addrs: account.chain(ChainKind::Receive).len(),
            },
            change: ChainState {
                num_addrs: account.chain(ChainKind::Change).len(),
            },
        }
    }

    /// Rebuild the account, re-deriving every address the snapshot records.
    pub fn restore(&self, network: bitcoin::Network) -> Result<Account, WalletError> {
        if self.network != network {
            return Err(WalletError::NetworkMismatch {
                account: self.network,
                configured: network,
            });
        }
        let keychain = KeyChain::from_extended_key(&self.xpub, self.network, self.address_type)?;
        let mut account = Account::new(self.name.clone(), keychain, self.birthday);
        account.extend_chain(ChainKind::Receive, self.receive.num_addrs)?;
        account.extend_chain(ChainKind::Change, self.change.num_addrs)?;
        Ok(account)
    }
}
