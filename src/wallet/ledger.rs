//! Address ledger: chains of derived addresses and their balances.
//!
//! Balances and transaction counts live here but are only written by the
//! reconciler; new addresses are only appended through
//! [`Account::extend_chain`], which registers them in the reverse script
//! index in the same call.

use bitcoin::PubkeyHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Add, AddAssign};

use super::keychain::{ChainKind, KeyChain};
use super::script::ScriptIdentity;
use crate::error::DerivationError;

/// Signed satoshi balance. `available_sats` only counts credits from
/// non-pending transactions; `estimated_sats` counts every live credit.
/// Both are net of all debits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub available_sats: i64,
    pub estimated_sats: i64,
}

impl Balance {
    pub fn credit(&mut self, sats: u64, available: bool) {
        let sats = to_signed(sats);
        self.estimated_sats = self.estimated_sats.saturating_add(sats);
        if available {
            self.available_sats = self.available_sats.saturating_add(sats);
        }
    }

    pub fn debit(&mut self, sats: u64) {
        let sats = to_signed(sats);
        self.estimated_sats = self.estimated_sats.saturating_sub(sats);
        self.available_sats = self.available_sats.saturating_sub(sats);
    }

    pub fn is_zero(&self) -> bool {
        self.available_sats == 0 && self.estimated_sats == 0
    }
}

impl Add for Balance {
    type Output = Balance;

    fn add(self, rhs: Balance) -> Balance {
        Balance {
            available_sats: self.available_sats.saturating_add(rhs.available_sats),
            estimated_sats: self.estimated_sats.saturating_add(rhs.estimated_sats),
        }
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Balance) {
        *self = *self + rhs;
    }
}

fn to_signed(sats: u64) -> i64 {
    i64::try_from(sats).unwrap_or(i64::MAX)
}

/// One derived address with its reconciled state.
#[derive(Debug, Clone)]
pub struct HdAddress {
    chain: ChainKind,
    index: u32,
    identity: ScriptIdentity,
    address: bitcoin::Address,
    pub(crate) balance: Balance,
    pub(crate) tx_count: u32,
}

impl HdAddress {
    pub(crate) fn new(
        chain: ChainKind,
        index: u32,
        identity: ScriptIdentity,
        address: bitcoin::Address,
    ) -> Self {
        Self {
            chain,
            index,
            identity,
            address,
            balance: Balance::default(),
            tx_count: 0,
        }
    }

    pub fn chain(&self) -> ChainKind {
        self.chain
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn identity(&self) -> &ScriptIdentity {
        &self.identity
    }

    pub fn address(&self) -> &bitcoin::Address {
        &self.address
    }

    pub fn balance(&self) -> Balance {
        self.balance
    }

    pub fn tx_count(&self) -> u32 {
        self.tx_count
    }

    pub fn is_used(&self) -> bool {
        self.tx_count > 0
    }

    /// Path relative to the account key, e.g. `0/5`
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.chain.child_index(), self.index)
    }

    pub(crate) fn reset(&mut self) {
        self.balance = Balance::default();
        self.tx_count = 0;
    }
}

/// Ordered addresses of one chain; indices are contiguous from 0.
#[derive(Debug, Clone)]
pub struct Chain {
    kind: ChainKind,
    addresses: Vec<HdAddress>,
}

impl Chain {
    pub fn new(kind: ChainKind) -> Self {
        Self {
            kind,
            addresses: Vec::new(),
        }
    }

    pub fn kind(&self) -> ChainKind {
        self.kind
    }

    pub fn len(&self) -> u32 {
        self.addresses.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn addresses(&self) -> &[HdAddress] {
        &self.addresses
    }

    pub fn get(&self, index: u32) -> Option<&HdAddress> {
        self.addresses.get(index as usize)
    }

    /// Highest index with at least one transaction; `None` when nothing
    /// on the chain has been used.
    pub fn highest_used_index(&self) -> Option<u32> {
        self.addresses
            .iter()
            .rev()
            .find(|a| a.is_used())
            .map(|a| a.index)
    }

    /// Unused addresses past the highest used one
    pub fn margin(&self) -> u32 {
        match self.highest_used_index() {
            Some(highest) => self.len() - highest - 1,
            None => self.len(),
        }
    }

    pub fn balance(&self) -> Balance {
        self.addresses
            .iter()
            .fold(Balance::default(), |acc, a| acc + a.balance)
    }

    /// Lowest-index address without transactions
    pub fn first_unused(&self) -> Option<&HdAddress> {
        self.addresses.iter().find(|a| !a.is_used())
    }
}

/// Where an address lives inside the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDescription {
    pub account_name: String,
    pub chain: ChainKind,
    pub index: u32,
    pub path: String,
}

/// The single account: one receive and one change chain over a shared xpub.
#[derive(Debug, Clone)]
pub struct Account {
    name: String,
    keychain: KeyChain,
    birthday: DateTime<Utc>,
    receive: Chain,
    change: Chain,
    script_index: HashMap<PubkeyHash, (ChainKind, u32)>,
}

impl Account {
    pub fn new(name: impl Into<String>, keychain: KeyChain, birthday: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            keychain,
            birthday,
            receive: Chain::new(ChainKind::Receive),
            change: Chain::new(ChainKind::Change),
            script_index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keychain(&self) -> &KeyChain {
        &self.keychain
    }

    /// Earliest time funds could have reached this account; full rescans start here.
    pub fn birthday(&self) -> DateTime<Utc> {
        self.birthday
    }

    pub fn chain(&self, kind: ChainKind) -> &Chain {
        match kind {
            ChainKind::Receive => &self.receive,
            ChainKind::Change => &self.change,
        }
    }

    fn chain_mut(&mut self, kind: ChainKind) -> &mut Chain {
        match kind {
            ChainKind::Receive => &mut self.receive,
            ChainKind::Change => &mut self.change,
        }
    }

    pub fn addresses(&self) -> impl Iterator<Item = &HdAddress> {
        self.receive.addresses.iter().chain(self.change.addresses.iter())
    }

    /// Derive `count` more addresses on `kind` and register them for
    /// transaction attribution. Either all addresses are added or none.
    pub fn extend_chain(
        &mut self,
        kind: ChainKind,
        count: u32,
    ) -> Result<&[HdAddress], DerivationError> {
        let start = self.chain(kind).len();
        let derived = self.keychain.derive_range(kind, start, count)?;

        let mut staged: HashMap<PubkeyHash, (ChainKind, u32)> = HashMap::with_capacity(derived.len());
        for (offset, address) in derived.iter().enumerate() {
            let expected = start + offset as u32;
            if address.index() != expected {
                return Err(DerivationError::NonContiguous {
                    chain: kind,
                    expected,
                    got: address.index(),
                });
            }
            let key = address.identity().key_hash();
            if let Some(&(existing_chain, existing_index)) =
                self.script_index.get(&key).or_else(|| staged.get(&key))
            {
                return Err(DerivationError::DuplicateScript {
                    chain: kind,
                    index: address.index(),
                    existing_chain,
                    existing_index,
                });
            }
            staged.insert(key, (kind, address.index()));
        }

        self.script_index.extend(staged);
        let chain = self.chain_mut(kind);
        chain.addresses.extend(derived);
        log::debug!("{} chain extended by {} to {}", kind, count, chain.len());
        Ok(&chain.addresses[start as usize..])
    }

    /// Map a script identity to its (chain, index), if it belongs to us
    pub fn resolve(&self, identity: &ScriptIdentity) -> Option<(ChainKind, u32)> {
        self.script_index.get(&identity.key_hash()).copied()
    }

    pub fn get(&self, kind: ChainKind, index: u32) -> Option<&HdAddress> {
        self.chain(kind).get(index)
    }

    pub(crate) fn get_mut(&mut self, kind: ChainKind, index: u32) -> Option<&mut HdAddress> {
        self.chain_mut(kind).addresses.get_mut(index as usize)
    }

    /// Zero every balance and transaction count
    pub(crate) fn clear_balances(&mut self) {
        for address in self
            .receive
            .addresses
            .iter_mut()
            .chain(self.change.addresses.iter_mut())
        {
            address.reset();
        }
    }

    /// Aggregate balance, the sum over both chains
    pub fn balance(&self) -> Balance {
        self.receive.balance() + self.change.balance()
    }

    /// Lowest-index receive address that has never been used
    pub fn next_receive_address(&self) -> Option<&HdAddress> {
        self.receive.first_unused()
    }

    pub fn find_address(&self, address: &bitcoin::Address) -> Option<AddressDescription> {
        let found = self.addresses().find(|a| a.address() == address)?;
        Some(AddressDescription {
            account_name: self.name.clone(),
            chain: found.chain(),
            index: found.index(),
            path: found.relative_path(),
        })
    }

    /// Detached read-only copy for display
    pub fn snapshot(&self) -> AccountSnapshot {
        let addresses = |chain: &Chain| {
            chain
                .addresses()
                .iter()
                .map(|a| AddressSnapshot {
                    chain: a.chain(),
                    index: a.index(),
                    address: a.address().to_string(),
                    balance: a.balance(),
                    tx_count: a.tx_count(),
                })
                .collect()
        };
        AccountSnapshot {
            name: self.name.clone(),
            xpub: self.keychain.xpub().to_string(),
            balance: self.balance(),
            receive: addresses(&self.receive),
            change: addresses(&self.change),
            next_receive_address: self.next_receive_address().map(|a| a.address().to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub chain: ChainKind,
    pub index: u32,
    pub address: String,
    pub balance: Balance,
    pub tx_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub name: String,
    pub xpub: String,
    pub balance: Balance,
    pub receive: Vec<AddressSnapshot>,
    pub change: Vec<AddressSnapshot>,
    pub next_receive_address: Option<String>,
}
