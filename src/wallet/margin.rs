use serde::{Deserialize, Serialize};

use super::keychain::ChainKind;
use super::ledger::{Account, HdAddress};
use crate::config::{DEFAULT_GAP_LIMIT, DEFAULT_MAX_SAFE_EXTEND};
use crate::error::DerivationError;

/// A chain grew by more than the safe amount in one pass. Transactions paying
/// the new addresses may sit in blocks the sync engine already skipped, so
/// the chain has to be rescanned from the account birthday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginOverrun {
    pub max_extended: u32,
    pub max_safe_extend: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MarginReport {
    pub receive_added: u32,
    pub change_added: u32,
    /// Largest extension applied to a single chain
    pub max_extended: u32,
    pub max_safe_extend: u32,
    /// Addresses derived in this pass, to be watched by the sync engine
    pub new_addresses: Vec<HdAddress>,
}

impl MarginReport {
    pub fn overrun(&self) -> Option<MarginOverrun> {
        (self.max_extended > self.max_safe_extend).then_some(MarginOverrun {
            max_extended: self.max_extended,
            max_safe_extend: self.max_safe_extend,
        })
    }

    pub fn added(&self, kind: ChainKind) -> u32 {
        match kind {
            ChainKind::Receive => self.receive_added,
            ChainKind::Change => self.change_added,
        }
    }
}

/// Keeps `gap_limit` unused addresses derived past the highest used index
/// of each chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginManager {
    gap_limit: u32,
    max_safe_extend: u32,
}

impl Default for MarginManager {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_LIMIT, DEFAULT_MAX_SAFE_EXTEND)
    }
}

impl MarginManager {
    pub fn new(gap_limit: u32, max_safe_extend: u32) -> Self {
        Self {
            gap_limit,
            max_safe_extend,
        }
    }

    pub fn gap_limit(&self) -> u32 {
        self.gap_limit
    }

    pub fn max_safe_extend(&self) -> u32 {
        self.max_safe_extend
    }

    /// Chain length needed for the current usage
    pub fn required_len(&self, account: &Account, kind: ChainKind) -> u64 {
        let used = account
            .chain(kind)
            .highest_used_index()
            .map_or(0, |highest| u64::from(highest) + 1);
        used + u64::from(self.gap_limit)
    }

    /// Extend `kind` to the required length; returns how many addresses were added.
    pub fn ensure_margin(&self, account: &mut Account, kind: ChainKind) -> Result<u32, DerivationError> {
        let required = self.required_len(account, kind);
        let current = u64::from(account.chain(kind).len());
        if required <= current {
            return Ok(0);
        }
        let missing = u32::try_from(required - current).map_err(|_| DerivationError::IndexOverflow {
            chain: kind,
            index: required - 1,
        })?;
        account.extend_chain(kind, missing)?;
        Ok(missing)
    }

    /// Run [`ensure_margin`](Self::ensure_margin) on both chains.
    pub fn ensure_margins(&self, account: &mut Account) -> Result<MarginReport, DerivationError> {
        let mut report = MarginReport {
            max_safe_extend: self.max_safe_extend,
            ..Default::default()
        };

        for kind in ChainKind::ALL {
            let before = account.chain(kind).len();
            let added = self.ensure_margin(account, kind)?;
            if added == 0 {
                continue;
            }
            match kind {
                ChainKind::Receive => report.receive_added = added,
                ChainKind::Change => report.change_added = added,
            }
            report.max_extended = report.max_extended.max(added);
            report
                .new_addresses
                .extend_from_slice(&account.chain(kind).addresses()[before as usize..]);
        }

        if report.max_extended > 0 {
            log::info!(
                "Margin extended receive by {}, change by {} (gap limit {})",
                report.receive_added,
                report.change_added,
                self.gap_limit
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AddressType;
    use crate::wallet::keychain::KeyChain;
    use bitcoin::Network;
    use chrono::Utc;

    fn empty_account() -> Account {
        let seed = bip39::Mnemonic::parse(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
        )
        .unwrap()
        .to_seed("");
        let keychain =
            KeyChain::from_seed(&seed, "m/84'/1'/0'", Network::Regtest, AddressType::P2wpkh).unwrap();
        Account::new("test", keychain, Utc::now())
    }

    #[test]
    fn test_fresh_account_gets_full_window() {
        let mut account = empty_account();
        let margins = MarginManager::new(20, 10);
        let report = margins.ensure_margins(&mut account).unwrap();

        assert_eq!(account.chain(ChainKind::Receive).len(), 20);
        assert_eq!(account.chain(ChainKind::Change).len(), 20);
        assert_eq!(report.max_extended, 20);
        assert_eq!(report.new_addresses.len(), 40);
        assert!(report.overrun().is_some());
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut account = empty_account();
        let margins = MarginManager::default();
        margins.ensure_margins(&mut account).unwrap();
        let report = margins.ensure_margins(&mut account).unwrap();
        assert_eq!(report.max_extended, 0);
        assert!(report.new_addresses.is_empty());
        assert!(report.overrun().is_none());
    }

    #[test]
    fn test_usage_extends_past_highest_used() {
        let mut account = empty_account();
        let margins = MarginManager::new(5, 3);
        margins.ensure_margins(&mut account).unwrap();

        account.get_mut(ChainKind::Receive, 2).unwrap().tx_count = 1;
        let report = margins.ensure_margins(&mut account).unwrap();
        assert_eq!(report.receive_added, 3);
        assert_eq!(report.change_added, 0);
        assert_eq!(account.chain(ChainKind::Receive).len(), 8);
        assert!(report.overrun().is_none());

        account.get_mut(ChainKind::Receive, 7).unwrap().tx_count = 1;
        let report = margins.ensure_margins(&mut account).unwrap();
        assert_eq!(report.receive_added, 5);
        assert_eq!(
            report.overrun(),
            Some(MarginOverrun {
                max_extended: 5,
                max_safe_extend: 3
            })
        );
    }
}
