//! Recompute every address balance from the full transaction set.
//!
//! A pass never patches balances incrementally: everything is zeroed and
//! rebuilt, so replaying the same transactions always gives the same result.

use bitcoin::Script;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use super::keychain::ChainKind;
use super::ledger::{Account, Balance};
use super::script::ScriptIdentity;
use super::transaction::TransactionRecord;
use crate::error::ScriptResolutionError;

/// Balance change of one address across a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDelta {
    pub chain: ChainKind,
    pub index: u32,
    pub before: Balance,
    pub after: Balance,
}

impl AddressDelta {
    pub fn available_sats(&self) -> i64 {
        self.after.available_sats.saturating_sub(self.before.available_sats)
    }

    pub fn estimated_sats(&self) -> i64 {
        self.after.estimated_sats.saturating_sub(self.before.estimated_sats)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Addresses whose balance changed, ordered by (chain, index)
    pub deltas: Vec<AddressDelta>,
    pub balance: Balance,
    pub transactions_applied: usize,
    pub dead_skipped: usize,
    pub credits: usize,
    pub debits: usize,
    /// Inputs without a connected output
    pub unconnected_inputs: usize,
    pub script_errors: usize,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.deltas.is_empty()
    }
}

/// Zero every balance, then apply `transactions` to `account`.
pub fn reconcile(account: &mut Account, transactions: &[TransactionRecord]) -> ReconcileReport {
    let before: HashMap<(ChainKind, u32), Balance> = account
        .addresses()
        .map(|a| ((a.chain(), a.index()), a.balance()))
        .collect();

    account.clear_balances();
    let mut report = ReconcileReport::default();

    for tx in transactions {
        if tx.is_dead() {
            report.dead_skipped += 1;
            continue;
        }

        let available = !tx.is_pending();
        let mut touched = BTreeSet::new();

        for output in &tx.outputs {
            let Some(key) = resolve_script(account, &output.script_pubkey, &mut report) else {
                continue;
            };
            if let Some(address) = account.get_mut(key.0, key.1) {
                address.balance.credit(output.value.to_sat(), available);
                touched.insert(key);
                report.credits += 1;
            }
        }

        for input in &tx.inputs {
            // A spend whose source output is unknown to the engine: the
            // credit side was never recorded here, so there is nothing to offset.
            let Some(connected) = &input.connected_output else {
                report.unconnected_inputs += 1;
                continue;
            };
            let Some(key) = resolve_script(account, &connected.script_pubkey, &mut report) else {
                continue;
            };
            if let Some(address) = account.get_mut(key.0, key.1) {
                address.balance.debit(connected.value.to_sat());
                touched.insert(key);
                report.debits += 1;
            }
        }

        for (chain, index) in touched {
            if let Some(address) = account.get_mut(chain, index) {
                address.tx_count += 1;
            }
        }
        report.transactions_applied += 1;
    }

    report.deltas = account
        .addresses()
        .filter_map(|a| {
            let before = before
                .get(&(a.chain(), a.index()))
                .copied()
                .unwrap_or_default();
            (before != a.balance()).then_some(AddressDelta {
                chain: a.chain(),
                index: a.index(),
                before,
                after: a.balance(),
            })
        })
        .collect();
    report.balance = account.balance();

    log::debug!(
        "Reconciled {} transactions ({} dead): {} credits, {} debits, {} script errors",
        report.transactions_applied,
        report.dead_skipped,
        report.credits,
        report.debits,
        report.script_errors
    );
    report
}

/// Net effect of one transaction on the account, in satoshis.
/// Dead transactions count as zero.
pub fn amount_for_account(account: &Account, tx: &TransactionRecord) -> i64 {
    if tx.is_dead() {
        return 0;
    }
    let mine = |script: &Script| {
        ScriptIdentity::from_script(script)
            .ok()
            .and_then(|identity| account.resolve(&identity))
            .is_some()
    };

    let credits: u64 = tx
        .outputs
        .iter()
        .filter(|o| mine(&o.script_pubkey))
        .map(|o| o.value.to_sat())
        .sum();
    let debits: u64 = tx
        .inputs
        .iter()
        .filter_map(|i| i.connected_output.as_ref())
        .filter(|o| mine(&o.script_pubkey))
        .map(|o| o.value.to_sat())
        .sum();

    i64::try_from(credits).unwrap_or(i64::MAX) - i64::try_from(debits).unwrap_or(i64::MAX)
}

fn resolve_script(
    account: &Account,
    script: &Script,
    report: &mut ReconcileReport,
) -> Option<(ChainKind, u32)> {
    match ScriptIdentity::from_script(script) {
        Ok(identity) => account.resolve(&identity),
        Err(err) => {
            log_script_error(script, &err);
            report.script_errors += 1;
            None
        }
    }
}

fn log_script_error(script: &Script, err: &ScriptResolutionError) {
    log::debug!("Skipping script {}: {}", hex::encode(script.as_bytes()), err);
}
