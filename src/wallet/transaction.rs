//! Transaction records consumed from the transaction feed.
//!
//! The wallet never owns these; the sync engine hands over its complete
//! set on every reconciliation.

use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxOut, Txid};
use serde::{Deserialize, Serialize};

/// Confidence of a transaction as reported by the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Unknown,
    /// Seen but not yet in the best chain
    Pending,
    /// Included in the best chain
    Building,
    /// Double-spent or otherwise dropped
    Dead,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRecord {
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
}

impl From<&TxOut> for OutputRecord {
    fn from(txout: &TxOut) -> Self {
        Self {
            value: txout.value,
            script_pubkey: txout.script_pubkey.clone(),
        }
    }
}

/// An input, carrying the output it spends when the engine knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub previous_output: OutPoint,
    pub connected_output: Option<OutputRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub txid: Txid,
    pub confidence: Confidence,
    pub outputs: Vec<OutputRecord>,
    pub inputs: Vec<InputRecord>,
}

impl TransactionRecord {
    /// Build a record from a raw transaction; `connected` resolves the
    /// outputs spent by its inputs (`None` when unknown).
    pub fn from_transaction<F>(tx: &Transaction, confidence: Confidence, mut connected: F) -> Self
    where
        F: FnMut(&OutPoint) -> Option<TxOut>,
    {
        let inputs = tx
            .input
            .iter()
            .map(|txin| InputRecord {
                previous_output: txin.previous_output,
                connected_output: connected(&txin.previous_output).as_ref().map(OutputRecord::from),
            })
            .collect();

        Self {
            txid: tx.compute_txid(),
            confidence,
            outputs: tx.output.iter().map(OutputRecord::from).collect(),
            inputs,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.confidence == Confidence::Dead
    }

    /// Credits of a pending transaction count towards the estimated balance only.
    pub fn is_pending(&self) -> bool {
        self.confidence == Confidence::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::absolute::LockTime;
    use bitcoin::transaction::Version;
    use bitcoin::{Sequence, TxIn, Witness};

    #[test]
    fn test_from_transaction_connects_known_inputs() {
        let funding = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![],
            output: vec![TxOut {
                value: Amount::from_sat(5_000),
                script_pubkey: ScriptBuf::new(),
            }],
        };
        let funding_txid = funding.compute_txid();

        let spend = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![
                TxIn {
                    previous_output: OutPoint::new(funding_txid, 0),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                },
                TxIn {
                    previous_output: OutPoint::null(),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                },
            ],
            output: vec![],
        };

        let record = TransactionRecord::from_transaction(&spend, Confidence::Pending, |outpoint| {
            if outpoint.txid == funding_txid {
                funding.output.get(outpoint.vout as usize).cloned()
            } else {
                None
            }
        });

        assert_eq!(record.txid, spend.compute_txid());
        assert!(record.is_pending());
        assert_eq!(
            record.inputs[0].connected_output.as_ref().map(|o| o.value),
            Some(Amount::from_sat(5_000))
        );
        assert!(record.inputs[1].connected_output.is_none());
    }
}
