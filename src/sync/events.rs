//! Messages flowing into and out of the coordinator worker.
//!
//! Engine notifications and user commands share one queue so they are
//! handled strictly in arrival order. Outgoing [`WalletEvent`]s are fanned
//! out to any number of UI subscribers.

use bitcoin::Txid;
use chrono::{DateTime, Utc};

use super::engine::SyncProgress;
use super::state::{SyncState, WalletState};
use crate::error::EngineError;
use crate::storage::CipherKey;
use crate::wallet::{AddressDelta, Balance, Confidence, MarginOverrun};

/// Notifications pushed by the sync engine.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Download progress changed
    Progress(SyncProgress),
    /// The engine caught up with the chain tip
    ScanComplete,
    /// The engine's transaction set changed
    WalletChanged,
    /// A transaction moved between pending, building and dead
    ConfidenceChanged { txid: Txid, confidence: Confidence },
    /// The engine cannot continue
    Failed(EngineError),
}

/// Requests from the UI side.
#[derive(Debug, Clone)]
pub enum Command {
    ReconcileNow,
    /// Full rescan from the given time, or from the account birthday
    Rescan(Option<DateTime<Utc>>),
    /// Re-key the snapshot and save it under the new key
    ChangeCipher(Option<CipherKey>),
    Shutdown,
}

#[derive(Debug)]
pub(crate) enum Message {
    /// `scan` is the run the event came from, `None` for the current one
    Engine {
        scan: Option<u64>,
        event: EngineEvent,
    },
    Command(Command),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescanReason {
    /// A chain grew past the safe extension in one pass
    MarginOverrun(MarginOverrun),
    Requested,
}

/// Notifications for UI subscribers.
#[derive(Debug, Clone)]
pub enum WalletEvent {
    StateChanged {
        state: WalletState,
        sync_state: SyncState,
    },
    /// A fresh seed was generated; the phrase is not stored anywhere
    SeedGenerated { mnemonic: String },
    BalanceChanged {
        balance: Balance,
        deltas: Vec<AddressDelta>,
    },
    AddressesAdded { receive: u32, change: u32 },
    /// Net effect of the transaction on this account alongside its new confidence
    TransactionConfidence {
        txid: Txid,
        confidence: Confidence,
        amount_sats: i64,
    },
    RescanStarted {
        from: DateTime<Utc>,
        reason: RescanReason,
    },
    Saved,
    SaveFailed(String),
}
