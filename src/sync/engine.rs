//! Boundary to the block chain synchronization engine.
//!
//! The engine downloads blocks, tracks the transactions that touch watched
//! addresses and reports back through an [`EngineNotifier`]. It never
//! touches the account; the coordinator pulls its transaction set and
//! reconciles on its own worker.

use bitcoin::{Address, ScriptBuf, Txid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::events::{EngineEvent, Message};
use crate::error::EngineError;
use crate::wallet::{ChainKind, Confidence, HdAddress, TransactionRecord};

/// An address the engine must match transactions against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedAddress {
    pub chain: ChainKind,
    pub index: u32,
    pub address: Address,
    pub script_pubkey: ScriptBuf,
}

impl From<&HdAddress> for WatchedAddress {
    fn from(address: &HdAddress) -> Self {
        Self {
            chain: address.chain(),
            index: address.index(),
            address: address.address().clone(),
            script_pubkey: address.address().script_pubkey(),
        }
    }
}

/// Where the engine should begin scanning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStart {
    /// Continue from the engine's own chain cursor
    Resume,
    /// Scan every block since this time
    From(DateTime<Utc>),
}

/// Download progress, stored as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub percent_done: f64,
    pub blocks_remaining: u32,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// Cloneable handle the engine uses to notify the coordinator. Safe to
/// use from any thread; notifications are queued in arrival order.
///
/// A notifier handed to [`SyncEngine::start`] is bound to that scan run.
/// Once the coordinator restarts the scan, progress and completion
/// reported through an older notifier are dropped.
#[derive(Debug, Clone)]
pub struct EngineNotifier {
    mailbox: mpsc::UnboundedSender<Message>,
    scan: Option<u64>,
}

impl EngineNotifier {
    /// Notifier that always reports for the current scan
    pub(crate) fn new(mailbox: mpsc::UnboundedSender<Message>) -> Self {
        Self { mailbox, scan: None }
    }

    pub(crate) fn for_scan(mailbox: mpsc::UnboundedSender<Message>, scan: u64) -> Self {
        Self {
            mailbox,
            scan: Some(scan),
        }
    }

    /// Queue an event. Returns false once the coordinator has stopped.
    pub fn notify(&self, event: EngineEvent) -> bool {
        self.mailbox
            .send(Message::Engine {
                scan: self.scan,
                event,
            })
            .is_ok()
    }

    pub fn progress(&self, progress: SyncProgress) -> bool {
        self.notify(EngineEvent::Progress(progress))
    }

    pub fn scan_complete(&self) -> bool {
        self.notify(EngineEvent::ScanComplete)
    }

    pub fn wallet_changed(&self) -> bool {
        self.notify(EngineEvent::WalletChanged)
    }

    pub fn confidence_changed(&self, txid: Txid, confidence: Confidence) -> bool {
        self.notify(EngineEvent::ConfidenceChanged { txid, confidence })
    }

    pub fn failed(&self, error: EngineError) -> bool {
        self.notify(EngineEvent::Failed(error))
    }
}

/// Block chain synchronization engine driven by the coordinator.
///
/// Calls are made from the coordinator's worker only, one at a time.
/// Implementations do their network work elsewhere and report through the
/// notifier handed to [`start`](SyncEngine::start).
pub trait SyncEngine: Send + 'static {
    fn start(&mut self, from: ScanStart, notifier: EngineNotifier) -> Result<(), EngineError>;

    fn stop(&mut self);

    /// Add addresses to the watch set. Already watched addresses are ignored.
    fn watch_addresses(&mut self, addresses: &[WatchedAddress]);

    /// Forget the chain cursor and every cached transaction. Watched
    /// addresses are kept.
    fn reset_chain_state(&mut self) -> Result<(), EngineError>;

    /// Every transaction currently known to touch a watched address
    fn transactions(&self) -> Vec<TransactionRecord>;
}
