use serde::{Deserialize, Serialize};
use std::fmt;

use super::engine::SyncProgress;
use crate::wallet::{AccountSnapshot, Balance};

/// Wallet lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletState {
    Setup,
    WalletSetup,
    KeysAdd,
    Peering,
    Syncing,
    Ready,
    Shutdown,
    Error,
}

impl WalletState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WalletState::Shutdown | WalletState::Error)
    }

    /// Startup only moves forward. `Ready` and `Syncing` alternate as
    /// scans finish and restart. Any live state may fail or shut down;
    /// `Error` only leads to `Shutdown`, which is absorbing.
    pub fn can_transition_to(&self, next: WalletState) -> bool {
        use WalletState::*;
        match (*self, next) {
            (Shutdown, _) => false,
            (Error, next) => next == Shutdown,
            (_, Error | Shutdown) => true,
            (Setup, WalletSetup)
            | (WalletSetup, KeysAdd)
            | (KeysAdd, Peering)
            | (Peering, Syncing | Ready)
            | (Syncing, Ready)
            | (Ready, Syncing) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WalletState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WalletState::Setup => "setup",
            WalletState::WalletSetup => "wallet_setup",
            WalletState::KeysAdd => "keys_add",
            WalletState::Peering => "peering",
            WalletState::Syncing => "syncing",
            WalletState::Ready => "ready",
            WalletState::Shutdown => "shutdown",
            WalletState::Error => "error",
        };
        f.write_str(name)
    }
}

/// How the current scan came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// New account from a generated seed
    Created,
    /// New account from imported key material
    Restore,
    /// Existing account loaded from disk
    Startup,
    /// Rescan requested while synchronized
    Rescan,
    /// Rescan requested before the previous scan finished
    ReRescan,
    Synchronized,
}

/// Immutable view published to UI readers after every change.
#[derive(Debug, Clone)]
pub struct WalletStatus {
    pub state: WalletState,
    pub sync_state: SyncState,
    pub progress: Option<SyncProgress>,
    pub balance: Balance,
    pub account: Option<AccountSnapshot>,
    /// A save failed and will be retried on the next cycle
    pub save_pending: bool,
    pub last_error: Option<String>,
}

impl Default for WalletStatus {
    fn default() -> Self {
        Self {
            state: WalletState::Setup,
            sync_state: SyncState::Startup,
            progress: None,
            balance: Balance::default(),
            account: None,
            save_pending: false,
            last_error: None,
        }
    }
}
