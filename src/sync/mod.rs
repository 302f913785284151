//! Wallet lifecycle and synchronization
//!
//! A single worker owns the account and the sync engine. Engine
//! notifications and UI commands are queued into it; status snapshots and
//! events flow back out over watch and broadcast channels.

mod coordinator;
mod engine;
mod events;
mod state;

pub use coordinator::{CoordinatorHandle, SyncCoordinator};
pub use engine::{EngineNotifier, ScanStart, SyncEngine, SyncProgress, WatchedAddress};
pub use events::{Command, EngineEvent, RescanReason, WalletEvent};
pub use state::{SyncState, WalletState, WalletStatus};
