//! hdreceive: single-account HD Bitcoin receiving wallet
//!
//! Derives receive and change addresses from an account-level extended key,
//! rebuilds balances from the transaction set reported by a sync engine,
//! keeps a lookahead margin of unused addresses and persists the account
//! as an optionally encrypted snapshot.
//!
//! # Architecture
//!
//! - **Wallet**: key chain, address ledger, reconciler and margin manager
//! - **Storage**: snapshot model, AES-256-CBC at rest, atomic writes
//! - **Sync**: coordinator state machine driving a pluggable [`SyncEngine`]
//!
//! # Example
//!
//! ```ignore
//! use hdreceive::{AccountSource, AccountStore, SyncCoordinator, WalletConfig};
//!
//! let config = WalletConfig::from_env()?;
//! let store = AccountStore::new(config, None);
//! let (handle, _worker) = SyncCoordinator::new(store, AccountSource::Generate, engine).spawn();
//!
//! let ready = handle.wait_for(|s| s.state == WalletState::Ready).await?;
//! println!("Balance: {} sats", ready.balance.estimated_sats);
//! ```

pub mod config;
pub mod error;
pub mod storage;
pub mod sync;
pub mod wallet;

pub use config::{AddressType, WalletConfig};
pub use error::{
    ConfigError, DerivationError, EngineError, ScriptResolutionError, StorageError, WalletError,
};
pub use storage::{AccountSource, AccountStore, CipherKey, PersistedSnapshot, PersistenceStore};
pub use sync::{
    CoordinatorHandle, EngineNotifier, ScanStart, SyncCoordinator, SyncEngine, SyncState,
    WalletEvent, WalletState, WalletStatus,
};
pub use wallet::{
    Account, Balance, ChainKind, Confidence, KeyChain, MarginManager, TransactionRecord,
};

pub type Result<T> = std::result::Result<T, WalletError>;
