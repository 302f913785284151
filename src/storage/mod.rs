//! Storage and persistence layer
//!
//! - Encrypted, atomically written account snapshot
//! - Key generation and import
//! - Snapshot data model

mod accounts;
mod file_system;
mod keys;
mod models;

pub use accounts::{AccountOrigin, AccountStore, OpenedAccount, DEFAULT_ACCOUNT_NAME};
pub use file_system::{CipherKey, PersistenceStore};
pub use keys::{AccountKeys, AccountSource, KeyManager, IMPORT_BIRTHDAY_UNIX};
pub use models::{ChainState, PersistedSnapshot, SNAPSHOT_VERSION};
