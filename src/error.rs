use std::path::PathBuf;

use thiserror::Error;

use crate::wallet::ChainKind;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Derivation error: {0}")]
    Derivation(#[from] DerivationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sync engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid extended key: {0}")]
    InvalidExtendedKey(String),

    #[error("Network mismatch: account is on {account}, configured for {configured}")]
    NetworkMismatch {
        account: bitcoin::Network,
        configured: bitcoin::Network,
    },

    #[error("Wallet worker is not running")]
    WorkerStopped,
}

/// Fatal, configuration-level failures while deriving keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerivationError {
    #[error("{chain} chain index {index} is outside the non-hardened derivation range")]
    IndexOverflow { chain: ChainKind, index: u64 },

    #[error("BIP32 derivation failed: {0}")]
    Bip32(String),

    #[error("script identity of {chain}/{index} is already registered to {existing_chain}/{existing_index}")]
    DuplicateScript {
        chain: ChainKind,
        index: u32,
        existing_chain: ChainKind,
        existing_index: u32,
    },

    #[error("{chain} chain is not contiguous: expected index {expected}, got {got}")]
    NonContiguous {
        chain: ChainKind,
        expected: u32,
        got: u32,
    },
}

/// Per-output/per-input failures during reconciliation. Logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptResolutionError {
    #[error("unsupported script type: {0}")]
    Unsupported(String),

    #[error("malformed public key in script: {0}")]
    MalformedPubKey(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document decoded but does not have the snapshot's structure.
    #[error("Snapshot at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// Wrong key, truncated ciphertext or bad padding.
    #[error("Failed to decrypt {path}: {reason}")]
    Decryption { path: PathBuf, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StorageError {
    /// True when the caller should prompt for different credentials.
    pub fn is_decryption(&self) -> bool {
        matches!(self, StorageError::Decryption { .. })
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error("failed to start sync engine: {0}")]
    Start(String),

    #[error("sync engine failed: {0}")]
    Failed(String),
}
