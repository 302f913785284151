//! Common test utilities for hdreceive integration tests
//!
//! - Deterministic key material from the standard test mnemonic
//! - A scripted in-memory sync engine
//! - Transaction builders
#![allow(dead_code)]

use bitcoin::hashes::Hash;
use bitcoin::{Amount, Network, OutPoint, PubkeyHash, ScriptBuf, Txid};
use hdreceive::error::EngineError;
use hdreceive::storage::KeyManager;
use hdreceive::sync::{EngineNotifier, ScanStart, SyncEngine, WatchedAddress};
use hdreceive::wallet::{
    Account, ChainKind, Confidence, InputRecord, MarginManager, OutputRecord, TransactionRecord,
};
use hdreceive::WalletConfig;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Regtest config rooted in `dir` with the default margin policy
pub fn test_config(dir: &Path) -> WalletConfig {
    WalletConfig {
        bitcoin_network: Network::Regtest,
        data_dir: dir.to_path_buf(),
        file_prefix: "test".to_string(),
        ..Default::default()
    }
}

/// Account from the test mnemonic, chains not yet derived
pub fn empty_account(config: &WalletConfig) -> Account {
    let keys = KeyManager::from_mnemonic(TEST_MNEMONIC, config).expect("test mnemonic is valid");
    Account::new("Account 0", keys.keychain, keys.birthday)
}

/// Account from the test mnemonic with the initial margin derived
pub fn test_account(config: &WalletConfig) -> Account {
    let mut account = empty_account(config);
    MarginManager::new(config.gap_limit, config.max_safe_extend)
        .ensure_margins(&mut account)
        .expect("initial margin");
    account
}

pub fn txid(n: u8) -> Txid {
    Txid::from_byte_array([n; 32])
}

pub fn script_of(account: &Account, chain: ChainKind, index: u32) -> ScriptBuf {
    account
        .get(chain, index)
        .expect("address derived")
        .address()
        .script_pubkey()
}

/// Script of an address that does not belong to the test account
pub fn external_script() -> ScriptBuf {
    bitcoin::Address::p2pkh(PubkeyHash::from_byte_array([0xee; 20]), Network::Regtest)
        .script_pubkey()
}

/// Transaction paying `sats` to `script` from an unknown source
pub fn payment(n: u8, script: ScriptBuf, sats: u64, confidence: Confidence) -> TransactionRecord {
    TransactionRecord {
        txid: txid(n),
        confidence,
        outputs: vec![OutputRecord {
            value: Amount::from_sat(sats),
            script_pubkey: script,
        }],
        inputs: vec![InputRecord {
            previous_output: OutPoint::new(txid(0xff), 0),
            connected_output: None,
        }],
    }
}

/// Transaction spending output 0 of `funding` to `outputs`
pub fn spend(
    n: u8,
    funding: &TransactionRecord,
    outputs: Vec<(ScriptBuf, u64)>,
    confidence: Confidence,
) -> TransactionRecord {
    TransactionRecord {
        txid: txid(n),
        confidence,
        outputs: outputs
            .into_iter()
            .map(|(script_pubkey, sats)| OutputRecord {
                value: Amount::from_sat(sats),
                script_pubkey,
            })
            .collect(),
        inputs: vec![InputRecord {
            previous_output: OutPoint::new(funding.txid, 0),
            connected_output: funding.outputs.first().cloned(),
        }],
    }
}

/// Everything the mock engine was asked to do
#[derive(Default)]
pub struct MockState {
    pub starts: Vec<ScanStart>,
    pub stops: usize,
    pub resets: usize,
    pub watched: Vec<WatchedAddress>,
    pub transactions: Vec<TransactionRecord>,
    pub notifier: Option<EngineNotifier>,
    pub fail_start: bool,
}

/// In-memory engine; tests script it through the shared state.
#[derive(Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn set_transactions(&self, transactions: Vec<TransactionRecord>) {
        self.state().transactions = transactions;
    }

    pub fn notifier(&self) -> EngineNotifier {
        self.state().notifier.clone().expect("engine was started")
    }

    pub fn watched_count(&self, chain: ChainKind) -> usize {
        self.state().watched.iter().filter(|w| w.chain == chain).count()
    }
}

impl SyncEngine for MockEngine {
    fn start(&mut self, from: ScanStart, notifier: EngineNotifier) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.fail_start {
            return Err(EngineError::Start("peer group unavailable".to_string()));
        }
        state.starts.push(from);
        state.notifier = Some(notifier);
        Ok(())
    }

    fn stop(&mut self) {
        self.state().stops += 1;
    }

    fn watch_addresses(&mut self, addresses: &[WatchedAddress]) {
        let mut state = self.state();
        for address in addresses {
            if !state.watched.contains(address) {
                state.watched.push(address.clone());
            }
        }
    }

    fn reset_chain_state(&mut self) -> Result<(), EngineError> {
        let mut state = self.state();
        state.resets += 1;
        state.transactions.clear();
        Ok(())
    }

    fn transactions(&self) -> Vec<TransactionRecord> {
        self.state().transactions.clone()
    }
}
