use bitcoin::Txid;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use super::engine::{EngineNotifier, ScanStart, SyncEngine, SyncProgress, WatchedAddress};
use super::events::{Command, EngineEvent, Message, RescanReason, WalletEvent};
use super::state::{SyncState, WalletState, WalletStatus};
use crate::error::{EngineError, WalletError};
use crate::storage::{AccountOrigin, AccountSource, AccountStore, CipherKey};
use crate::wallet::{amount_for_account, reconcile, Account, Confidence, MarginManager};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Settled,
    Rescanning,
    Failed,
}

/// Owns the account and the sync engine and drives both from a single
/// worker loop. Every engine notification and every command goes through
/// one queue, so reconciliation cycles never interleave.
pub struct SyncCoordinator<E: SyncEngine> {
    store: AccountStore,
    source: AccountSource,
    engine: E,
    margins: MarginManager,
    account: Option<Account>,
    state: WalletState,
    sync_state: SyncState,
    progress: Option<SyncProgress>,
    /// Bumped on every engine start; events from older runs are stale
    scan: u64,
    save_pending: bool,
    last_error: Option<String>,
    mailbox_tx: mpsc::UnboundedSender<Message>,
    mailbox: mpsc::UnboundedReceiver<Message>,
    status_tx: watch::Sender<WalletStatus>,
    events_tx: broadcast::Sender<WalletEvent>,
}

impl<E: SyncEngine> SyncCoordinator<E> {
    /// `source` is only used when no snapshot exists yet.
    pub fn new(store: AccountStore, source: AccountSource, engine: E) -> Self {
        let config = store.config();
        let margins = MarginManager::new(config.gap_limit, config.max_safe_extend);
        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(WalletStatus::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            store,
            source,
            engine,
            margins,
            account: None,
            state: WalletState::Setup,
            sync_state: SyncState::Startup,
            progress: None,
            scan: 0,
            save_pending: false,
            last_error: None,
            mailbox_tx,
            mailbox,
            status_tx,
            events_tx,
        }
    }

    /// Handle for UI readers and commands. Subscribe before running the
    /// worker to see every event from the start.
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle {
            mailbox: self.mailbox_tx.clone(),
            status: self.status_tx.subscribe(),
            events: self.events_tx.clone(),
        }
    }

    /// Run the worker on the tokio runtime
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Start the wallet, then process the queue until shut down.
    pub async fn run(mut self) {
        self.start();
        while let Some(message) = self.mailbox.recv().await {
            match message {
                Message::Engine { scan, event } => self.on_engine_event(scan, event),
                Message::Command(command) => self.on_command(command),
            }
            if self.state == WalletState::Shutdown {
                break;
            }
        }
        log::info!("Wallet worker stopped");
    }

    fn start(&mut self) {
        self.transition(WalletState::WalletSetup);
        let opened = match self.store.open_or_create(&self.source) {
            Ok(opened) => opened,
            Err(e) => return self.fail(e),
        };
        self.sync_state = match opened.origin {
            AccountOrigin::Loaded => SyncState::Startup,
            AccountOrigin::Created => SyncState::Created,
            AccountOrigin::Restored => SyncState::Restore,
        };
        if let Some(mnemonic) = opened.mnemonic {
            self.emit(WalletEvent::SeedGenerated {
                mnemonic: mnemonic.to_string(),
            });
        }
        let mut account = opened.account;

        self.transition(WalletState::KeysAdd);
        match self.margins.ensure_margins(&mut account) {
            Ok(report) => {
                if let Some(overrun) = report.overrun() {
                    log::debug!(
                        "Initial margin extended by {}; scan starts next",
                        overrun.max_extended
                    );
                }
            }
            Err(e) => return self.fail(e.into()),
        }
        let watched: Vec<WatchedAddress> = account.addresses().map(WatchedAddress::from).collect();
        self.engine.watch_addresses(&watched);
        let scan_from = match self.sync_state {
            SyncState::Startup => ScanStart::Resume,
            _ => ScanStart::From(account.birthday()),
        };
        self.account = Some(account);
        self.persist();

        self.transition(WalletState::Peering);
        if let Err(e) = self.start_engine(scan_from) {
            return self.fail(e.into());
        }
        self.publish_status();
    }

    fn on_engine_event(&mut self, scan: Option<u64>, event: EngineEvent) {
        if self.state.is_terminal() {
            log::debug!("Ignoring {:?} in {} state", event, self.state);
            return;
        }
        let stale = scan.is_some_and(|scan| scan != self.scan);
        if stale && !matches!(event, EngineEvent::ConfidenceChanged { .. }) {
            log::debug!("Dropping {:?} from stopped scan {:?}", event, scan);
            return;
        }
        match event {
            EngineEvent::Progress(progress) => {
                let changed = self.progress.as_ref().map(|p| p.percent_done)
                    != Some(progress.percent_done);
                self.progress = Some(progress);
                if changed {
                    self.transition(WalletState::Syncing);
                }
                self.publish_status();
            }
            EngineEvent::ScanComplete => {
                if self.run_cycle() == CycleOutcome::Settled {
                    self.sync_state = SyncState::Synchronized;
                    if !self.transition(WalletState::Ready) {
                        self.announce();
                    }
                }
            }
            EngineEvent::WalletChanged => {
                self.run_cycle();
            }
            EngineEvent::ConfidenceChanged { txid, confidence } => {
                self.on_confidence_changed(txid, confidence);
            }
            EngineEvent::Failed(e) => self.fail(e.into()),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::ReconcileNow => {
                if self.state.is_terminal() || self.account.is_none() {
                    log::warn!("Reconcile ignored in {} state", self.state);
                    return;
                }
                self.run_cycle();
            }
            Command::Rescan(from) => {
                if self.state != WalletState::Ready {
                    log::warn!("Rescan ignored in {} state", self.state);
                    return;
                }
                let Some(from) = from.or_else(|| self.account.as_ref().map(Account::birthday)) else {
                    return;
                };
                self.begin_rescan(from, RescanReason::Requested);
            }
            Command::ChangeCipher(cipher) => {
                log::info!(
                    "Snapshot encryption {}",
                    if cipher.is_some() { "re-keyed" } else { "disabled" }
                );
                self.store.set_cipher(cipher);
                self.persist();
                self.publish_status();
            }
            Command::Shutdown => self.shutdown(),
        }
    }

    /// Reconcile, keep the margin, watch new addresses, save and publish.
    /// Starts a rescan when the margin overran.
    fn run_cycle(&mut self) -> CycleOutcome {
        let transactions = self.engine.transactions();
        let Some(account) = self.account.as_mut() else {
            return CycleOutcome::Failed;
        };

        let report = reconcile(account, &transactions);
        let margin = match self.margins.ensure_margins(account) {
            Ok(margin) => margin,
            Err(e) => {
                self.fail(e.into());
                return CycleOutcome::Failed;
            }
        };

        if !margin.new_addresses.is_empty() {
            let watched: Vec<WatchedAddress> =
                margin.new_addresses.iter().map(WatchedAddress::from).collect();
            self.engine.watch_addresses(&watched);
            self.emit(WalletEvent::AddressesAdded {
                receive: margin.receive_added,
                change: margin.change_added,
            });
        }

        self.persist();
        if report.changed() {
            self.emit(WalletEvent::BalanceChanged {
                balance: report.balance,
                deltas: report.deltas,
            });
        }
        self.publish_status();

        let Some(overrun) = margin.overrun() else {
            return CycleOutcome::Settled;
        };
        log::warn!(
            "Address chain grew by {} (safe limit {}), rescanning",
            overrun.max_extended,
            overrun.max_safe_extend
        );
        let Some(from) = self.account.as_ref().map(Account::birthday) else {
            return CycleOutcome::Failed;
        };
        if self.begin_rescan(from, RescanReason::MarginOverrun(overrun)) {
            CycleOutcome::Rescanning
        } else {
            CycleOutcome::Failed
        }
    }

    /// Restart the engine from `from`, keeping every derived address.
    fn begin_rescan(&mut self, from: DateTime<Utc>, reason: RescanReason) -> bool {
        log::info!("Starting rescan from {} ({:?})", from, reason);
        self.persist();
        self.engine.stop();
        if let Err(e) = self.engine.reset_chain_state() {
            self.fail(e.into());
            return false;
        }

        self.sync_state = if self.sync_state == SyncState::Synchronized {
            SyncState::Rescan
        } else {
            SyncState::ReRescan
        };
        let watched: Vec<WatchedAddress> = self
            .account
            .iter()
            .flat_map(|account| account.addresses())
            .map(WatchedAddress::from)
            .collect();
        self.engine.watch_addresses(&watched);
        self.progress = None;

        if !self.transition(WalletState::Syncing) {
            self.announce();
        }
        self.emit(WalletEvent::RescanStarted { from, reason });
        if let Err(e) = self.start_engine(ScanStart::From(from)) {
            self.fail(e.into());
            return false;
        }
        self.publish_status();
        true
    }

    fn on_confidence_changed(&mut self, txid: Txid, confidence: Confidence) {
        let Some(account) = self.account.as_ref() else {
            return;
        };
        let amount_sats = self
            .engine
            .transactions()
            .iter()
            .find(|tx| tx.txid == txid)
            .map(|tx| amount_for_account(account, tx))
            .unwrap_or(0);

        match confidence {
            Confidence::Pending => log::info!("Received {} sats in {}", amount_sats, txid),
            Confidence::Building => log::info!("Confirmed {} ({} sats)", txid, amount_sats),
            Confidence::Dead => log::warn!("Transaction {} is dead", txid),
            Confidence::Unknown => log::debug!("Confidence of {} unknown", txid),
        }
        self.emit(WalletEvent::TransactionConfidence {
            txid,
            confidence,
            amount_sats,
        });
    }

    fn shutdown(&mut self) {
        log::info!("Shutting down wallet");
        self.engine.stop();
        self.persist();
        self.transition(WalletState::Shutdown);
    }

    fn fail(&mut self, error: WalletError) {
        log::error!("Wallet failed in {} state: {}", self.state, error);
        self.last_error = Some(error.to_string());
        if !self.transition(WalletState::Error) {
            self.publish_status();
        }
    }

    /// Save the account; on failure the snapshot is retried next cycle.
    fn persist(&mut self) {
        let Some(account) = &self.account else {
            return;
        };
        match self.store.save(account) {
            Ok(()) => {
                self.save_pending = false;
                self.emit(WalletEvent::Saved);
            }
            Err(e) => {
                log::warn!("Failed to save account, retrying next cycle: {}", e);
                self.save_pending = true;
                self.emit(WalletEvent::SaveFailed(e.to_string()));
            }
        }
    }

    /// Move to `next`; returns false when already there or the move is not allowed.
    fn transition(&mut self, next: WalletState) -> bool {
        if self.state == next {
            return false;
        }
        if !self.state.can_transition_to(next) {
            log::warn!("Refusing transition {} -> {}", self.state, next);
            return false;
        }
        log::info!("Wallet state {} -> {} ({:?})", self.state, next, self.sync_state);
        self.state = next;
        self.announce();
        true
    }

    fn announce(&self) {
        self.emit(WalletEvent::StateChanged {
            state: self.state,
            sync_state: self.sync_state,
        });
        self.publish_status();
    }

    fn publish_status(&self) {
        let status = WalletStatus {
            state: self.state,
            sync_state: self.sync_state,
            progress: self.progress.clone(),
            balance: self.account.as_ref().map(Account::balance).unwrap_or_default(),
            account: self.account.as_ref().map(Account::snapshot),
            save_pending: self.save_pending,
            last_error: self.last_error.clone(),
        };
        self.status_tx.send_replace(status);
    }

    fn emit(&self, event: WalletEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn start_engine(&mut self, from: ScanStart) -> Result<(), EngineError> {
        self.scan += 1;
        let notifier = EngineNotifier::for_scan(self.mailbox_tx.clone(), self.scan);
        self.engine.start(from, notifier)
    }
}

/// Cloneable UI-side handle to a running coordinator.
#[derive(Clone)]
pub struct CoordinatorHandle {
    mailbox: mpsc::UnboundedSender<Message>,
    status: watch::Receiver<WalletStatus>,
    events: broadcast::Sender<WalletEvent>,
}

impl CoordinatorHandle {
    pub fn status(&self) -> WalletStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<WalletStatus> {
        self.status.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    /// Notifier feeding the engine's queue, never bound to a scan run
    pub fn notifier(&self) -> EngineNotifier {
        EngineNotifier::new(self.mailbox.clone())
    }

    pub fn next_receive_address(&self) -> Option<String> {
        self.status
            .borrow()
            .account
            .as_ref()
            .and_then(|account| account.next_receive_address.clone())
    }

    pub fn reconcile_now(&self) -> Result<(), WalletError> {
        self.send(Command::ReconcileNow)
    }

    /// Request a full rescan; `None` rescans from the account birthday.
    /// Ignored unless the wallet is ready.
    pub fn rescan(&self, from: Option<DateTime<Utc>>) -> Result<(), WalletError> {
        self.send(Command::Rescan(from))
    }

    pub fn change_cipher(&self, cipher: Option<CipherKey>) -> Result<(), WalletError> {
        self.send(Command::ChangeCipher(cipher))
    }

    /// Wait until the published status satisfies `predicate`
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<WalletStatus, WalletError>
    where
        F: FnMut(&WalletStatus) -> bool,
    {
        let mut status = self.status.clone();
        let matched = status
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| WalletError::WorkerStopped)?;
        Ok(matched.clone())
    }

    /// Stop the engine, save and wait for the worker to reach `Shutdown`.
    pub async fn shutdown(&self) -> Result<WalletStatus, WalletError> {
        let current = self.status();
        if current.state == WalletState::Shutdown {
            return Ok(current);
        }
        self.send(Command::Shutdown)?;
        self.wait_for(|s| s.state == WalletState::Shutdown).await
    }

    fn send(&self, command: Command) -> Result<(), WalletError> {
        self.mailbox
            .send(Message::Command(command))
            .map_err(|_| WalletError::WorkerStopped)
    }
}
