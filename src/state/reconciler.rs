//! The [EventReconciler] owns the [BlockchainValues] aggregate and is the
//! only thing that mutates it.
//!
//! It consumes [ChainEvent]s in the order they arrive. Lookups it starts
//! (keys, locks, balances, historical transactions) run as separate tasks
//! and report back over an internal channel; each result is tagged with
//! the account and network it was requested for, and dropped if those are
//! no longer current. Every mutation is followed by a propagation: the
//! keys are re-derived from the transactions, a [BlockchainData] snapshot
//! is published on a `watch` channel, and the user's working set is written
//! back to the [CacheStore].

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::chain_reader::ChainReader;
use super::errors::ErrorEmitter;
use super::errors::SyncError;
use super::errors::TrackerError;
use super::event_source::EventSource;
use super::key_status::link_transactions_to_keys;
use super::key_status::now;
use super::purchase::apply_new_transaction;
use super::purchase::apply_submitted;
use super::purchase::apply_update;
use super::purchase::submitted_listener;
use super::purchase::update_listener;
use super::purchase::PurchaseContext;
use super::purchase::PurchaseRegistry;
use super::purchase::PurchaseUpdate;
use super::purchase::SentTransaction;
use super::retriever::retrieve_transactions;
use super::retriever::HistoricalTransaction;
use super::retriever::HistoryIndex;
use crate::cache::CacheStore;
use crate::config_models::constants::Constants;
use crate::config_models::constants::KEY_EXPIRY_GRACE;
use crate::config_models::network::NetworkId;
use crate::config_models::paywall_config::PaywallConfig;
use crate::models::address::Address;
use crate::models::event::AccountUpdate;
use crate::models::event::ChainEvent;
use crate::models::event::WalletError;
use crate::models::key::make_default_keys;
use crate::models::key::Key;
use crate::models::key::KeyUpdate;
use crate::models::lock::Lock;
use crate::models::lock::LockPatch;
use crate::models::transaction::Transaction;
use crate::models::transaction::TransactionPatch;
use crate::models::transaction::TransactionStatus;
use crate::models::values::zero_balance;
use crate::models::values::BlockchainData;
use crate::models::values::BlockchainValues;
use crate::models::values::LinkedLock;
use crate::models::values::ETH_BALANCE;

/// cache type holding the keys of an account.
pub const KEYS: &str = "keys";
/// cache type holding the transactions of an account.
pub const TRANSACTIONS: &str = "transactions";
/// cache type holding lock metadata, under the null account.
pub const LOCKS: &str = "locks";

/// the `(account, network)` pair a lookup was started for.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Scope {
    account: Option<Address>,
    network: NetworkId,
}

/// results of lookups, delivered back to the event loop.
#[derive(Debug)]
enum Fetched {
    Lock {
        network: NetworkId,
        lock: Address,
        result: anyhow::Result<LockPatch>,
    },
    Key {
        scope: Scope,
        lock: Address,
        result: anyhow::Result<KeyUpdate>,
    },
    Transactions {
        scope: Scope,
        transactions: Vec<Transaction>,
    },
    Transaction {
        scope: Scope,
        hash: String,
        result: anyhow::Result<TransactionPatch>,
    },
    Balance {
        scope: Scope,
        result: anyhow::Result<String>,
    },
    TokenBalance {
        scope: Scope,
        contract: Address,
        result: anyhow::Result<String>,
    },
    Stored {
        hash: String,
        result: anyhow::Result<()>,
    },

    /// the key of `scope` on `lock`, valid until `expiration`, has just expired.
    KeyExpired {
        scope: Scope,
        lock: Address,
        expiration: i64,
    },
}

/// The embedder's side of a running [EventReconciler].
pub struct ReconcilerHandle {
    /// the latest propagated snapshot.
    pub changes: watch::Receiver<BlockchainData>,

    /// non-fatal errors, the `emitError` hook.
    pub errors: mpsc::UnboundedReceiver<SyncError>,

    source: Arc<dyn EventSource>,
    registry: PurchaseRegistry,
    required_confirmations: u64,
}

impl std::fmt::Debug for ReconcilerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerHandle")
            .field("registry", &self.registry)
            .field("required_confirmations", &self.required_confirmations)
            .finish_non_exhaustive()
    }
}

impl ReconcilerHandle {
    pub fn snapshot(&self) -> BlockchainData {
        self.changes.borrow().clone()
    }

    /// the submitted tracker for `lock`, on the latest snapshot. Call it
    /// before dispatching the purchase to the wallet.
    pub fn purchase_watcher(
        &self,
        lock: &Address,
    ) -> BoxFuture<'static, Result<PurchaseUpdate, TrackerError>> {
        let data = self.changes.borrow();
        submitted_listener(
            lock,
            &data.transactions,
            &data.keys,
            self.source.as_ref(),
            &self.registry,
            data.network,
            self.required_confirmations,
        )
    }

    /// the update tracker for the purchase in progress on `lock`.
    pub fn update_watcher(
        &self,
        lock: &Address,
    ) -> BoxFuture<'static, Result<PurchaseUpdate, TrackerError>> {
        let data = self.changes.borrow();
        update_listener(
            lock,
            &data.transactions,
            &data.keys,
            self.source.as_ref(),
            data.network,
            self.required_confirmations,
        )
    }
}

pub struct EventReconciler {
    values: BlockchainValues,
    constants: Constants,

    cache: Arc<CacheStore>,
    chain: Arc<dyn ChainReader>,
    history: Arc<dyn HistoryIndex>,

    errors: ErrorEmitter,
    changes: watch::Sender<BlockchainData>,

    fetched_tx: mpsc::UnboundedSender<Fetched>,
    fetched_rx: mpsc::UnboundedReceiver<Fetched>,

    // lookups started and not yet applied.
    in_flight: usize,

    // (lock, expiration) pairs with a refresh timer running.
    expiry_timers: HashSet<(Address, i64)>,
}

impl std::fmt::Debug for EventReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReconciler")
            .field("values", &self.values)
            .field("constants", &self.constants)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl EventReconciler {
    pub fn new(
        config: PaywallConfig,
        constants: Constants,
        cache: Arc<CacheStore>,
        chain: Arc<dyn ChainReader>,
        history: Arc<dyn HistoryIndex>,
        source: Arc<dyn EventSource>,
    ) -> (Self, ReconcilerHandle) {
        let values = BlockchainValues::new(config, constants.default_network);
        let (errors, errors_rx) = ErrorEmitter::new();
        let (changes, changes_rx) = watch::channel(BlockchainData::default());
        let (fetched_tx, fetched_rx) = mpsc::unbounded_channel();

        let handle = ReconcilerHandle {
            changes: changes_rx,
            errors: errors_rx,
            source,
            registry: PurchaseRegistry::new(),
            required_confirmations: constants.required_confirmations,
        };
        let reconciler = Self {
            values,
            constants,
            cache,
            chain,
            history,
            errors,
            changes,
            fetched_tx,
            fetched_rx,
            in_flight: 0,
            expiry_timers: HashSet::new(),
        };
        (reconciler, handle)
    }

    pub fn values(&self) -> &BlockchainValues {
        &self.values
    }

    /// Subscribes to `source` and runs the event loop on a new task.
    pub fn spawn(self, source: &dyn EventSource) -> JoinHandle<()> {
        let events = source.subscribe();
        tokio::spawn(self.run(events))
    }

    /// Loads the cached view, publishes it, and starts fetching fresh data,
    /// then applies events and lookup results until the event source
    /// closes.
    pub async fn run(mut self, mut events: broadcast::Receiver<ChainEvent>) {
        self.initialize().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("reconciler lagged, skipped {} events; re-fetching", skipped);
                        self.get_new_data().await;
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("event source closed, reconciler stopping");
                        break;
                    }
                },
                Some(fetched) = self.fetched_rx.recv() => self.apply_fetched(fetched).await,
            }
        }
    }

    /// Hydrates `values` from the cache, propagates, and starts the initial
    /// lookups.
    pub async fn initialize(&mut self) {
        let network = self
            .cache
            .get_network()
            .await
            .unwrap_or(self.constants.default_network);
        let account = self.cache.get_account().await;
        tracing::info!(
            "initializing for account {} on network {}",
            account.as_ref().map(|a| a.as_str()).unwrap_or("<none>"),
            network
        );

        self.values.network = network;
        self.values.account = account;
        self.values.keys = self.default_keys();
        self.hydrate_locks().await;
        self.hydrate_user_data().await;
        self.propagate().await;

        self.fetch_locks();
        self.get_new_data().await;
    }

    /// applies one event. See the module documentation.
    pub async fn handle_event(&mut self, event: ChainEvent) {
        tracing::debug!("handle_event: {}", event.name());

        match event {
            ChainEvent::AccountChanged(account) => self.on_account_changed(account).await,
            ChainEvent::NetworkChanged(network) => self.on_network_changed(network).await,
            ChainEvent::AccountUpdated { address, update } => {
                self.on_account_updated(address, update).await
            }
            ChainEvent::KeyUpdated { key, .. } => self.on_key_updated(key).await,
            ChainEvent::TransactionUpdated { hash, update } => {
                self.on_transaction_updated(&hash, &update).await
            }
            ChainEvent::LockUpdated { address, update } => {
                self.on_lock_updated(address, update).await
            }
            ChainEvent::PurchaseSubmitted { lock, owner, input } => {
                self.on_purchase_submitted(lock, owner, input).await
            }
            ChainEvent::TransactionNew {
                hash,
                from,
                to,
                input,
                kind,
                status,
            } => {
                let sent = SentTransaction {
                    hash,
                    from,
                    to,
                    input,
                    kind,
                    status,
                };
                self.on_transaction_new(sent).await
            }
            ChainEvent::Error(WalletError::PurchaseFailed) => self.on_purchase_failed().await,
            ChainEvent::Error(WalletError::Other(message)) => {
                tracing::warn!("wallet reported an error: {}", message)
            }
        }
    }

    /// applies lookup results until no lookup is outstanding.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.fetched_rx.recv().await {
                Some(fetched) => self.apply_fetched(fetched).await,
                None => break,
            }
        }
    }

    /// Re-fetches keys, balance and transactions for the current account.
    /// Without an account, the user's working set is emptied instead.
    pub async fn get_new_data(&mut self) {
        let defaults = self.default_keys();
        for (lock, key) in defaults {
            self.values.keys.entry(lock).or_insert(key);
        }

        let Some(account) = self.values.account.clone() else {
            self.values.keys = self.default_keys();
            self.values.transactions.clear();
            self.values.balance = zero_balance();
            self.propagate().await;
            return;
        };
        let scope = self.scope();
        let locks = self.values.lock_addresses();

        for lock in locks.iter().cloned() {
            let chain = self.chain.clone();
            let account = account.clone();
            let scope = scope.clone();
            self.spawn_lookup(async move {
                let result = chain.get_key_by_lock_for_owner(&lock, &account).await;
                Fetched::Key {
                    scope,
                    lock,
                    result,
                }
            });
        }

        let chain = self.chain.clone();
        let balance_scope = scope.clone();
        let balance_account = account.clone();
        self.spawn_lookup(async move {
            let result = chain.refresh_account_balance(&balance_account).await;
            Fetched::Balance {
                scope: balance_scope,
                result,
            }
        });

        if locks.is_empty() {
            return;
        }
        let chain = self.chain.clone();
        let history = self.history.clone();
        let errors = self.errors.clone();
        let network = self.values.network;
        self.spawn_lookup(async move {
            let transactions = retrieve_transactions(
                Some(&account),
                network,
                &locks,
                history.as_ref(),
                chain.as_ref(),
                &errors,
            )
            .await;
            Fetched::Transactions {
                scope,
                transactions,
            }
        });
    }

    fn scope(&self) -> Scope {
        Scope {
            account: self.values.account.clone(),
            network: self.values.network,
        }
    }

    fn context(&self) -> PurchaseContext {
        PurchaseContext {
            network: self.values.network,
            required_confirmations: self.constants.required_confirmations,
            now: now(),
        }
    }

    fn default_keys(&self) -> BTreeMap<Address, Key> {
        make_default_keys(&self.values.lock_addresses(), self.values.account.as_ref())
    }

    fn spawn_lookup(&mut self, lookup: impl Future<Output = Fetched> + Send + 'static) {
        self.in_flight += 1;
        let tx = self.fetched_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(lookup.await);
        });
    }

    fn fetch_locks(&mut self) {
        let network = self.values.network;
        for lock in self.values.lock_addresses() {
            let chain = self.chain.clone();
            self.spawn_lookup(async move {
                let result = chain.get_lock(&lock).await;
                Fetched::Lock {
                    network,
                    lock,
                    result,
                }
            });
        }
    }

    fn schedule_expiry_refresh(&mut self, lock: &Address, expiration: i64) {
        let remaining = expiration - now();
        if expiration <= 0 || remaining <= 0 {
            return;
        }
        if !self.expiry_timers.insert((lock.clone(), expiration)) {
            return;
        }
        let delay = Duration::from_secs(remaining as u64) + KEY_EXPIRY_GRACE;
        tracing::debug!("key on {} expires in {:?}", lock, delay);

        let tx = self.fetched_tx.clone();
        let scope = self.scope();
        let lock = lock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Fetched::KeyExpired {
                scope,
                lock,
                expiration,
            });
        });
    }

    async fn hydrate_locks(&mut self) {
        let cached: BTreeMap<Address, Lock> = self
            .cache
            .get_typed(self.values.network, &Address::null(), LOCKS)
            .await
            .unwrap_or_default();
        self.values.locks = cached
            .into_iter()
            .filter(|(address, _)| self.values.is_watched(address))
            .collect();
    }

    // cached keys and transactions of the current account.
    async fn hydrate_user_data(&mut self) {
        let Some(account) = self.values.account.clone() else {
            return;
        };
        let network = self.values.network;

        let cached_keys: BTreeMap<Address, Key> = self
            .cache
            .get_typed(network, &account, KEYS)
            .await
            .unwrap_or_default();
        for (lock, key) in cached_keys {
            if self.values.is_watched(&lock) && key.owner.as_ref() == Some(&account) {
                self.values.keys.insert(lock, key);
            }
        }

        let cached_transactions: BTreeMap<String, Transaction> = self
            .cache
            .get_typed(network, &account, TRANSACTIONS)
            .await
            .unwrap_or_default();
        self.values.transactions.extend(cached_transactions);
        tracing::debug!(
            "hydrated {} cached transactions for {}",
            self.values.transactions.len(),
            account
        );
    }

    // a new account or network starts from fresh defaults.
    async fn reset(&mut self) {
        self.values.keys = self.default_keys();
        self.values.transactions.clear();
        self.values.balance = zero_balance();
        self.expiry_timers.clear();
        self.hydrate_user_data().await;
        self.propagate().await;
        self.get_new_data().await;
    }

    async fn on_account_changed(&mut self, account: Option<Address>) {
        if account == self.values.account {
            return;
        }
        tracing::info!(
            "account changed to {}",
            account.as_ref().map(|a| a.as_str()).unwrap_or("<none>")
        );
        self.values.account = account;
        self.cache.set_account(self.values.account.as_ref()).await;
        self.reset().await;
    }

    async fn on_network_changed(&mut self, network: NetworkId) {
        if network == self.values.network {
            return;
        }
        tracing::info!("network changed to {}", network);
        self.values.network = network;
        self.cache.set_network(network).await;
        self.hydrate_locks().await;
        self.fetch_locks();
        self.reset().await;
    }

    async fn on_account_updated(&mut self, address: Option<Address>, update: AccountUpdate) {
        if address != self.values.account {
            tracing::debug!("ignoring account update for another account");
            return;
        }
        let Some(balance) = update.balance else {
            return;
        };
        self.values
            .balance
            .insert(ETH_BALANCE.to_string(), balance);
        self.propagate().await;
    }

    async fn on_key_updated(&mut self, update: KeyUpdate) {
        let lock = update.lock.clone();
        if !self.values.is_watched(&lock) {
            tracing::debug!("ignoring key on unwatched lock {}", lock);
            return;
        }
        if update.owner.is_some() && update.owner != self.values.account {
            tracing::debug!("ignoring key on {} for another account", lock);
            return;
        }

        let key = self
            .values
            .keys
            .entry(lock.clone())
            .or_insert_with(|| Key::default_for(lock.clone(), update.owner.clone()));
        key.expiration = update.expiration;
        if update.owner.is_some() {
            key.owner = update.owner;
        }

        self.schedule_expiry_refresh(&lock, update.expiration);
        self.propagate().await;
    }

    async fn on_transaction_updated(&mut self, hash: &str, patch: &TransactionPatch) {
        self.apply_purchase_update(|values, context| {
            apply_update(hash, patch, &values.transactions, &values.keys, context)
        });

        // a mined purchase means the chain has the real key now
        let refetch = self
            .values
            .transactions
            .get(hash)
            .filter(|t| t.is_key_purchase() && t.is_mined())
            .and_then(|t| t.recipient().cloned())
            .filter(|lock| self.values.is_watched(lock));
        if let (Some(lock), Some(account)) = (refetch, self.values.account.clone()) {
            let chain = self.chain.clone();
            let scope = self.scope();
            self.spawn_lookup(async move {
                let result = chain.get_key_by_lock_for_owner(&lock, &account).await;
                Fetched::Key {
                    scope,
                    lock,
                    result,
                }
            });
        }
        self.propagate().await;
    }

    async fn on_lock_updated(&mut self, address: Address, mut update: LockPatch) {
        if !self.values.is_watched(&address) {
            tracing::debug!("ignoring unwatched lock {}", address);
            return;
        }
        if let Some(name) = self.values.config.lock_name(&address) {
            update.name = Some(name.to_string());
        }

        let lock = self
            .values
            .locks
            .entry(address.clone())
            .or_insert_with(|| Lock::new(address.clone()));
        lock.apply(&update);
        let lock = lock.clone();

        if let Err(e) = self
            .cache
            .merge_typed(
                self.values.network,
                &Address::null(),
                LOCKS,
                address.as_str(),
                &lock,
            )
            .await
        {
            tracing::warn!("could not cache lock {}: {}", address, e);
        }

        if let (Some(contract), Some(account)) = (
            lock.currency_contract_address.clone(),
            self.values.account.clone(),
        ) {
            let chain = self.chain.clone();
            let scope = self.scope();
            self.spawn_lookup(async move {
                let result = chain.get_token_balance(&contract, &account).await;
                Fetched::TokenBalance {
                    scope,
                    contract,
                    result,
                }
            });
        }
        self.propagate().await;
    }

    async fn on_purchase_submitted(&mut self, lock: Address, owner: Address, input: Option<String>) {
        if Some(&owner) != self.values.account.as_ref() {
            tracing::debug!("ignoring purchase submitted by another account");
            return;
        }
        self.apply_purchase_update(|values, context| {
            apply_submitted(
                &lock,
                &owner,
                input,
                &values.transactions,
                &values.keys,
                context,
            )
        });
        self.propagate().await;
    }

    async fn on_transaction_new(&mut self, sent: SentTransaction) {
        if self.values.account.is_none() {
            tracing::debug!("ignoring new transaction without an account");
            return;
        }
        self.apply_purchase_update(|values, context| {
            apply_new_transaction(&sent, &values.transactions, &values.keys, context)
        });
        self.store_in_history(&sent);

        // poll the chain for its progress
        let chain = self.chain.clone();
        let scope = self.scope();
        let hash = sent.hash.clone();
        self.spawn_lookup(async move {
            let result = chain.get_transaction(&hash, None).await;
            Fetched::Transaction {
                scope,
                hash,
                result,
            }
        });
        self.propagate().await;
    }

    async fn on_purchase_failed(&mut self) {
        self.errors.emit(SyncError::PurchaseFailed);

        // the wallet does not say which purchase failed
        self.values
            .transactions
            .retain(|_, t| t.status != Some(TransactionStatus::Submitted));
        self.propagate().await;
        self.get_new_data().await;
    }

    fn apply_purchase_update(
        &mut self,
        step: impl FnOnce(&BlockchainValues, PurchaseContext) -> PurchaseUpdate,
    ) {
        let update = step(&self.values, self.context());
        self.values.transactions = update.transactions;
        self.values.keys = update.keys;
    }

    fn store_in_history(&mut self, sent: &SentTransaction) {
        let Some(account) = self.values.account.clone() else {
            return;
        };
        let descriptor = HistoricalTransaction {
            transaction_hash: sent.hash.clone(),
            chain: self.values.network,
            recipient: Some(sent.to.clone()),
            sender: Some(account.clone()),
            beneficiary: Some(account),
            data: sent.input.clone(),
        };
        let history = self.history.clone();
        self.spawn_lookup(async move {
            let result = history.store_transaction(&descriptor).await;
            Fetched::Stored {
                hash: descriptor.transaction_hash,
                result,
            }
        });
    }

    async fn apply_fetched(&mut self, fetched: Fetched) {
        if !matches!(fetched, Fetched::KeyExpired { .. }) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        let current = self.scope();
        match fetched {
            Fetched::Lock {
                network,
                lock,
                result,
            } => {
                if network != current.network {
                    tracing::debug!("dropping lock {} fetched for network {}", lock, network);
                    return;
                }
                match result {
                    Ok(patch) => self.on_lock_updated(lock, patch).await,
                    Err(e) => self.errors.emit(SyncError::LockLookup {
                        lock,
                        reason: format!("{:#}", e),
                    }),
                }
            }
            Fetched::Key {
                scope,
                lock,
                result,
            } => {
                if scope != current {
                    tracing::debug!("dropping stale key on {}", lock);
                    return;
                }
                match result {
                    Ok(update) => self.on_key_updated(update).await,
                    Err(e) => self.errors.emit(SyncError::KeyLookup {
                        lock,
                        reason: format!("{:#}", e),
                    }),
                }
            }
            Fetched::Transactions {
                scope,
                transactions,
            } => {
                if scope != current {
                    tracing::debug!("dropping {} stale transactions", transactions.len());
                    return;
                }
                for transaction in transactions {
                    let patch = TransactionPatch::from(&transaction);
                    self.apply_purchase_update(|values, context| {
                        apply_update(
                            &transaction.hash,
                            &patch,
                            &values.transactions,
                            &values.keys,
                            context,
                        )
                    });
                }
                self.propagate().await;
            }
            Fetched::Transaction {
                scope,
                hash,
                result,
            } => {
                if scope != current {
                    tracing::debug!("dropping stale transaction {}", hash);
                    return;
                }
                match result {
                    Ok(patch) => self.on_transaction_updated(&hash, &patch).await,
                    Err(e) => self.errors.emit(SyncError::TransactionLookup {
                        hash,
                        reason: format!("{:#}", e),
                    }),
                }
            }
            Fetched::Balance { scope, result } => {
                if scope != current {
                    return;
                }
                match result {
                    Ok(balance) => {
                        self.values
                            .balance
                            .insert(ETH_BALANCE.to_string(), balance);
                        self.propagate().await;
                    }
                    Err(e) => self.errors.emit(SyncError::BalanceLookup(format!("{:#}", e))),
                }
            }
            Fetched::TokenBalance {
                scope,
                contract,
                result,
            } => {
                if scope != current {
                    return;
                }
                match result {
                    Ok(balance) => {
                        self.values
                            .balance
                            .insert(contract.to_string(), balance);
                        self.propagate().await;
                    }
                    Err(e) => self.errors.emit(SyncError::BalanceLookup(format!("{:#}", e))),
                }
            }
            // a lost record only costs the history index; it is not surfaced
            Fetched::Stored { hash, result } => {
                if let Err(e) = result {
                    tracing::info!("unable to save key purchase transaction {}: {:#}", hash, e);
                }
            }
            Fetched::KeyExpired {
                scope,
                lock,
                expiration,
            } => {
                self.expiry_timers.remove(&(lock, expiration));
                if scope == current {
                    self.propagate().await;
                }
            }
        }
    }

    /// Re-derives the keys, publishes a snapshot and writes the user's
    /// working set back to the cache.
    pub async fn propagate(&mut self) {
        self.values.keys = link_transactions_to_keys(
            &self.values.keys,
            &self.values.transactions,
            self.constants.required_confirmations,
            now(),
        );

        let locks = self
            .values
            .locks
            .iter()
            .filter(|(address, _)| self.values.is_watched(address))
            .map(|(address, lock)| {
                let key = self.values.keys.get(address).cloned().unwrap_or_else(|| {
                    Key::default_for(address.clone(), self.values.account.clone())
                });
                (
                    address.clone(),
                    LinkedLock {
                        lock: lock.clone(),
                        key,
                    },
                )
            })
            .collect();
        self.changes.send_replace(BlockchainData {
            locks,
            account: self.values.account.clone(),
            balance: self.values.balance.clone(),
            network: self.values.network,
            keys: self.values.keys.clone(),
            transactions: self.values.transactions.clone(),
        });

        let Some(account) = self.values.account.clone() else {
            return;
        };
        let network = self.values.network;
        if let Err(e) = self
            .cache
            .put_typed(network, &account, KEYS, &self.values.keys)
            .await
        {
            tracing::warn!("could not cache keys: {}", e);
        }
        if let Err(e) = self
            .cache
            .put_typed(network, &account, TRANSACTIONS, &self.values.transactions)
            .await
        {
            tracing::warn!("could not cache transactions: {}", e);
        }
    }
}
