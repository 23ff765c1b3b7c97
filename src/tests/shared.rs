//! Fakes and fixtures shared by the unit tests.

use std::collections::HashMap;
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use anyhow::bail;
use anyhow::Result;
use async_trait::async_trait;
use rand::distr::Alphanumeric;
use rand::distr::SampleString;

use crate::cache::errors::StorageError;
use crate::cache::storage::MemoryStorage;
use crate::cache::storage::StorageMedium;
use crate::config_models::network::NetworkId;
use crate::config_models::paywall_config::PaywallConfig;
use crate::config_models::paywall_config::PaywallLockConfig;
use crate::models::address::Address;
use crate::models::key::KeyUpdate;
use crate::models::lock::LockPatch;
use crate::models::transaction::TransactionDefaults;
use crate::models::transaction::TransactionPatch;
use crate::models::transaction::TransactionStatus;
use crate::state::chain_reader::ChainReader;
use crate::state::retriever::HistoricalTransaction;
use crate::state::retriever::HistoryIndex;

/// A randomly named directory so filesystem-bound tests can run in
/// parallel. It is not created.
pub(crate) fn unit_test_data_directory() -> PathBuf {
    let mut rng = rand::rng();
    let user = env::var("USER").unwrap_or_else(|_| "default".to_string());
    env::temp_dir()
        .join(format!("paywall-sync-unit-tests-{}", user))
        .join(Path::new(&Alphanumeric.sample_string(&mut rng, 16)))
}

/// a config watching `locks`, each named "Lock <address>".
pub(crate) fn paywall_config(locks: &[&Address]) -> PaywallConfig {
    PaywallConfig {
        locks: locks
            .iter()
            .map(|lock| {
                let name = Some(format!("Lock {}", lock));
                ((*lock).clone(), PaywallLockConfig { name })
            })
            .collect(),
        ..Default::default()
    }
}

/// a history index descriptor of a purchase by `account` on `lock`.
pub(crate) fn historical(
    hash: &str,
    network: NetworkId,
    lock: &str,
    account: &Address,
) -> HistoricalTransaction {
    HistoricalTransaction {
        transaction_hash: hash.to_string(),
        chain: network,
        recipient: Some(Address::new(lock)),
        sender: Some(account.clone()),
        beneficiary: Some(account.clone()),
        data: None,
    }
}

/// A storage medium that refuses everything.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BrokenStorage;

#[async_trait]
impl StorageMedium for BrokenStorage {
    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(StorageError::Unavailable("broken".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("broken".to_string()))
    }

    async fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::Unavailable("broken".to_string()))
    }
}

/// Memory storage that starts failing once [FlakyStorage::break_now] is
/// called. Clones share the switch.
#[derive(Debug, Clone, Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    broken: Arc<AtomicBool>,
}

impl FlakyStorage {
    pub(crate) fn break_now(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("quota exceeded".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageMedium for FlakyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.inner.remove(key).await
    }
}

#[derive(Debug, Default)]
struct ChainState {
    locks: HashMap<Address, LockPatch>,
    keys: HashMap<(Address, Address), i64>,
    transactions: HashMap<String, TransactionPatch>,
    failing: HashSet<String>,
    token_balances: HashMap<(Address, Address), String>,

    looked_up: Vec<String>,
    with_defaults: HashSet<String>,
    key_lookups: usize,
}

/// A scripted [ChainReader]. Anything not scripted resolves to an empty
/// record: unnamed locks, keys expiring at 0, transactions with no news.
#[derive(Debug, Default)]
pub(crate) struct FakeChain {
    state: Mutex<ChainState>,
}

impl FakeChain {
    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn mine(&self, hash: &str, block_number: u64, confirmations: u64) {
        let patch = TransactionPatch {
            status: Some(TransactionStatus::Mined),
            block_number: Some(block_number),
            confirmations: Some(confirmations),
            ..Default::default()
        };
        self.state().transactions.insert(hash.to_string(), patch);
    }

    pub(crate) fn fail_transaction(&self, hash: &str) {
        self.state().failing.insert(hash.to_string());
    }

    pub(crate) fn set_key(&self, lock: &Address, owner: &Address, expiration: i64) {
        self.state()
            .keys
            .insert((lock.clone(), owner.clone()), expiration);
    }

    pub(crate) fn set_lock(&self, lock: &Address, patch: LockPatch) {
        self.state().locks.insert(lock.clone(), patch);
    }

    pub(crate) fn set_token_balance(&self, contract: &Address, owner: &Address, balance: &str) {
        self.state()
            .token_balances
            .insert((contract.clone(), owner.clone()), balance.to_string());
    }

    pub(crate) fn looked_up_transactions(&self) -> Vec<String> {
        self.state().looked_up.clone()
    }

    /// true if `hash` was looked up with locally known defaults.
    pub(crate) fn received_defaults(&self, hash: &str) -> bool {
        self.state().with_defaults.contains(hash)
    }

    pub(crate) fn key_lookups(&self) -> usize {
        self.state().key_lookups
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn get_lock(&self, lock: &Address) -> Result<LockPatch> {
        let mut patch = self.state().locks.get(lock).cloned().unwrap_or_default();
        patch.address = Some(lock.clone());
        Ok(patch)
    }

    async fn get_key_by_lock_for_owner(&self, lock: &Address, owner: &Address) -> Result<KeyUpdate> {
        let mut state = self.state();
        state.key_lookups += 1;
        let expiration = state
            .keys
            .get(&(lock.clone(), owner.clone()))
            .copied()
            .unwrap_or_default();
        Ok(KeyUpdate {
            lock: lock.clone(),
            owner: Some(owner.clone()),
            expiration,
        })
    }

    async fn get_transaction(
        &self,
        hash: &str,
        defaults: Option<&TransactionDefaults>,
    ) -> Result<TransactionPatch> {
        let mut state = self.state();
        state.looked_up.push(hash.to_string());
        if defaults.is_some() {
            state.with_defaults.insert(hash.to_string());
        }
        if state.failing.contains(hash) {
            bail!("transaction {} is unknown to the node", hash);
        }
        Ok(state.transactions.get(hash).cloned().unwrap_or_default())
    }

    async fn refresh_account_balance(&self, _account: &Address) -> Result<String> {
        Ok("100".to_string())
    }

    async fn get_token_balance(&self, contract: &Address, owner: &Address) -> Result<String> {
        Ok(self
            .state()
            .token_balances
            .get(&(contract.clone(), owner.clone()))
            .cloned()
            .unwrap_or_else(|| "0".to_string()))
    }
}

/// A [HistoryIndex] holding a fixed set of descriptors.
#[derive(Debug, Default)]
pub(crate) struct FakeHistory {
    descriptors: Vec<HistoricalTransaction>,
    failing: AtomicBool,
    fetches: AtomicUsize,
    stored: Mutex<Vec<HistoricalTransaction>>,
}

impl FakeHistory {
    pub(crate) fn with(descriptors: Vec<HistoricalTransaction>) -> Self {
        Self {
            descriptors,
            ..Default::default()
        }
    }

    pub(crate) fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn stored(&self) -> Vec<HistoricalTransaction> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryIndex for FakeHistory {
    async fn fetch_transactions(
        &self,
        account: &Address,
        locks: &[Address],
    ) -> Result<Vec<HistoricalTransaction>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("locksmith is down");
        }
        Ok(self
            .descriptors
            .iter()
            .filter(|d| d.beneficiary.as_ref() == Some(account))
            .filter(|d| d.recipient.as_ref().is_some_and(|r| locks.contains(r)))
            .cloned()
            .collect())
    }

    async fn store_transaction(&self, transaction: &HistoricalTransaction) -> Result<()> {
        self.stored.lock().unwrap().push(transaction.clone());
        Ok(())
    }
}
