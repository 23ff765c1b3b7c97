//! Short-lived trackers that move a just-submitted purchase through the
//! transaction state machine.
//!
//! The merge rules live in plain functions ([apply_submitted],
//! [apply_new_transaction], [apply_update]) that the
//! [super::reconciler::EventReconciler] also calls from its event loop, so
//! an awaited tracker and the reconciler always agree on the outcome of an
//! event.

pub mod submitted_listener;
pub mod update_listener;

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use super::key_status::accepts_purchase;
use super::key_status::link_transactions_to_key;
use super::key_status::link_transactions_to_keys;
use super::transaction_state_machine::apply_transaction_update;
use super::transaction_state_machine::submitted_transaction;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;
use crate::models::key::Key;
use crate::models::transaction::key_id;
use crate::models::transaction::synthetic_hash;
use crate::models::transaction::Transaction;
use crate::models::transaction::TransactionPatch;
use crate::models::transaction::TransactionStatus;
use crate::models::transaction::TransactionType;

pub use submitted_listener::submitted_listener;
pub use update_listener::update_listener;

/// transactions and keys after a tracker step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurchaseUpdate {
    pub transactions: BTreeMap<String, Transaction>,
    pub keys: BTreeMap<Address, Key>,
}

impl PurchaseUpdate {
    pub fn new(transactions: BTreeMap<String, Transaction>, keys: BTreeMap<Address, Key>) -> Self {
        Self { transactions, keys }
    }
}

/// What the trackers need to know beyond the transactions and keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurchaseContext {
    pub network: NetworkId,
    pub required_confirmations: u64,
    pub now: i64,
}

/// The `(lock, account)` pairs with a submitted tracker waiting.
///
/// A registration lasts until its [Registration] is dropped.
#[derive(Clone, Debug, Default)]
pub struct PurchaseRegistry {
    in_flight: Arc<Mutex<HashSet<(Address, Address)>>>,
}

impl PurchaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if `(lock, account)` is registered already.
    pub fn try_register(&self, lock: &Address, account: &Address) -> Option<Registration> {
        let entry = (lock.clone(), account.clone());
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if !in_flight.insert(entry.clone()) {
            return None;
        }
        Some(Registration {
            registry: self.clone(),
            entry,
        })
    }

    pub fn is_registered(&self, lock: &Address, account: &Address) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains(&(lock.clone(), account.clone()))
    }
}

#[derive(Debug)]
pub struct Registration {
    registry: PurchaseRegistry,
    entry: (Address, Address),
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .in_flight
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&self.entry);
    }
}

/// records a purchase dispatched for `account` on `lock`, before its hash is
/// known.
///
/// A no-op unless the key accepts a purchase: see
/// [super::key_status::accepts_purchase].
pub fn apply_submitted(
    lock: &Address,
    account: &Address,
    input: Option<String>,
    transactions: &BTreeMap<String, Transaction>,
    keys: &BTreeMap<Address, Key>,
    context: PurchaseContext,
) -> PurchaseUpdate {
    let unchanged = || PurchaseUpdate::new(transactions.clone(), keys.clone());
    let Some(key) = keys.get(lock) else {
        tracing::debug!("purchase submitted for unwatched lock {}", lock);
        return unchanged();
    };
    let linked = link_transactions_to_key(
        key,
        transactions.values(),
        context.required_confirmations,
        context.now,
    );
    let key_is_free = accepts_purchase(&linked, context.required_confirmations, context.now);
    if !key_is_free {
        tracing::debug!("key on {} already has a purchase in progress", lock);
        return unchanged();
    }

    let hash = synthetic_hash(lock, account);
    let mut transactions = transactions.clone();
    transactions.insert(
        hash.clone(),
        submitted_transaction(hash, lock, account, input, context.network),
    );
    let keys = link_transactions_to_keys(
        keys,
        &transactions,
        context.required_confirmations,
        context.now,
    );
    PurchaseUpdate::new(transactions, keys)
}

/// A transaction the wallet has sent, as reported with its real hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentTransaction {
    pub hash: String,
    pub from: Address,
    pub to: Address,
    pub input: Option<String>,
    pub kind: TransactionType,
    pub status: TransactionStatus,
}

/// records the real hash of a sent transaction. For a key purchase the
/// synthetic record standing in for it is replaced.
pub fn apply_new_transaction(
    sent: &SentTransaction,
    transactions: &BTreeMap<String, Transaction>,
    keys: &BTreeMap<Address, Key>,
    context: PurchaseContext,
) -> PurchaseUpdate {
    let mut transactions = transactions.clone();

    let synthetic = match sent.kind {
        TransactionType::KeyPurchase => transactions.remove(&synthetic_hash(&sent.to, &sent.from)),
        _ => None,
    };
    let base = match transactions.get(&sent.hash) {
        Some(existing) => existing.clone(),
        None => {
            let mut t = synthetic.unwrap_or_else(|| Transaction::new(sent.hash.clone()));
            t.hash = sent.hash.clone();
            t
        }
    };

    let patch = TransactionPatch {
        from: Some(sent.from.clone()),
        to: Some(sent.to.clone()),
        beneficiary: Some(sent.from.clone()),
        lock: Some(sent.to.clone()),
        key: Some(key_id(&sent.to, &sent.from)),
        input: sent.input.clone(),
        status: Some(sent.status),
        kind: Some(sent.kind),
        network: Some(context.network),
        ..Default::default()
    };
    let record = apply_transaction_update(&base, &patch);
    transactions.insert(sent.hash.clone(), record);

    let keys = link_transactions_to_keys(
        keys,
        &transactions,
        context.required_confirmations,
        context.now,
    );
    PurchaseUpdate::new(transactions, keys)
}

/// merges a `transaction.updated` patch into the record for `hash`. A
/// record seen for the first time starts out `submitted` and unmined.
pub fn apply_update(
    hash: &str,
    patch: &TransactionPatch,
    transactions: &BTreeMap<String, Transaction>,
    keys: &BTreeMap<Address, Key>,
    context: PurchaseContext,
) -> PurchaseUpdate {
    let mut transactions = transactions.clone();
    let existing = transactions.get(hash).cloned().unwrap_or_else(|| {
        let mut t = Transaction::new(hash);
        t.status = Some(TransactionStatus::Submitted);
        t
    });
    transactions.insert(hash.to_string(), apply_transaction_update(&existing, patch));

    let keys = link_transactions_to_keys(
        keys,
        &transactions,
        context.required_confirmations,
        context.now,
    );
    PurchaseUpdate::new(transactions, keys)
}
