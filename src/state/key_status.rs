//! Derivation of a key's status from its transactions.
//!
//! Nothing here reads the clock: `now` is always passed in, so the status of
//! a key is a pure function of `(expiration, transactions,
//! required_confirmations, now)`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use itertools::Itertools;

use crate::models::address::Address;
use crate::models::key::Key;
use crate::models::key::KeyStatus;
use crate::models::transaction::Transaction;
use crate::models::transaction::TransactionStatus;

/// current unix time in seconds.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// newest first: highest block number (so unmined work) first, ties by hash.
pub fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.block_number
        .cmp(&a.block_number)
        .then_with(|| a.hash.cmp(&b.hash))
}

/// status and confirmation count of a key.
pub fn key_status(
    expiration: i64,
    transactions: &[Transaction],
    required_confirmations: u64,
    now: i64,
) -> (KeyStatus, u64) {
    let unexpired = expiration > now;
    let Some(current) = transactions.iter().min_by(|a, b| newest_first(a, b)) else {
        let status = if unexpired {
            KeyStatus::Valid
        } else {
            KeyStatus::None
        };
        return (status, 0);
    };

    let status = match current.status {
        None => KeyStatus::None,
        Some(TransactionStatus::Submitted) => KeyStatus::Submitted,
        Some(TransactionStatus::Pending) => KeyStatus::Pending,
        Some(TransactionStatus::Failed) => KeyStatus::Failed,
        Some(TransactionStatus::Mined) if current.confirmations < required_confirmations => {
            KeyStatus::Confirming
        }
        Some(TransactionStatus::Mined) if unexpired => KeyStatus::Valid,
        Some(TransactionStatus::Mined) => KeyStatus::Expired,
    };
    (status, current.confirmations)
}

/// attaches the transactions purchasing `key` to it, newest first, and
/// re-derives its status.
pub fn link_transactions_to_key<'a>(
    key: &Key,
    transactions: impl IntoIterator<Item = &'a Transaction>,
    required_confirmations: u64,
    now: i64,
) -> Key {
    let linked = match &key.owner {
        Some(owner) => transactions
            .into_iter()
            .filter(|t| t.belongs_to(&key.lock, owner))
            .cloned()
            .sorted_by(newest_first)
            .collect_vec(),
        None => vec![],
    };
    let (status, confirmations) =
        key_status(key.expiration, &linked, required_confirmations, now);

    Key {
        transactions: linked,
        status,
        confirmations,
        ..key.clone()
    }
}

/// [link_transactions_to_key] for every key.
pub fn link_transactions_to_keys(
    keys: &BTreeMap<Address, Key>,
    transactions: &BTreeMap<String, Transaction>,
    required_confirmations: u64,
    now: i64,
) -> BTreeMap<Address, Key> {
    keys.iter()
        .map(|(lock, key)| {
            (
                lock.clone(),
                link_transactions_to_key(key, transactions.values(), required_confirmations, now),
            )
        })
        .collect()
}

/// true if a new purchase of `key` may start.
///
/// Only the current (most recent) transaction is considered: an expired key
/// whose old purchase was mined long ago accepts a renewal, while a key with
/// a purchase in flight does not.
pub fn accepts_purchase(key: &Key, required_confirmations: u64, now: i64) -> bool {
    let (status, _) = key_status(key.expiration, &key.transactions, required_confirmations, now);
    status.accepts_purchase()
}
