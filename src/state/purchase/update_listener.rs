use std::collections::BTreeMap;

use futures::future;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::apply_new_transaction;
use super::apply_update;
use super::PurchaseContext;
use super::PurchaseUpdate;
use super::SentTransaction;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;
use crate::models::event::ChainEvent;
use crate::models::event::WalletError;
use crate::models::key::Key;
use crate::models::transaction::Transaction;
use crate::models::transaction::TransactionStatus;
use crate::state::errors::TrackerError;
use crate::state::event_source::once;
use crate::state::event_source::EventSource;
use crate::state::key_status::link_transactions_to_key;
use crate::state::key_status::now;

// what the listener waits for.
enum Tracked {
    // the synthetic record: wait for the wallet to report the real hash.
    Submission { lock: Address, owner: Address },
    Hash(String),
}

/// Waits for the next update of the current transaction of the key on
/// `lock`, and resolves with the update merged in and the key re-derived.
///
/// Resolves at once, with the inputs unchanged, if there is nothing left to
/// track: no transaction, a failed one, or one with
/// `required_confirmations` already.
pub fn update_listener(
    lock: &Address,
    transactions: &BTreeMap<String, Transaction>,
    keys: &BTreeMap<Address, Key>,
    source: &dyn EventSource,
    network: NetworkId,
    required_confirmations: u64,
) -> BoxFuture<'static, Result<PurchaseUpdate, TrackerError>> {
    let echo = PurchaseUpdate::new(transactions.clone(), keys.clone());
    let Some(key) = keys.get(lock) else {
        return future::ready(Ok(echo)).boxed();
    };
    let Some(owner) = key.owner.clone() else {
        return future::ready(Ok(echo)).boxed();
    };

    let linked = link_transactions_to_key(key, transactions.values(), required_confirmations, now());
    let Some(current) = linked.current_transaction() else {
        return future::ready(Ok(echo)).boxed();
    };
    let settled = match current.status {
        Some(TransactionStatus::Failed) => true,
        Some(TransactionStatus::Mined) => current.confirmations >= required_confirmations,
        _ => false,
    };
    if settled {
        return future::ready(Ok(echo)).boxed();
    }

    let tracked = if current.is_synthetic() {
        Tracked::Submission {
            lock: lock.clone(),
            owner,
        }
    } else {
        Tracked::Hash(current.hash.clone())
    };
    let mut rx = source.subscribe();

    async move {
        let context = || PurchaseContext {
            network,
            required_confirmations,
            now: now(),
        };

        match tracked {
            Tracked::Submission { lock, owner } => {
                let sent = once(&mut rx, |event| match event {
                    ChainEvent::TransactionNew {
                        hash,
                        from,
                        to,
                        input,
                        kind,
                        status,
                    } if *to == lock && *from == owner => Some(Ok(SentTransaction {
                        hash: hash.clone(),
                        from: from.clone(),
                        to: to.clone(),
                        input: input.clone(),
                        kind: *kind,
                        status: *status,
                    })),
                    ChainEvent::Error(WalletError::PurchaseFailed) => {
                        Some(Err(TrackerError::PurchaseFailed))
                    }
                    _ => None,
                })
                .await
                .ok_or(TrackerError::SourceClosed)??;

                Ok(apply_new_transaction(
                    &sent,
                    &echo.transactions,
                    &echo.keys,
                    context(),
                ))
            }
            Tracked::Hash(tracked_hash) => {
                let patch = once(&mut rx, |event| match event {
                    ChainEvent::TransactionUpdated { hash, update } if *hash == tracked_hash => {
                        Some(update.clone())
                    }
                    _ => None,
                })
                .await
                .ok_or(TrackerError::SourceClosed)?;

                Ok(apply_update(
                    &tracked_hash,
                    &patch,
                    &echo.transactions,
                    &echo.keys,
                    context(),
                ))
            }
        }
    }
    .boxed()
}
