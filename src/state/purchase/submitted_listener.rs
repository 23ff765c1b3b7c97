use std::collections::BTreeMap;

use futures::future;
use futures::future::BoxFuture;
use futures::FutureExt;

use super::apply_submitted;
use super::PurchaseContext;
use super::PurchaseRegistry;
use super::PurchaseUpdate;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;
use crate::models::event::ChainEvent;
use crate::models::event::WalletError;
use crate::models::key::Key;
use crate::models::transaction::Transaction;
use crate::state::errors::TrackerError;
use crate::state::event_source::once;
use crate::state::event_source::EventSource;
use crate::state::key_status::accepts_purchase;
use crate::state::key_status::link_transactions_to_key;
use crate::state::key_status::now;

/// Waits for the wallet to report that a purchase on `lock` was dispatched,
/// and resolves with the optimistic `submitted` records.
///
/// If the key on `lock` already has a purchase in progress, or is valid, the
/// returned future resolves at once with the inputs unchanged. The listener
/// is registered before this function returns, so the purchase may be
/// dispatched right after calling it.
///
/// Only one listener per `(lock, owner)` may wait at a time; a second call
/// resolves with [TrackerError::AlreadyTracking].
pub fn submitted_listener(
    lock: &Address,
    transactions: &BTreeMap<String, Transaction>,
    keys: &BTreeMap<Address, Key>,
    source: &dyn EventSource,
    registry: &PurchaseRegistry,
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
    if !accepts_purchase(&linked, required_confirmations, now()) {
        tracing::debug!(
            "not tracking purchase on {}: key is {}",
            lock,
            linked.status
        );
        return future::ready(Ok(echo)).boxed();
    }

    let Some(registration) = registry.try_register(lock, &owner) else {
        return future::ready(Err(TrackerError::AlreadyTracking)).boxed();
    };
    let mut rx = source.subscribe();
    let lock = lock.clone();

    async move {
        let _registration = registration;

        let input = once(&mut rx, |event| match event {
            ChainEvent::PurchaseSubmitted {
                lock: l,
                owner: o,
                input,
            } if *l == lock && *o == owner => Some(Ok(input.clone())),
            ChainEvent::Error(WalletError::PurchaseFailed) => {
                Some(Err(TrackerError::PurchaseFailed))
            }
            _ => None,
        })
        .await
        .ok_or(TrackerError::SourceClosed)??;

        tracing::debug!("purchase on {} submitted by {}", lock, owner);
        let context = PurchaseContext {
            network,
            required_confirmations,
            now: now(),
        };
        Ok(apply_submitted(
            &lock,
            &owner,
            input,
            &echo.transactions,
            &echo.keys,
            context,
        ))
    }
    .boxed()
}
