//! Delivery of [ChainEvent]s from the wallet and chain-reading services.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::models::event::ChainEvent;

/// capacity of the event bus. A subscriber that falls further behind skips
/// the oldest events.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Something that emits [ChainEvent]s to any number of subscribers.
///
/// A subscription only sees events sent after it was taken, so a one-shot
/// listener must subscribe before the action that triggers its event.
pub trait EventSource: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ChainEvent>;
}

/// An in-process [EventSource], fed by whatever adapts the wallet and chain
/// services.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// sends `event` to every current subscriber.
    pub fn emit(&self, event: ChainEvent) {
        tracing::trace!("emitting {}", event.name());

        // no subscribers is not an error.
        let _ = self.tx.send(event);
    }

    /// parses and emits an untyped `(name, subject, payload)` triple.
    /// Returns false if it was ignored.
    pub fn emit_raw(
        &self,
        name: &str,
        subject: &serde_json::Value,
        payload: &serde_json::Value,
    ) -> bool {
        match ChainEvent::from_raw(name, subject, payload) {
            Some(event) => {
                self.emit(event);
                true
            }
            None => false,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for EventBus {
    fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }
}

/// Waits for the first event `select` maps to `Some`, the `once` of the
/// event source.
///
/// Returns `None` if the source closes first. Lagging is survived by
/// skipping what was missed.
pub async fn once<T>(
    rx: &mut broadcast::Receiver<ChainEvent>,
    mut select: impl FnMut(&ChainEvent) -> Option<T>,
) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(found) = select(&event) {
                    return Some(found);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("one-shot listener lagged, skipped {} events", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use macro_rules_attr::apply;
    use serde_json::json;
    use serde_json::Value;

    use super::*;
    use crate::config_models::network::NetworkId;
    use crate::tests::shared_tokio_runtime;

    #[apply(shared_tokio_runtime)]
    async fn once_skips_unrelated_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.emit(ChainEvent::AccountChanged(None));
        bus.emit(ChainEvent::NetworkChanged(NetworkId::DEV));

        let network = once(&mut rx, |e| match e {
            ChainEvent::NetworkChanged(n) => Some(*n),
            _ => None,
        })
        .await;
        assert_eq!(Some(NetworkId::DEV), network);
    }

    #[apply(shared_tokio_runtime)]
    async fn once_returns_none_when_closed() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        drop(bus);
        assert_eq!(None, once(&mut rx, |_| Some(())).await);
    }

    #[apply(shared_tokio_runtime)]
    async fn once_survives_lagging() {
        let bus = EventBus::with_capacity(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.emit(ChainEvent::AccountChanged(None));
        }
        bus.emit(ChainEvent::NetworkChanged(NetworkId::KOVAN));

        let network = once(&mut rx, |e| match e {
            ChainEvent::NetworkChanged(n) => Some(*n),
            _ => None,
        })
        .await;
        assert_eq!(Some(NetworkId::KOVAN), network);
    }

    #[apply(shared_tokio_runtime)]
    async fn raw_events_are_parsed_or_dropped() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert!(!bus.emit_raw("nonsense", &Value::Null, &Value::Null));
        assert!(bus.emit_raw("network.changed", &json!(42), &Value::Null));

        assert_eq!(ChainEvent::NetworkChanged(NetworkId::KOVAN), rx.recv().await.unwrap());
    }
}
