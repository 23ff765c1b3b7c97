use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::address::Address;

/// Non-fatal failures reported to the embedder.
///
/// None of these stop the reconciler; the view stays as it was, or gets
/// a partial update, and heals on the next successful fetch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncError {
    #[error("could not reach the history index: {0}")]
    HistoryIndex(String),

    #[error("could not look up transaction {hash}: {reason}")]
    TransactionLookup { hash: String, reason: String },

    #[error("could not look up lock {lock}: {reason}")]
    LockLookup { lock: Address, reason: String },

    #[error("could not look up key on {lock}: {reason}")]
    KeyLookup { lock: Address, reason: String },

    #[error("could not look up balance: {0}")]
    BalanceLookup(String),

    #[error("purchase failed")]
    PurchaseFailed,
}

/// Failure of a one-shot purchase tracker.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TrackerError {
    #[error("the wallet reported that the purchase failed")]
    PurchaseFailed,

    #[error("the event source closed before the tracked event arrived")]
    SourceClosed,

    #[error("a purchase of this key is already being tracked")]
    AlreadyTracking,
}

/// The `emitError` hook: logs each error and forwards it to the embedder.
#[derive(Debug, Clone)]
pub struct ErrorEmitter {
    tx: mpsc::UnboundedSender<SyncError>,
}

impl ErrorEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, error: SyncError) {
        tracing::warn!("{}", error);

        // nobody listening is fine; the error has been logged.
        let _ = self.tx.send(error);
    }
}
