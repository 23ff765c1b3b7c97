//! Reconciliation of wallet and chain events into the view the widget
//! renders.
//!
//! The [reconciler::EventReconciler] is the single writer of that view.
//! The purchase trackers in [purchase] are one-shot, side-effect-free
//! futures an embedder can await around a checkout.

pub mod chain_reader;
pub mod errors;
pub mod event_source;
pub mod key_status;
pub mod purchase;
pub mod reconciler;
pub mod retriever;
pub mod transaction_state_machine;
