//! Persistence of the per-user working set.
//!
//! The [CacheStore] exposes containers keyed by `(network, account)`, each a
//! JSON object mapping a type name (`"keys"`, `"transactions"`, `"locks"`, ..)
//! to an arbitrary value. Values shared by all users live under
//! [crate::models::address::NULL_ACCOUNT].
//!
//! Storage is pluggable through [driver::CacheDriver]. A store backed by a
//! [storage::StorageMedium] checks the medium on construction and degrades to
//! the process-lifetime [memory_driver::InMemoryDriver] whenever the medium
//! fails, so callers never see a storage error.

pub mod driver;
pub mod errors;
pub mod memory_driver;
pub mod storage;
pub mod storage_driver;
mod store;

pub use store::CacheStore;

use crate::config_models::network::NetworkId;
use crate::models::address::Address;

/// a cached container: type name -> value.
pub type Container = serde_json::Map<String, serde_json::Value>;

/// storage id of the container for `account` on `network`.
pub fn storage_id(network: NetworkId, account: &Address) -> String {
    format!("unlock-protocol/{}/{}", network, account)
}

/// Items that are not specific to any `(network, account)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum UnkeyedItem {
    #[strum(serialize = "account")]
    Account,
    #[strum(serialize = "network")]
    Network,
}

impl UnkeyedItem {
    pub fn storage_key(&self) -> String {
        format!("__unlockProtocol.{}", self)
    }
}
