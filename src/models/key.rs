use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::address::Address;
use super::transaction::Transaction;

/// Derived status of a key. See [crate::state::key_status].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIs,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyStatus {
    #[default]
    None,
    Submitted,
    Pending,
    Confirming,
    Valid,
    Expired,
    Failed,
}

impl KeyStatus {
    /// a key in one of these states accepts a fresh purchase.
    pub fn accepts_purchase(&self) -> bool {
        matches!(self, Self::None | Self::Expired | Self::Failed)
    }
}

/// A user's membership record for one lock.
///
/// `status`, `confirmations` and `transactions` are always re-derived from
/// the transaction set; only `lock`, `owner` and `expiration` come from the
/// chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    pub lock: Address,
    pub owner: Option<Address>,

    /// unix seconds.
    pub expiration: i64,

    #[serde(default)]
    pub transactions: Vec<Transaction>,

    #[serde(default)]
    pub status: KeyStatus,

    #[serde(default)]
    pub confirmations: u64,
}

impl Key {
    /// the placeholder key every watched lock has before the chain reports
    /// anything for the current account.
    pub fn default_for(lock: Address, owner: Option<Address>) -> Self {
        Self {
            lock,
            owner,
            expiration: 0,
            transactions: vec![],
            status: KeyStatus::None,
            confirmations: 0,
        }
    }

    /// the transaction that decides the status of this key.
    pub fn current_transaction(&self) -> Option<&Transaction> {
        self.transactions.first()
    }
}

/// fresh default keys for every watched lock.
pub fn make_default_keys(lock_addresses: &[Address], owner: Option<&Address>) -> BTreeMap<Address, Key> {
    lock_addresses
        .iter()
        .map(|lock| (lock.clone(), Key::default_for(lock.clone(), owner.cloned())))
        .collect()
}

/// Key data as reported by the chain reader in `key.updated` events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyUpdate {
    pub lock: Address,
    #[serde(default)]
    pub owner: Option<Address>,
    #[serde(default)]
    pub expiration: i64,
}
