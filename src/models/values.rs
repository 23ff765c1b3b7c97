use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use super::address::Address;
use super::key::make_default_keys;
use super::key::Key;
use super::lock::Lock;
use super::transaction::Transaction;
use crate::config_models::network::NetworkId;
use crate::config_models::paywall_config::PaywallConfig;

/// balances of the current account, keyed by currency. Ether lives under
/// [ETH_BALANCE], ERC20 balances under the token contract address.
pub type Balance = BTreeMap<String, String>;

pub const ETH_BALANCE: &str = "eth";

pub fn zero_balance() -> Balance {
    BTreeMap::from([(ETH_BALANCE.to_string(), "0".to_string())])
}

/// The in-memory aggregate the UI reads. Only the
/// [crate::state::reconciler::EventReconciler] mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainValues {
    pub config: PaywallConfig,
    pub account: Option<Address>,
    pub network: NetworkId,
    pub balance: Balance,
    pub locks: BTreeMap<Address, Lock>,
    pub keys: BTreeMap<Address, Key>,
    pub transactions: BTreeMap<String, Transaction>,
}

impl BlockchainValues {
    pub fn new(config: PaywallConfig, network: NetworkId) -> Self {
        let keys = make_default_keys(&config.lock_addresses(), None);
        Self {
            config,
            account: None,
            network,
            balance: zero_balance(),
            locks: BTreeMap::new(),
            keys,
            transactions: BTreeMap::new(),
        }
    }

    pub fn lock_addresses(&self) -> Vec<Address> {
        self.config.lock_addresses()
    }

    pub fn is_watched(&self, lock: &Address) -> bool {
        self.config.locks.contains_key(lock)
    }
}

/// A lock together with the current account's key on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedLock {
    #[serde(flatten)]
    pub lock: Lock,
    pub key: Key,
}

/// The snapshot handed to the UI on every propagation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockchainData {
    pub locks: BTreeMap<Address, LinkedLock>,
    pub account: Option<Address>,
    pub balance: Balance,
    pub network: NetworkId,
    pub keys: BTreeMap<Address, Key>,
    pub transactions: BTreeMap<String, Transaction>,
}
