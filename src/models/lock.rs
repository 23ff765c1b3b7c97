use serde::Deserialize;
use serde::Serialize;

use super::address::Address;

/// Public metadata of a lock, shared by all users and cached under the
/// null account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lock {
    pub address: Address,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_price: Option<String>,

    /// seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_duration: Option<u64>,

    /// set when the lock is priced in an ERC20 token rather than ether.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_contract_address: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number_of_keys: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outstanding_keys: Option<u64>,
}

impl Lock {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            name: None,
            key_price: None,
            expiration_duration: None,
            currency_contract_address: None,
            max_number_of_keys: None,
            outstanding_keys: None,
        }
    }

    pub fn apply(&mut self, patch: &LockPatch) {
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(key_price) = &patch.key_price {
            self.key_price = Some(key_price.clone());
        }
        if let Some(d) = patch.expiration_duration {
            self.expiration_duration = Some(d);
        }
        if let Some(c) = &patch.currency_contract_address {
            self.currency_contract_address = Some(c.clone());
        }
        if let Some(m) = patch.max_number_of_keys {
            self.max_number_of_keys = Some(m);
        }
        if let Some(o) = patch.outstanding_keys {
            self.outstanding_keys = Some(o);
        }
    }
}

/// partial lock data carried by `lock.updated` events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_price: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_duration: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_contract_address: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number_of_keys: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outstanding_keys: Option<u64>,
}
