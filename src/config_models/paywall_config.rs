use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::models::address::Address;

/// Per-lock settings given by the site embedding the widget.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaywallLockConfig {
    /// overrides the on-chain lock name when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToAction {
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub expired: String,
    #[serde(default)]
    pub pending: String,
    #[serde(default)]
    pub confirmed: String,
}

/// The paywall configuration. Lock addresses are normalized on load, so
/// the keys of `locks` are the watched lock addresses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallConfig {
    pub locks: BTreeMap<Address, PaywallLockConfig>,

    #[serde(default)]
    pub call_to_action: CallToAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl PaywallConfig {
    pub fn lock_addresses(&self) -> Vec<Address> {
        self.locks.keys().cloned().collect()
    }

    pub fn lock_name(&self, lock: &Address) -> Option<&str> {
        self.locks.get(lock).and_then(|l| l.name.as_deref())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read paywall config {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse paywall config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_addresses_are_normalized() {
        let config: PaywallConfig = serde_json::from_value(serde_json::json!({
            "locks": {
                "0xAaAdEED4c0B861cB36f4cE006a9C90BA2E43fdc2": { "name": "1" },
                "0x15B87bdC4B3ecb783F56f735653332EAD3BCa5F8": {}
            },
            "callToAction": { "default": "buy" }
        }))
        .unwrap();

        let lock = Address::new("0xaaadeed4c0b861cb36f4ce006a9c90ba2e43fdc2");
        assert!(config.lock_addresses().contains(&lock));
        assert_eq!(Some("1"), config.lock_name(&lock));
        assert_eq!("buy", config.call_to_action.default);
        assert_eq!("", config.call_to_action.expired);
    }
}
