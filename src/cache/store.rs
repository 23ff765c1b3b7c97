use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use super::driver::CacheDriver;
use super::errors::StorageError;
use super::memory_driver::InMemoryDriver;
use super::storage::StorageMedium;
use super::storage_driver::StorageDriver;
use super::Container;
use super::UnkeyedItem;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;

/// Keyed, asynchronous cache over `(network, account)` containers.
///
/// Every operation holds the driver lock from its read to its write, so
/// operations issued from one task complete in issue order and a
/// read-modify-write (`put`, `merge`) never interleaves with another.
#[derive(Debug)]
pub struct CacheStore {
    driver: Mutex<Box<dyn CacheDriver>>,
}

impl CacheStore {
    /// a store that forgets everything when the process exits.
    pub fn in_memory() -> Self {
        Self {
            driver: Mutex::new(Box::new(InMemoryDriver::new())),
        }
    }

    /// a store persisting to `medium`, or an in-memory store if the medium
    /// fails its availability check.
    pub async fn new<M: StorageMedium + 'static>(medium: M) -> Self {
        let driver = StorageDriver::new(medium);
        let driver: Box<dyn CacheDriver> = if driver.is_available().await {
            Box::new(driver)
        } else {
            Box::new(InMemoryDriver::new())
        };
        tracing::debug!("cache store uses the {} driver", driver.name());
        Self {
            driver: Mutex::new(driver),
        }
    }

    pub async fn driver_name(&self) -> &'static str {
        self.driver.lock().await.name()
    }

    /// the whole container for `account` on `network`.
    pub async fn get_container(&self, network: NetworkId, account: &Address) -> Container {
        let mut driver = self.driver.lock().await;
        read_container(&mut driver, network, account).await
    }

    /// the value stored for `kind`, if any.
    pub async fn get(&self, network: NetworkId, account: &Address, kind: &str) -> Option<Value> {
        let mut container = self.get_container(network, account).await;
        container.remove(kind).filter(|v| !v.is_null())
    }

    /// like [Self::get], decoding the value. A value that does not decode
    /// is a miss.
    pub async fn get_typed<T: DeserializeOwned>(
        &self,
        network: NetworkId,
        account: &Address,
        kind: &str,
    ) -> Option<T> {
        let value = self.get(network, account, kind).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(
                    "ignoring incompatible cached {} for {} on network {}: {}",
                    kind,
                    account,
                    network,
                    e
                );
                None
            }
        }
    }

    /// replaces the value of `kind`. `None` deletes it.
    pub async fn put(
        &self,
        network: NetworkId,
        account: &Address,
        kind: &str,
        value: Option<Value>,
    ) {
        let mut driver = self.driver.lock().await;
        let mut container = read_container(&mut driver, network, account).await;
        match value {
            Some(v) => container.insert(kind.to_string(), v),
            None => container.remove(kind),
        };
        write_container(&mut driver, network, account, container).await;
    }

    pub async fn put_typed<T: Serialize>(
        &self,
        network: NetworkId,
        account: &Address,
        kind: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.put(network, account, kind, Some(value)).await;
        Ok(())
    }

    /// merges `value` into the `sub_type` entry of `kind`, leaving sibling
    /// entries untouched. `None` deletes only that entry.
    pub async fn merge(
        &self,
        network: NetworkId,
        account: &Address,
        kind: &str,
        sub_type: &str,
        value: Option<Value>,
    ) {
        let mut driver = self.driver.lock().await;
        let mut container = read_container(&mut driver, network, account).await;
        merge_sub_type(&mut container, kind, sub_type, value);
        write_container(&mut driver, network, account, container).await;
    }

    pub async fn merge_typed<T: Serialize>(
        &self,
        network: NetworkId,
        account: &Address,
        kind: &str,
        sub_type: &str,
        value: &T,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.merge(network, account, kind, sub_type, Some(value)).await;
        Ok(())
    }

    /// clears one type, or the whole container if `kind` is `None`.
    pub async fn clear(&self, network: NetworkId, account: &Address, kind: Option<&str>) {
        let mut driver = self.driver.lock().await;
        match kind {
            Some(kind) => {
                let mut container = read_container(&mut driver, network, account).await;
                if container.remove(kind).is_some() {
                    write_container(&mut driver, network, account, container).await;
                }
            }
            None => {
                if let Err(e) = driver.clear_keyed_item(network, account).await {
                    if fall_back(&mut driver, e) {
                        let _ = driver.clear_keyed_item(network, account).await;
                    }
                }
            }
        }
    }

    /// the account that was current when the cache was last written.
    pub async fn get_account(&self) -> Option<Address> {
        match self.get_unkeyed(UnkeyedItem::Account).await? {
            Value::String(s) if !s.is_empty() => Some(Address::new(s)),
            _ => None,
        }
    }

    pub async fn set_account(&self, account: Option<&Address>) {
        let value = account.map(|a| Value::String(a.to_string()));
        self.set_unkeyed(UnkeyedItem::Account, value).await
    }

    pub async fn get_network(&self) -> Option<NetworkId> {
        match self.get_unkeyed(UnkeyedItem::Network).await? {
            Value::Number(n) => n.as_u64().map(NetworkId),
            Value::String(s) => s.trim().parse::<u64>().ok().map(NetworkId),
            _ => None,
        }
    }

    pub async fn set_network(&self, network: NetworkId) {
        self.set_unkeyed(UnkeyedItem::Network, Some(Value::from(network.id())))
            .await
    }

    async fn get_unkeyed(&self, item: UnkeyedItem) -> Option<Value> {
        let mut driver = self.driver.lock().await;
        match driver.get_unkeyed_item(item).await {
            Ok(v) => v,
            Err(e) => {
                if !fall_back(&mut driver, e) {
                    return None;
                }
                driver.get_unkeyed_item(item).await.ok().flatten()
            }
        }
    }

    async fn set_unkeyed(&self, item: UnkeyedItem, value: Option<Value>) {
        let mut driver = self.driver.lock().await;
        if let Err(e) = driver.save_unkeyed_item(item, value.clone()).await {
            if fall_back(&mut driver, e) {
                let _ = driver.save_unkeyed_item(item, value).await;
            }
        }
    }
}

// replaces a failing driver with a fresh in-memory one, and returns true if
// the operation should be retried on it. A key the medium can't address
// fails only that operation.
fn fall_back(driver: &mut Box<dyn CacheDriver>, error: StorageError) -> bool {
    if let StorageError::InvalidKey(key) = &error {
        tracing::warn!("{} cache driver can't address {}, skipping it", driver.name(), key);
        return false;
    }
    tracing::warn!(
        "{} cache driver failed, continuing in memory: {}",
        driver.name(),
        error
    );
    *driver = Box::new(InMemoryDriver::new());
    true
}

async fn read_container(
    driver: &mut Box<dyn CacheDriver>,
    network: NetworkId,
    account: &Address,
) -> Container {
    match driver.get_keyed_item(network, account).await {
        Ok(container) => container,
        Err(e) => {
            if fall_back(driver, e) {
                driver
                    .get_keyed_item(network, account)
                    .await
                    .unwrap_or_default()
            } else {
                Container::new()
            }
        }
    }
}

async fn write_container(
    driver: &mut Box<dyn CacheDriver>,
    network: NetworkId,
    account: &Address,
    container: Container,
) {
    if let Err(e) = driver
        .save_keyed_item(network, account, container.clone())
        .await
    {
        if fall_back(driver, e) {
            let _ = driver.save_keyed_item(network, account, container).await;
        }
    }
}

/// Shallow merge at the sub-type level.
///
/// If both the existing entry and `value` are objects their fields are
/// merged, otherwise `value` replaces the entry.
pub(crate) fn merge_sub_type(
    container: &mut Container,
    kind: &str,
    sub_type: &str,
    value: Option<Value>,
) {
    let entry = container
        .entry(kind.to_string())
        .or_insert_with(|| Value::Object(Container::new()));
    if !entry.is_object() {
        *entry = Value::Object(Container::new());
    }
    let Value::Object(siblings) = entry else {
        return;
    };

    match value {
        None => {
            siblings.remove(sub_type);
        }
        Some(Value::Object(fields)) => match siblings.get_mut(sub_type) {
            Some(Value::Object(existing)) => existing.extend(fields),
            _ => {
                siblings.insert(sub_type.to_string(), Value::Object(fields));
            }
        },
        Some(other) => {
            siblings.insert(sub_type.to_string(), other);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use macro_rules_attr::apply;
    use proptest::prelude::*;
    use serde_json::json;
    use test_strategy::proptest;
    use tracing_test::traced_test;

    use super::*;
    use crate::cache::storage::FileStorage;
    use crate::cache::storage::MemoryStorage;
    use crate::tests::shared::unit_test_data_directory;
    use crate::tests::shared::BrokenStorage;
    use crate::tests::shared::FlakyStorage;
    use crate::tests::shared_tokio_runtime;

    fn me() -> Address {
        Address::new("0xME")
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn put_then_get_returns_value() {
        let cache = CacheStore::in_memory();
        cache
            .put(NetworkId::MAIN, &me(), "keys", Some(json!({ "a": 1 })))
            .await;

        assert_eq!(
            Some(json!({ "a": 1 })),
            cache.get(NetworkId::MAIN, &me(), "keys").await
        );

        // other networks and accounts are separate namespaces
        assert_eq!(None, cache.get(NetworkId::DEV, &me(), "keys").await);
        assert_eq!(None, cache.get(NetworkId::MAIN, &Address::null(), "keys").await);
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn values_survive_restart_on_same_medium() {
        let medium = MemoryStorage::new();
        {
            let cache = CacheStore::new(medium.clone()).await;
            assert_eq!("storage", cache.driver_name().await);
            cache
                .put(NetworkId::MAIN, &me(), "transactions", Some(json!({ "0x1": {} })))
                .await;
            cache.set_account(Some(&me())).await;
            cache.set_network(NetworkId::RINKEBY).await;
        }

        let restarted = CacheStore::new(medium).await;
        assert_eq!(
            Some(json!({ "0x1": {} })),
            restarted.get(NetworkId::MAIN, &me(), "transactions").await
        );
        assert_eq!(Some(me()), restarted.get_account().await);
        assert_eq!(Some(NetworkId::RINKEBY), restarted.get_network().await);
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn values_survive_restart_on_disk() {
        let dir = unit_test_data_directory();
        {
            let cache = CacheStore::new(FileStorage::new(&dir)).await;
            cache
                .put(NetworkId::DEV, &me(), "keys", Some(json!({ "0xlock": { "expiration": 5 } })))
                .await;
        }
        let restarted = CacheStore::new(FileStorage::new(&dir)).await;
        assert_eq!(
            Some(json!({ "0xlock": { "expiration": 5 } })),
            restarted.get(NetworkId::DEV, &me(), "keys").await
        );
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn putting_none_deletes_the_type() {
        let cache = CacheStore::in_memory();
        cache.put(NetworkId::MAIN, &me(), "keys", Some(json!(1))).await;
        cache.put(NetworkId::MAIN, &me(), "locks", Some(json!(2))).await;
        cache.put(NetworkId::MAIN, &me(), "keys", None).await;

        let container = cache.get_container(NetworkId::MAIN, &me()).await;
        assert!(!container.contains_key("keys"));
        assert_eq!(Some(&json!(2)), container.get("locks"));
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn merge_keeps_siblings_and_deletes_only_target() {
        let cache = CacheStore::in_memory();
        let null = Address::null();
        cache
            .merge(NetworkId::MAIN, &null, "locks", "0xa", Some(json!({ "name": "A" })))
            .await;
        cache
            .merge(NetworkId::MAIN, &null, "locks", "0xb", Some(json!({ "name": "B" })))
            .await;
        cache
            .merge(NetworkId::MAIN, &null, "locks", "0xa", Some(json!({ "keyPrice": "1" })))
            .await;

        assert_eq!(
            Some(json!({
                "0xa": { "name": "A", "keyPrice": "1" },
                "0xb": { "name": "B" },
            })),
            cache.get(NetworkId::MAIN, &null, "locks").await
        );

        cache.merge(NetworkId::MAIN, &null, "locks", "0xa", None).await;
        assert_eq!(
            Some(json!({ "0xb": { "name": "B" } })),
            cache.get(NetworkId::MAIN, &null, "locks").await
        );
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn clear_one_type_or_everything() {
        let cache = CacheStore::in_memory();
        cache.put(NetworkId::MAIN, &me(), "keys", Some(json!(1))).await;
        cache.put(NetworkId::MAIN, &me(), "locks", Some(json!(2))).await;

        cache.clear(NetworkId::MAIN, &me(), Some("keys")).await;
        assert_eq!(None, cache.get(NetworkId::MAIN, &me(), "keys").await);
        assert_eq!(Some(json!(2)), cache.get(NetworkId::MAIN, &me(), "locks").await);

        cache.clear(NetworkId::MAIN, &me(), None).await;
        assert!(cache.get_container(NetworkId::MAIN, &me()).await.is_empty());
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn incompatible_typed_value_is_a_miss() {
        let cache = CacheStore::in_memory();
        cache
            .put(NetworkId::MAIN, &me(), "keys", Some(json!("not a map")))
            .await;
        let keys: Option<BTreeMap<String, u64>> =
            cache.get_typed(NetworkId::MAIN, &me(), "keys").await;
        assert_eq!(None, keys);
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn unavailable_medium_falls_back_to_memory() {
        let cache = CacheStore::new(BrokenStorage).await;
        assert_eq!("memory", cache.driver_name().await);

        cache.put(NetworkId::MAIN, &me(), "keys", Some(json!(1))).await;
        assert_eq!(Some(json!(1)), cache.get(NetworkId::MAIN, &me(), "keys").await);
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn medium_failing_later_falls_back_to_memory() {
        let medium = FlakyStorage::default();
        let cache = CacheStore::new(medium.clone()).await;
        assert_eq!("storage", cache.driver_name().await);

        medium.break_now();
        cache.put(NetworkId::MAIN, &me(), "keys", Some(json!(1))).await;

        assert_eq!("memory", cache.driver_name().await);
        assert_eq!(Some(json!(1)), cache.get(NetworkId::MAIN, &me(), "keys").await);
        assert!(logs_contain("continuing in memory"));
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn unaddressable_account_fails_alone() {
        let dir = unit_test_data_directory();
        let cache = CacheStore::new(FileStorage::new(&dir)).await;
        let odd = Address::new("0xabc/..");

        cache.put(NetworkId::DEV, &odd, "keys", Some(json!(1))).await;
        assert_eq!(None, cache.get(NetworkId::DEV, &odd, "keys").await);
        cache.clear(NetworkId::DEV, &odd, None).await;
        assert!(logs_contain("skipping it"));
        assert_eq!("storage", cache.driver_name().await);

        cache.put(NetworkId::DEV, &me(), "keys", Some(json!(2))).await;
        let restarted = CacheStore::new(FileStorage::new(&dir)).await;
        assert_eq!(Some(json!(2)), restarted.get(NetworkId::DEV, &me(), "keys").await);
    }

    #[traced_test]
    #[apply(shared_tokio_runtime)]
    async fn account_can_be_unset() {
        let cache = CacheStore::in_memory();
        assert_eq!(None, cache.get_account().await);
        cache.set_account(Some(&me())).await;
        assert_eq!(Some(me()), cache.get_account().await);
        cache.set_account(None).await;
        assert_eq!(None, cache.get_account().await);
    }

    #[proptest]
    fn merge_never_touches_siblings(
        #[strategy(proptest::collection::btree_map("[a-f]{1,3}", any::<u32>(), 0..6))]
        siblings: BTreeMap<String, u32>,
        #[strategy("[g-z]{1,3}")] target: String,
        #[strategy(proptest::option::of(any::<u32>()))] value: Option<u32>,
    ) {
        let mut container = Container::new();
        let existing: Container = siblings
            .iter()
            .map(|(k, v)| (k.clone(), json!({ "v": v })))
            .collect();
        container.insert("locks".to_string(), Value::Object(existing.clone()));

        merge_sub_type(
            &mut container,
            "locks",
            &target,
            value.map(|v| json!({ "v": v })),
        );

        let Some(Value::Object(after)) = container.get("locks") else {
            return Err(TestCaseError::fail("locks is no longer an object"));
        };
        for (k, v) in &existing {
            prop_assert_eq!(Some(v), after.get(k));
        }
        prop_assert_eq!(value.map(|v| json!({ "v": v })), after.get(&target).cloned());
    }
}
