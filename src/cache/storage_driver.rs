use async_trait::async_trait;
use serde_json::Value;

use super::driver::CacheDriver;
use super::errors::StorageError;
use super::storage::StorageMedium;
use super::storage_id;
use super::Container;
use super::UnkeyedItem;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;

const CHECK_KEY: &str = "__unlockProtocol.check";

/// Stores each container as JSON text under its storage id.
#[derive(Debug)]
pub struct StorageDriver<M: StorageMedium> {
    medium: M,
}

impl<M: StorageMedium> StorageDriver<M> {
    pub fn new(medium: M) -> Self {
        Self { medium }
    }

    /// true if a value can be written, read back and removed.
    pub async fn is_available(&self) -> bool {
        match self.round_trip().await {
            Ok(()) => true,
            Err(e) => {
                tracing::info!("storage medium unavailable: {}", e);
                false
            }
        }
    }

    async fn round_trip(&self) -> Result<(), StorageError> {
        self.medium.set(CHECK_KEY, CHECK_KEY).await?;
        let read_back = self.medium.get(CHECK_KEY).await?;
        self.medium.remove(CHECK_KEY).await?;
        match read_back.as_deref() {
            Some(CHECK_KEY) => Ok(()),
            _ => Err(StorageError::Unavailable(
                "check value did not survive a round trip".to_string(),
            )),
        }
    }
}

#[async_trait]
impl<M: StorageMedium> CacheDriver for StorageDriver<M> {
    async fn get_keyed_item(
        &self,
        network: NetworkId,
        account: &Address,
    ) -> Result<Container, StorageError> {
        let id = storage_id(network, account);
        let Some(text) = self.medium.get(&id).await? else {
            return Ok(Container::new());
        };

        // corrupt or foreign data is a cache miss
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(container)) => Ok(container),
            Ok(_) => {
                tracing::debug!("cached container {} is not an object, ignoring it", id);
                Ok(Container::new())
            }
            Err(e) => {
                tracing::debug!("cached container {} is not valid JSON: {}", id, e);
                Ok(Container::new())
            }
        }
    }

    async fn save_keyed_item(
        &mut self,
        network: NetworkId,
        account: &Address,
        container: Container,
    ) -> Result<(), StorageError> {
        let text = serde_json::to_string(&container)?;
        self.medium.set(&storage_id(network, account), &text).await
    }

    async fn clear_keyed_item(
        &mut self,
        network: NetworkId,
        account: &Address,
    ) -> Result<(), StorageError> {
        self.medium.remove(&storage_id(network, account)).await
    }

    async fn get_unkeyed_item(&self, item: UnkeyedItem) -> Result<Option<Value>, StorageError> {
        let text = self.medium.get(&item.storage_key()).await?;

        // values written by other tools may be bare strings rather than JSON
        Ok(text.map(|t| serde_json::from_str(&t).unwrap_or(Value::String(t))))
    }

    async fn save_unkeyed_item(
        &mut self,
        item: UnkeyedItem,
        value: Option<Value>,
    ) -> Result<(), StorageError> {
        match value {
            Some(v) => {
                let text = serde_json::to_string(&v)?;
                self.medium.set(&item.storage_key(), &text).await
            }
            None => self.medium.remove(&item.storage_key()).await,
        }
    }

    fn name(&self) -> &'static str {
        "storage"
    }
}

#[cfg(test)]
mod tests {
    use macro_rules_attr::apply;
    use serde_json::json;

    use super::*;
    use crate::cache::storage::MemoryStorage;
    use crate::tests::shared::BrokenStorage;
    use crate::tests::shared_tokio_runtime;

    #[apply(shared_tokio_runtime)]
    async fn invalid_json_is_an_empty_container() {
        let medium = MemoryStorage::new();
        let account = Address::new("0xME");
        medium
            .set(&storage_id(NetworkId::MAIN, &account), "{not json")
            .await
            .unwrap();
        medium
            .set(&storage_id(NetworkId::DEV, &account), "[1,2,3]")
            .await
            .unwrap();

        let driver = StorageDriver::new(medium);
        assert!(driver
            .get_keyed_item(NetworkId::MAIN, &account)
            .await
            .unwrap()
            .is_empty());
        assert!(driver
            .get_keyed_item(NetworkId::DEV, &account)
            .await
            .unwrap()
            .is_empty());
    }

    #[apply(shared_tokio_runtime)]
    async fn bare_string_unkeyed_items_are_read() {
        let medium = MemoryStorage::new();
        medium
            .set(&UnkeyedItem::Account.storage_key(), "0xabc")
            .await
            .unwrap();
        let mut driver = StorageDriver::new(medium);

        assert_eq!(
            Some(json!("0xabc")),
            driver.get_unkeyed_item(UnkeyedItem::Account).await.unwrap()
        );

        driver
            .save_unkeyed_item(UnkeyedItem::Network, Some(json!(4)))
            .await
            .unwrap();
        assert_eq!(
            Some(json!(4)),
            driver.get_unkeyed_item(UnkeyedItem::Network).await.unwrap()
        );
    }

    #[apply(shared_tokio_runtime)]
    async fn availability_check_detects_broken_medium() {
        assert!(StorageDriver::new(MemoryStorage::new()).is_available().await);
        assert!(!StorageDriver::new(BrokenStorage).is_available().await);
    }
}
