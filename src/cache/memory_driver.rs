use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use super::driver::CacheDriver;
use super::errors::StorageError;
use super::storage_id;
use super::Container;
use super::UnkeyedItem;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;

/// Holds everything for the lifetime of the process. Never fails.
#[derive(Debug, Default)]
pub struct InMemoryDriver {
    keyed: HashMap<String, Container>,
    unkeyed: HashMap<UnkeyedItem, Value>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheDriver for InMemoryDriver {
    async fn get_keyed_item(
        &self,
        network: NetworkId,
        account: &Address,
    ) -> Result<Container, StorageError> {
        Ok(self
            .keyed
            .get(&storage_id(network, account))
            .cloned()
            .unwrap_or_default())
    }

    async fn save_keyed_item(
        &mut self,
        network: NetworkId,
        account: &Address,
        container: Container,
    ) -> Result<(), StorageError> {
        self.keyed.insert(storage_id(network, account), container);
        Ok(())
    }

    async fn clear_keyed_item(
        &mut self,
        network: NetworkId,
        account: &Address,
    ) -> Result<(), StorageError> {
        self.keyed.remove(&storage_id(network, account));
        Ok(())
    }

    async fn get_unkeyed_item(&self, item: UnkeyedItem) -> Result<Option<Value>, StorageError> {
        Ok(self.unkeyed.get(&item).cloned())
    }

    async fn save_unkeyed_item(
        &mut self,
        item: UnkeyedItem,
        value: Option<Value>,
    ) -> Result<(), StorageError> {
        match value {
            Some(v) => self.unkeyed.insert(item, v),
            None => self.unkeyed.remove(&item),
        };
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
