use async_trait::async_trait;
use serde_json::Value;

use super::errors::StorageError;
use super::Container;
use super::UnkeyedItem;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;

/// The seam between [super::CacheStore] and whatever holds the bytes.
///
/// A driver only moves whole containers; merging and deletion of types
/// happen in the store.
#[async_trait]
pub trait CacheDriver: Send + Sync + std::fmt::Debug {
    /// the container for `account` on `network`. A missing container is
    /// empty.
    async fn get_keyed_item(
        &self,
        network: NetworkId,
        account: &Address,
    ) -> Result<Container, StorageError>;

    async fn save_keyed_item(
        &mut self,
        network: NetworkId,
        account: &Address,
        container: Container,
    ) -> Result<(), StorageError>;

    async fn clear_keyed_item(
        &mut self,
        network: NetworkId,
        account: &Address,
    ) -> Result<(), StorageError>;

    async fn get_unkeyed_item(&self, item: UnkeyedItem) -> Result<Option<Value>, StorageError>;

    /// `None` removes the item.
    async fn save_unkeyed_item(
        &mut self,
        item: UnkeyedItem,
        value: Option<Value>,
    ) -> Result<(), StorageError>;

    /// short name used in log messages.
    fn name(&self) -> &'static str;
}
