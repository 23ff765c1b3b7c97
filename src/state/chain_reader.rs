use anyhow::Result;
use async_trait::async_trait;

use crate::models::address::Address;
use crate::models::key::KeyUpdate;
use crate::models::lock::LockPatch;
use crate::models::transaction::TransactionDefaults;
use crate::models::transaction::TransactionPatch;

/// Query interface of the chain-reading service.
///
/// Lookups return their result directly rather than through
/// `*.updated` events, so the reconciler can tell a stale response (one for
/// an account or network that is no longer current) from a fresh one.
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn get_lock(&self, lock: &Address) -> Result<LockPatch>;

    async fn get_key_by_lock_for_owner(&self, lock: &Address, owner: &Address)
        -> Result<KeyUpdate>;

    /// details of `hash`. `defaults` carries what is already known locally
    /// so the reader need not re-derive it.
    async fn get_transaction(
        &self,
        hash: &str,
        defaults: Option<&TransactionDefaults>,
    ) -> Result<TransactionPatch>;

    /// ether balance of `account`.
    async fn refresh_account_balance(&self, account: &Address) -> Result<String>;

    /// balance of `owner` in the ERC20 token at `contract`.
    async fn get_token_balance(&self, contract: &Address, owner: &Address) -> Result<String>;
}
