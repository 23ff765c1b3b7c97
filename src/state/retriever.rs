//! Retrieval of a user's past purchases.
//!
//! The history index (locksmith) knows which transactions an account sent to
//! which locks, but not their on-chain state. [retrieve_transactions] asks
//! it for descriptors, then looks each one up through the [ChainReader]
//! concurrently. A failed lookup costs only its own transaction.

use anyhow::Context;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde::Serialize;

use super::chain_reader::ChainReader;
use super::errors::ErrorEmitter;
use super::errors::SyncError;
use crate::config_models::network::NetworkId;
use crate::models::address::Address;
use crate::models::transaction::Transaction;
use crate::models::transaction::TransactionDefaults;

/// A transaction descriptor as stored by the history index.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalTransaction {
    pub transaction_hash: String,

    pub chain: NetworkId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,

    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl From<&HistoricalTransaction> for TransactionDefaults {
    fn from(h: &HistoricalTransaction) -> Self {
        Self {
            hash: h.transaction_hash.clone(),
            network: Some(h.chain),
            to: h.recipient.clone(),
            from: h.sender.clone(),
            beneficiary: h.beneficiary.clone(),
            input: h.data.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Option<Vec<serde_json::Value>>,
}

impl TransactionsResponse {
    // each entry is decoded on its own; a malformed one is dropped.
    fn descriptors(self) -> Vec<HistoricalTransaction> {
        self.transactions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| match serde_json::from_value(entry) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    tracing::debug!("ignoring malformed transaction descriptor: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// The REST history index.
#[async_trait]
pub trait HistoryIndex: Send + Sync {
    /// descriptors of the transactions `account` sent to any of `locks`.
    async fn fetch_transactions(
        &self,
        account: &Address,
        locks: &[Address],
    ) -> Result<Vec<HistoricalTransaction>>;

    /// records a freshly sent transaction.
    async fn store_transaction(&self, transaction: &HistoricalTransaction) -> Result<()>;
}

/// [HistoryIndex] over HTTP.
#[derive(Debug, Clone)]
pub struct LocksmithClient {
    client: reqwest::Client,
    host: String,
}

impl LocksmithClient {
    pub fn new(host: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("paywall-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("could not build http client")?;
        let host: String = host.into();
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    fn transactions_request(
        &self,
        account: &Address,
        locks: &[Address],
    ) -> reqwest::Result<reqwest::Request> {
        let query = std::iter::once(("for", account.as_str()))
            .chain(locks.iter().map(|lock| ("recipient[]", lock.as_str())))
            .collect::<Vec<_>>();
        self.client
            .get(format!("{}/transactions", self.host))
            .query(&query)
            .build()
    }
}

#[async_trait]
impl HistoryIndex for LocksmithClient {
    async fn fetch_transactions(
        &self,
        account: &Address,
        locks: &[Address],
    ) -> Result<Vec<HistoricalTransaction>> {
        let request = self.transactions_request(account, locks)?;
        tracing::debug!("fetching transaction history: {}", request.url());

        let response: TransactionsResponse = self
            .client
            .execute(request)
            .await?
            .error_for_status()?
            .json()
            .await
            .context("history index returned malformed transactions")?;
        Ok(response.descriptors())
    }

    async fn store_transaction(&self, transaction: &HistoricalTransaction) -> Result<()> {
        self.client
            .post(format!("{}/transaction", self.host))
            .json(transaction)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Historical transactions of `account` on `network` for `locks`, with
/// their on-chain details filled in.
///
/// Without an account, or without locks, nothing is fetched. A failed
/// fetch, and each failed lookup, is reported through `errors` once;
/// whatever succeeded is returned.
pub async fn retrieve_transactions(
    account: Option<&Address>,
    network: NetworkId,
    locks: &[Address],
    history: &dyn HistoryIndex,
    chain: &dyn ChainReader,
    errors: &ErrorEmitter,
) -> Vec<Transaction> {
    let Some(account) = account else {
        return vec![];
    };
    if locks.is_empty() {
        return vec![];
    }

    let descriptors = match history.fetch_transactions(account, locks).await {
        Ok(d) => d,
        Err(e) => {
            errors.emit(SyncError::HistoryIndex(format!("{:#}", e)));
            return vec![];
        }
    };

    let lookups = descriptors
        .iter()
        .filter(|d| d.chain == network)
        .map(TransactionDefaults::from)
        .map(|defaults| async move {
            // without input data the type of the transaction can't be
            // parsed from the defaults, so the reader must derive it
            let known = defaults.input.as_ref().map(|_| &defaults);
            let result = chain.get_transaction(&defaults.hash, known).await;
            (defaults, result)
        });

    let mut transactions = vec![];
    for (defaults, result) in join_all(lookups).await {
        match result {
            Ok(patch) => {
                let mut transaction = Transaction::from(&defaults);
                transaction.apply(&patch);
                transactions.push(transaction);
            }
            Err(e) => errors.emit(SyncError::TransactionLookup {
                hash: defaults.hash.clone(),
                reason: format!("{:#}", e),
            }),
        }
    }
    tracing::debug!(
        "retrieved {} of {} historical transactions for {}",
        transactions.len(),
        descriptors.len(),
        account
    );
    transactions
}
