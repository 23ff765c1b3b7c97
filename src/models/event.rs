//! The closed set of events the wallet and chain-reading services emit.
//!
//! Embedders usually receive events as `(name, subject, payload)` triples of
//! JSON values from a semi-trusted source. [ChainEvent::from_raw] turns such
//! triples into typed events; anything it does not recognise, or anything
//! missing a required field, yields `None` and is dropped.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use super::address::Address;
use super::key::KeyUpdate;
use super::lock::LockPatch;
use super::transaction::TransactionPatch;
use super::transaction::TransactionStatus;
use super::transaction::TransactionType;
use crate::config_models::network::NetworkId;

/// account fields carried by `account.updated`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletError {
    PurchaseFailed,
    Other(String),
}

impl std::fmt::Display for WalletError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PurchaseFailed => write!(f, "FAILED_TO_PURCHASE_KEY"),
            Self::Other(message) => write!(f, "{}", message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainEvent {
    /// the wallet's selected account. `None` when the user signed out.
    AccountChanged(Option<Address>),

    NetworkChanged(NetworkId),

    AccountUpdated {
        address: Option<Address>,
        update: AccountUpdate,
    },

    KeyUpdated {
        id: String,
        key: KeyUpdate,
    },

    TransactionUpdated {
        hash: String,
        update: TransactionPatch,
    },

    LockUpdated {
        address: Address,
        update: LockPatch,
    },

    /// a purchase was dispatched to the wallet; no hash is known yet.
    PurchaseSubmitted {
        lock: Address,
        owner: Address,
        input: Option<String>,
    },

    /// the wallet learned the hash of a transaction it sent.
    TransactionNew {
        hash: String,
        from: Address,
        to: Address,
        input: Option<String>,
        kind: TransactionType,
        status: TransactionStatus,
    },

    Error(WalletError),
}

impl ChainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountChanged(_) => "account.changed",
            Self::NetworkChanged(_) => "network.changed",
            Self::AccountUpdated { .. } => "account.updated",
            Self::KeyUpdated { .. } => "key.updated",
            Self::TransactionUpdated { .. } => "transaction.updated",
            Self::LockUpdated { .. } => "lock.updated",
            Self::PurchaseSubmitted { .. } => "purchase.submitted",
            Self::TransactionNew { .. } => "transaction.new",
            Self::Error(_) => "error",
        }
    }

    /// builds a typed event from an untyped `(name, subject, payload)` triple.
    pub fn from_raw(name: &str, subject: &Value, payload: &Value) -> Option<Self> {
        let event = match name {
            "account.changed" => Self::AccountChanged(optional_address(subject)?),
            "network.changed" => Self::NetworkChanged(parse(subject)?),
            "account.updated" => Self::AccountUpdated {
                address: optional_address(subject.get("address").unwrap_or(subject))?,
                update: parse(payload)?,
            },
            "key.updated" => Self::KeyUpdated {
                id: subject.as_str().unwrap_or_default().to_string(),
                key: parse(payload)?,
            },
            "transaction.updated" => Self::TransactionUpdated {
                hash: subject.as_str()?.to_string(),
                update: parse(payload)?,
            },
            "lock.updated" => Self::LockUpdated {
                address: parse(subject)?,
                update: parse(payload)?,
            },
            "purchase.submitted" => Self::PurchaseSubmitted {
                lock: parse(subject)?,
                owner: parse(payload.get("owner")?)?,
                input: payload.get("input").and_then(|v| v.as_str()).map(str::to_string),
            },
            "transaction.new" => Self::TransactionNew {
                hash: subject.as_str()?.to_string(),
                from: parse(payload.get("from")?)?,
                to: parse(payload.get("to")?)?,
                input: payload.get("input").and_then(|v| v.as_str()).map(str::to_string),
                kind: parse(payload.get("type")?)?,
                status: parse(payload.get("status")?)?,
            },
            "error" => {
                let message = subject
                    .get("message")
                    .and_then(|m| m.as_str())
                    .or_else(|| subject.as_str())?;
                if message == WalletError::PurchaseFailed.to_string() {
                    Self::Error(WalletError::PurchaseFailed)
                } else {
                    Self::Error(WalletError::Other(message.to_string()))
                }
            }
            other => {
                tracing::trace!("ignoring unknown event {}", other);
                return None;
            }
        };
        Some(event)
    }
}

fn parse<T: DeserializeOwned>(value: &Value) -> Option<T> {
    match serde_json::from_value(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::trace!("ignoring malformed event field: {}", e);
            None
        }
    }
}

// null, or the null account, means "no account"; anything else must be an
// address string.
fn optional_address(value: &Value) -> Option<Option<Address>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) if !s.is_empty() => {
            Some(Some(Address::new(s)).filter(|a| !a.is_null()))
        }
        _ => None,
    }
}
