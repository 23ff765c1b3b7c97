use serde::Deserialize;
use serde::Serialize;

use super::address::Address;
use crate::config_models::network::NetworkId;

/// Block number recorded for a transaction that has not been mined yet.
///
/// This is `Number.MAX_SAFE_INTEGER` of the wallet services, kept as a
/// sentinel rather than an `Option` so that cached records written by the
/// wallet and the ordering of transactions stay compatible: sorting by block
/// number, newest first, always puts unmined work in front.
pub const UNMINED_BLOCK_NUMBER: u64 = (1 << 53) - 1;

/// status of a single transaction as reported by the wallet/chain services.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumIs,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Submitted,
    Pending,
    Mined,
    Failed,
}

impl TransactionStatus {
    /// position in the forward-only progression of a transaction.
    ///
    /// `Failed` is terminal and ranks with `Mined`: a failed transaction
    /// cannot go back to pending, and a mined one cannot fail.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::Pending => 1,
            Self::Mined | Self::Failed => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    KeyPurchase,
    LockCreation,
    Withdrawal,
    UpdateKeyPrice,
}

/// Identifier used for a purchase that has been dispatched but whose hash
/// is not known yet.
pub fn synthetic_hash(lock: &Address, account: &Address) -> String {
    format!("submitted-{}-{}", lock, account)
}

/// identifier linking a transaction to the key it purchases.
pub fn key_id(lock: &Address, owner: &Address) -> String {
    format!("{}-{}", lock, owner)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,

    /// account the purchase is made for. Usually the same as `from`.
    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionType>,

    #[serde(default)]
    pub confirmations: u64,

    #[serde(default = "unmined")]
    pub block_number: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkId>,
}

fn unmined() -> u64 {
    UNMINED_BLOCK_NUMBER
}

impl Transaction {
    /// a fresh record for `hash`, as created the first time any event
    /// mentions it.
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            from: None,
            to: None,
            beneficiary: None,
            lock: None,
            key: None,
            input: None,
            status: None,
            kind: None,
            confirmations: 0,
            block_number: UNMINED_BLOCK_NUMBER,
            network: None,
        }
    }

    /// the lock this transaction is addressed to.
    pub fn recipient(&self) -> Option<&Address> {
        self.lock.as_ref().or(self.to.as_ref())
    }

    /// the account a key purchase is made for.
    pub fn payer(&self) -> Option<&Address> {
        self.beneficiary.as_ref().or(self.from.as_ref())
    }

    pub fn is_mined(&self) -> bool {
        self.block_number != UNMINED_BLOCK_NUMBER
    }

    pub fn is_synthetic(&self) -> bool {
        self.hash.starts_with("submitted-")
    }

    pub fn is_key_purchase(&self) -> bool {
        self.kind == Some(TransactionType::KeyPurchase)
    }

    /// true if this transaction purchases the key of `owner` on `lock`.
    pub fn belongs_to(&self, lock: &Address, owner: &Address) -> bool {
        self.recipient() == Some(lock) && self.payer() == Some(owner)
    }

    /// overwrites every field the patch carries, keeping all others.
    pub fn apply(&mut self, patch: &TransactionPatch) {
        if let Some(from) = &patch.from {
            self.from = Some(from.clone());
        }
        if let Some(to) = &patch.to {
            self.to = Some(to.clone());
        }
        if let Some(beneficiary) = &patch.beneficiary {
            self.beneficiary = Some(beneficiary.clone());
        }
        if let Some(lock) = &patch.lock {
            self.lock = Some(lock.clone());
        }
        if let Some(key) = &patch.key {
            self.key = Some(key.clone());
        }
        if let Some(input) = &patch.input {
            self.input = Some(input.clone());
        }
        if let Some(status) = patch.status {
            self.status = Some(status);
        }
        if let Some(kind) = patch.kind {
            self.kind = Some(kind);
        }
        if let Some(confirmations) = patch.confirmations {
            self.confirmations = confirmations;
        }
        if let Some(block_number) = patch.block_number {
            self.block_number = block_number;
        }
        if let Some(network) = patch.network {
            self.network = Some(network);
        }
    }
}

/// A partial transaction as carried by `transaction.updated` events and
/// chain lookups. Absent fields leave the existing record untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,

    #[serde(rename = "for", default, skip_serializing_if = "Option::is_none")]
    pub beneficiary: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkId>,
}

impl From<&Transaction> for TransactionPatch {
    fn from(t: &Transaction) -> Self {
        Self {
            from: t.from.clone(),
            to: t.to.clone(),
            beneficiary: t.beneficiary.clone(),
            lock: t.lock.clone(),
            key: t.key.clone(),
            input: t.input.clone(),
            status: t.status,
            kind: t.kind,
            confirmations: Some(t.confirmations),
            block_number: Some(t.block_number),
            network: t.network,
        }
    }
}

/// What is known locally about a transaction before asking the chain
/// reader for its details.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDefaults {
    pub hash: String,
    pub network: Option<NetworkId>,
    pub to: Option<Address>,
    pub from: Option<Address>,
    #[serde(rename = "for")]
    pub beneficiary: Option<Address>,
    pub input: Option<String>,
}

impl From<&TransactionDefaults> for Transaction {
    fn from(d: &TransactionDefaults) -> Self {
        let mut t = Transaction::new(d.hash.clone());
        t.to = d.to.clone();
        t.lock = d.to.clone();
        t.from = d.from.clone();
        t.beneficiary = d.beneficiary.clone();
        t.input = d.input.clone();
        t.network = d.network;
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transactions_are_unmined() {
        let t = Transaction::new("0xhash");
        assert_eq!(UNMINED_BLOCK_NUMBER, t.block_number);
        assert_eq!(9_007_199_254_740_991, UNMINED_BLOCK_NUMBER);
        assert!(!t.is_mined());
    }

    #[test]
    fn patch_keeps_absent_fields() {
        let mut t = Transaction::new("0xhash");
        t.from = Some(Address::new("0xA"));
        t.input = Some("0xdata".to_string());

        t.apply(&TransactionPatch {
            confirmations: Some(4),
            block_number: Some(120),
            ..Default::default()
        });

        assert_eq!(Some(Address::new("0xa")), t.from);
        assert_eq!(Some("0xdata".to_string()), t.input);
        assert_eq!(4, t.confirmations);
        assert!(t.is_mined());
    }

    #[test]
    fn wire_names_match_wallet_services() {
        let json = serde_json::json!({
            "hash": "0x1",
            "for": "0xBEEF",
            "type": "KEY_PURCHASE",
            "status": "pending",
            "blockNumber": 12,
        });
        let t: Transaction = serde_json::from_value(json).unwrap();
        assert_eq!(Some(Address::new("0xbeef")), t.beneficiary);
        assert_eq!(Some(TransactionType::KeyPurchase), t.kind);
        assert_eq!(Some(TransactionStatus::Pending), t.status);
        assert_eq!(12, t.block_number);

        let missing_block: Transaction = serde_json::from_str(r#"{"hash":"0x2"}"#).unwrap();
        assert_eq!(UNMINED_BLOCK_NUMBER, missing_block.block_number);
    }

    #[test]
    fn synthetic_hash_is_recognised() {
        let lock = Address::new("0xLOCK");
        let account = Address::new("0xME");
        let t = Transaction::new(synthetic_hash(&lock, &account));
        assert_eq!("submitted-0xlock-0xme", t.hash);
        assert!(t.is_synthetic());
        assert!(!Transaction::new("0xabc").is_synthetic());
    }
}
