use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// The account used for values that are not specific to any user, such as
/// public lock metadata.
pub const NULL_ACCOUNT: &str = "0x0000000000000000000000000000000000000000";

/// An account or contract address in normal form (lower case).
///
/// All lookups into `values.keys`, `values.locks` and the cache go through
/// this type, so two spellings of the same checksummed address can never
/// end up as two entries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(address.as_ref().trim().to_lowercase())
    }

    pub fn null() -> Self {
        Self(NULL_ACCOUNT.to_string())
    }

    pub fn is_null(&self) -> bool {
        self.0 == NULL_ACCOUNT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

impl FromStr for Address {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("empty address".to_string());
        }
        Ok(Self::new(trimmed))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_are_lower_cased() {
        let a = Address::new("0xAaAdEED4c0B861cB36f4cE006a9C90BA2E43fdc2");
        assert_eq!("0xaaadeed4c0b861cb36f4ce006a9c90ba2e43fdc2", a.as_str());
        assert_eq!(a, Address::from("0xaaadeed4c0b861cb36f4ce006a9c90ba2e43fdc2"));
    }

    #[test]
    fn deserialization_normalizes() {
        let a: Address = serde_json::from_str("\"0xABC\"").unwrap();
        assert_eq!("0xabc", a.as_str());
    }

    #[test]
    fn null_account_is_null() {
        assert!(Address::null().is_null());
        assert!(!Address::new("0x1").is_null());
    }
}
