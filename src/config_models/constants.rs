use std::time::Duration;

use super::cli_args::Args;
use super::network::NetworkId;

pub const DEFAULT_LOCKSMITH_HOST: &str = "https://locksmith.unlock-protocol.com";
pub const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 12;

/// delay after a key's expiration before the view is re-propagated, so
/// the key is strictly in the past when its status is re-derived.
pub const KEY_EXPIRY_GRACE: Duration = Duration::from_secs(1);

/// Settings shared by the reconciler, the retriever and the trackers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Constants {
    /// base url of the history index, without trailing slash.
    pub locksmith_host: String,

    /// confirmations after which a mined purchase is final.
    pub required_confirmations: u64,

    /// network assumed until the wallet reports one.
    pub default_network: NetworkId,
}

impl Constants {
    pub fn new(
        locksmith_host: impl Into<String>,
        required_confirmations: u64,
        default_network: NetworkId,
    ) -> Self {
        let host: String = locksmith_host.into();
        Self {
            locksmith_host: host.trim_end_matches('/').to_string(),
            required_confirmations,
            default_network,
        }
    }
}

impl Default for Constants {
    fn default() -> Self {
        Self::new(
            DEFAULT_LOCKSMITH_HOST,
            DEFAULT_REQUIRED_CONFIRMATIONS,
            NetworkId::default(),
        )
    }
}

impl From<&Args> for Constants {
    fn from(args: &Args) -> Self {
        Self::new(
            args.locksmith_host.clone(),
            args.required_confirmations,
            args.network,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let c = Constants::new("http://fun.times/", 3, NetworkId::DEV);
        assert_eq!("http://fun.times", c.locksmith_host);
    }
}
