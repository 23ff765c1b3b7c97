use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Identifier of the chain a wallet is connected to.
///
/// The cache namespace and every transaction record carry one of these, so
/// switching networks never mixes keys or purchases of two chains.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct NetworkId(pub u64);

impl NetworkId {
    /// Main net.
    pub const MAIN: NetworkId = NetworkId(1);

    /// Ropsten test network.
    pub const ROPSTEN: NetworkId = NetworkId(3);

    /// Rinkeby test network.
    pub const RINKEBY: NetworkId = NetworkId(4);

    /// Kovan test network.
    pub const KOVAN: NetworkId = NetworkId(42);

    /// Local development chain, as started by the integration environment.
    pub const DEV: NetworkId = NetworkId(1984);

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for NetworkId {
    fn default() -> Self {
        Self::MAIN
    }
}

impl From<u64> for NetworkId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NetworkId {
    type Err = String;
    fn from_str(input: &str) -> Result<NetworkId, Self::Err> {
        match input {
            "main" | "mainnet" => Ok(Self::MAIN),
            "ropsten" => Ok(Self::ROPSTEN),
            "rinkeby" => Ok(Self::RINKEBY),
            "kovan" => Ok(Self::KOVAN),
            "dev" => Ok(Self::DEV),
            other => other
                .parse::<u64>()
                .map(NetworkId)
                .map_err(|_| format!("Failed to parse {} as network", input)),
        }
    }
}
