use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;

use super::constants::DEFAULT_LOCKSMITH_HOST;
use super::constants::DEFAULT_REQUIRED_CONFIRMATIONS;
use super::network::NetworkId;
use crate::models::address::Address;

/// Declarative specification of command-line arguments
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct Args {
    /// The data directory that contains the cache files.
    ///
    /// If not supplied, the platform's data directory is used, e.g.
    /// ~/.local/share/paywall-sync/<network> on Linux.
    #[clap(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Network id, or one of `main`, `ropsten`, `rinkeby`, `kovan`, `dev`.
    #[clap(long, short, default_value = "main")]
    pub network: NetworkId,

    /// Base url of the locksmith history index.
    #[clap(long, default_value = DEFAULT_LOCKSMITH_HOST)]
    pub locksmith_host: String,

    /// Confirmations after which a mined purchase is considered final.
    #[clap(long, default_value_t = DEFAULT_REQUIRED_CONFIRMATIONS)]
    pub required_confirmations: u64,

    /// Paywall configuration (JSON) listing the watched locks.
    #[clap(long, value_name = "FILE")]
    pub paywall_config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the cached container of an account, or a single type of it.
    Show {
        /// Account whose data to print. Defaults to the null account, which
        /// holds public lock data.
        #[clap(long)]
        account: Option<Address>,

        /// e.g. `keys`, `transactions`, `locks`.
        #[clap(long = "type")]
        kind: Option<String>,
    },

    /// Clear the cached container of an account, or a single type of it.
    Clear {
        #[clap(long)]
        account: Address,

        #[clap(long = "type")]
        kind: Option<String>,
    },

    /// Query the history index for the purchases of an account.
    History {
        #[clap(long)]
        account: Address,

        /// Lock address to filter on. May be repeated. Defaults to the locks
        /// of the paywall configuration.
        #[clap(long)]
        lock: Vec<Address>,
    },
}

impl Default for Args {
    fn default() -> Self {
        let empty: Vec<String> = vec![];
        Self::parse_from(empty)
    }
}
