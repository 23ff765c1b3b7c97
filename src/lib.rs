#![deny(clippy::shadow_unrelated)]
//
// If code coverage tool `cargo-llvm-cov` is running with the nightly toolchain,
// enable the unstable “coverage” attribute, so `#[cfg(test)]` modules can be
// excluded with `#[cfg_attr(coverage_nightly, coverage(off))]`.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod cache;
pub mod config_models;
pub mod models;
pub mod state;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
pub mod tests;

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;

use crate::cache::storage::FileStorage;
use crate::cache::CacheStore;
use crate::config_models::cli_args;
use crate::config_models::constants::Constants;
use crate::config_models::data_directory::DataDirectory;
use crate::config_models::paywall_config::PaywallConfig;
use crate::state::chain_reader::ChainReader;
use crate::state::event_source::EventSource;
use crate::state::reconciler::EventReconciler;
use crate::state::reconciler::ReconcilerHandle;
use crate::state::retriever::LocksmithClient;

/// Opens the on-disk cache for `args`, creating the data directory if
/// needed. A cache directory that can't be written to is replaced by memory.
pub async fn open_cache(args: &cli_args::Args) -> Result<CacheStore> {
    let data_directory = DataDirectory::get(args.data_dir.clone(), args.network)?;
    DataDirectory::create_dir_if_not_exists(&data_directory.cache_dir_path())?;
    tracing::info!("Cache directory is {}", data_directory.cache_dir_path().display());

    Ok(CacheStore::new(FileStorage::new(data_directory.cache_dir_path())).await)
}

/// Wires a reconciler to the locksmith history index and `chain`, and runs
/// it on a new task until `source` closes.
pub async fn start_reconciler(
    args: &cli_args::Args,
    chain: Arc<dyn ChainReader>,
    source: Arc<dyn EventSource>,
) -> Result<(JoinHandle<()>, ReconcilerHandle)> {
    let config = match &args.paywall_config {
        Some(path) => PaywallConfig::load(path)?,
        None => PaywallConfig::default(),
    };
    let constants = Constants::from(args);
    let cache = Arc::new(open_cache(args).await?);
    let history = Arc::new(LocksmithClient::new(constants.locksmith_host.clone())?);

    let (reconciler, handle) =
        EventReconciler::new(config, constants, cache, chain, history, source.clone());
    let task = reconciler.spawn(source.as_ref());
    Ok((task, handle))
}
