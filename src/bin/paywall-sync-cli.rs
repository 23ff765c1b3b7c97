use std::process;

use anyhow::Result;
use clap::Parser;
use paywall_sync::cache::CacheStore;
use paywall_sync::config_models::cli_args;
use paywall_sync::config_models::cli_args::Command;
use paywall_sync::config_models::paywall_config::PaywallConfig;
use paywall_sync::models::address::Address;
use paywall_sync::state::retriever::HistoryIndex;
use paywall_sync::state::retriever::LocksmithClient;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

pub fn main() -> Result<()> {
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("Could not create tokio runtime");

    let run_result = tokio_runtime.block_on(async {
        // Fetch the CLI arguments
        let args = cli_args::Args::parse();
        set_up_logger();

        run(args).await
    });

    tokio_runtime.shutdown_timeout(tokio::time::Duration::from_secs(10));

    if let Err(e) = run_result {
        eprintln!("{:#}", e);
        process::exit(1);
    }
    Ok(())
}

async fn run(args: cli_args::Args) -> Result<()> {
    let cache = paywall_sync::open_cache(&args).await?;

    match args.command.clone() {
        None => {
            println!("cache driver: {}", cache.driver_name().await);
            println!(
                "account: {}",
                cache
                    .get_account()
                    .await
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "<none>".to_string())
            );
            println!(
                "network: {}",
                cache
                    .get_network()
                    .await
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "<none>".to_string())
            );
        }
        Some(Command::Show { account, kind }) => {
            show(&cache, &args, &account.unwrap_or_else(Address::null), kind).await?
        }
        Some(Command::Clear { account, kind }) => {
            cache.clear(args.network, &account, kind.as_deref()).await;
            tracing::info!("cleared {} for {}", kind.as_deref().unwrap_or("everything"), account);
        }
        Some(Command::History { account, lock }) => {
            let locks = if !lock.is_empty() {
                lock
            } else if let Some(path) = &args.paywall_config {
                PaywallConfig::load(path)?.lock_addresses()
            } else {
                anyhow::bail!("no --lock given and no --paywall-config to take locks from");
            };
            let client = LocksmithClient::new(args.locksmith_host.clone())?;
            let transactions = client.fetch_transactions(&account, &locks).await?;
            println!("{}", serde_json::to_string_pretty(&transactions)?);
        }
    }
    Ok(())
}

async fn show(
    cache: &CacheStore,
    args: &cli_args::Args,
    account: &Address,
    kind: Option<String>,
) -> Result<()> {
    let value = match kind {
        Some(kind) => cache
            .get(args.network, account, &kind)
            .await
            .unwrap_or(Value::Null),
        None => Value::Object(cache.get_container(args.network, account).await),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Configure logger to use ISO-8601, of which rfc3339 is a subset. Install
/// global collector configured based on RUST_LOG env var. Logs go to stderr
/// so command output stays parseable.
fn set_up_logger() {
    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .with_thread_ids(true)
            .finish(),
    )
    .map_err(|_err| eprintln!("Unable to set global default subscriber"))
    .expect("Failed to set trace subscriber");
}
