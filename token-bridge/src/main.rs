//! token bridge
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use token_bridge::bridge::TokenBridge;
use token_bridge::chain_client::EvmChainClient;
use token_bridge::config::{self, BridgeConfig, Cli};
use token_bridge::mesh_ledger::InMemoryMeshLedger;
use token_bridge::uptime::{HttpUptimeProvider, UptimeFn, UptimeProvider, Uptimes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger with fallback to info if RUST_LOG is not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    info!("🚀 Starting Token Bridge...");

    let config = BridgeConfig::from_cli(cli).await?;

    info!("🔵 Connecting to {}", config.rpc_url);
    let client = Arc::new(EvmChainClient::new(
        config.rpc_url.clone(),
        config.contract_address,
        config.signer.clone(),
        config.chain_id,
        config.confirmations,
    ));

    let bridge = TokenBridge::new(
        client,
        InMemoryMeshLedger::new().shared(),
        config.submitter_settings(),
    );

    if let Some(path) = &config.address_map {
        let mappings = config::load_address_map(path).await?;
        bridge.register_all(&mappings).await?;
    }

    let uptime: Box<dyn UptimeProvider> = match &config.uptime_url {
        Some(url) => {
            info!("🔵 Reading uptimes from {}", url);
            Box::new(HttpUptimeProvider::new(url.clone()))
        }
        None => {
            warn!("⚠️ No UPTIME_URL configured, epoch rewards will not be distributed");
            Box::new(UptimeFn(Uptimes::new))
        }
    };

    let synced = bridge.submitter().sync_all_balances().await;
    info!("🟢 Reconciled {} balances with the chain", synced);

    let mut ingestion = bridge.ingestion_loop(config.poll_interval);
    let ingestion_stop = ingestion.stop_handle();
    let ingestion_task = tokio::spawn(async move { ingestion.start().await });

    let scheduler = bridge.scheduler(uptime, config.scheduler_interval);
    let scheduler_stop = scheduler.stop_handle();
    let scheduler_task = tokio::spawn(async move { scheduler.start().await });

    info!("🟢 Token bridge running, press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
    }

    info!("🟡 Shutting down...");
    ingestion_stop.stop();
    scheduler_stop.stop();
    ingestion_task.await?;
    scheduler_task.await?;

    info!("Token bridge stopped");
    Ok(())
}
