use clap::Parser;
use std::sync::Arc;
use tracing::info;

use fairgrid::api::handlers::AppState;
use fairgrid::api::ApiServer;
use fairgrid::config::ConfigLoader;
use fairgrid::engine::SettlementEngine;
use fairgrid::events::BroadcastPublisher;
use fairgrid::ledger::{BalanceLedger, MemoryLedger};
use fairgrid::store::{EngineStore, MemoryStore};
use fairgrid::verify::Auditor;

#[derive(Parser, Debug)]
#[command(name = "fairgrid", about = "Provably-fair grid game settlement engine")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the listen port from config.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fairgrid=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(port) = args.port {
        config.api.port = port;
    }

    let store: Arc<dyn EngineStore> = Arc::new(MemoryStore::new());
    let ledger: Arc<dyn BalanceLedger> = Arc::new(MemoryLedger::new());
    let events = Arc::new(BroadcastPublisher::new(config.engine.event_buffer_size));

    let engine = Arc::new(SettlementEngine::new(
        store.clone(),
        ledger.clone(),
        events,
        &config,
    ));
    let auditor = Auditor::new(store);

    info!(
        house_edge_factor = %config.game.house_edge_factor,
        min_bet = %config.game.min_bet,
        max_bet = %config.game.max_bet,
        "engine initialized"
    );

    let state = Arc::new(AppState {
        engine,
        auditor,
        ledger,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    ApiServer::new(config.api.clone(), state).run().await?;
    Ok(())
}
