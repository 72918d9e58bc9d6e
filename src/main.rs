use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use blockmirror::api;
use blockmirror::config::load_config;
use blockmirror::core::Indexer;
use blockmirror::runtime::store::RocksBlockStore;
use blockmirror::upstream::ChainClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = load_config()?;
    let store = Arc::new(
        RocksBlockStore::open(&cfg.db_path)
            .with_context(|| format!("failed to open block store at {}", cfg.db_path))?,
    );
    info!(path = %cfg.db_path, est_rows = store.estimated_count()?, "[store] opened");

    let client = Arc::new(ChainClient::new(&cfg.rpc_url, &cfg.rest_url, cfg.upstream_timeout())?);
    let indexer = Arc::new(Indexer::new(client, store, cfg.indexer_config()));

    let addr = cfg.api_addr();
    let api_state = indexer.clone();
    tokio::spawn(async move {
        if let Err(e) = api::run(addr, api_state).await {
            error!(error = ?e, "[api] server error");
        }
    });
    info!(%addr, "[api] listening");

    let backfill = if cfg.view_only {
        info!("[mode] view-only enabled: backfill is disabled; serving existing data only");
        None
    } else {
        info!(
            min_height = cfg.min_height,
            max_height = cfg.max_height,
            concurrency = cfg.concurrency,
            "[indexer] starting backfill"
        );
        Some(indexer.spawn_backfill_loop(cfg.min_height, cfg.max_height, cfg.pass_delay()))
    };

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("[indexer] shutting down, draining pending writes");
    if let Some(handle) = backfill {
        handle.abort();
        let _ = handle.await;
    }
    indexer.shutdown().await;
    Ok(())
}
