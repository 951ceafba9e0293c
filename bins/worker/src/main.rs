//! Stockbook balance worker
//!
//! Runs the periodic stock balance recalculation against PostgreSQL until
//! interrupted with Ctrl-C.

use std::future::Future;
use std::io;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use stockbook_core::stock::{BalanceRefreshWorker, StockService, SystemClock};
use stockbook_db::{SeaStockStore, connect};
use stockbook_shared::{AppConfig, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.logging);

    // Connect to database
    let db = connect(&config.database).await?;
    info!(
        max_connections = config.database.max_connections,
        "Connected to database"
    );

    let service = StockService::new(
        Arc::new(SeaStockStore::new(db)),
        Arc::new(SystemClock),
        config.recalculation.clone(),
    );
    let worker = BalanceRefreshWorker::new(Arc::new(service), &config.recalculation);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on(tokio::signal::ctrl_c(), cancel.clone()));

    let stats = worker.run(cancel).await;
    info!(
        completed = stats.completed_runs,
        failed = stats.failed_runs,
        "Worker exited"
    );

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Cancels the worker once `signal` fires. A signal listener that fails to
/// install leaves the worker running.
async fn shutdown_on(signal: impl Future<Output = io::Result<()>>, cancel: CancellationToken) {
    match signal.await {
        Ok(()) => {
            info!("Shutdown requested");
            cancel.cancel();
        }
        Err(err) => warn!(error = %err, "Failed to listen for Ctrl-C, worker keeps running"),
    }
}
