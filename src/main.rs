//! midstream - streaming bid/ask to OHLCV candle aggregation service
//!
//! Wires the collectors, the quote channel, the aggregation workers and
//! the history query API together, and shuts them down gracefully.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use midstream::api::{self, ApiState};
use midstream::channel;
use midstream::collector;
use midstream::config::AppConfig;
use midstream::engine::{self, AggregationEngine};
use midstream::store::{CandleStore, SqliteCandleStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    info!(config = %config.digest(), "🚀 midstream starting");

    let store: Arc<dyn CandleStore> = Arc::new(
        SqliteCandleStore::open(&config.database.path, config.database.pool_size)
            .context("Failed to open candle store")?,
    );

    let shutdown = CancellationToken::new();
    let (publisher, subscriber) = channel::quote_channel(config.channel.capacity);

    let collector_handles = collector::spawn_collectors(&config, &publisher, &shutdown);
    if collector_handles.is_empty() {
        warn!("No feeds enabled; only the query API will be served");
    }
    // Collectors hold their own clones; dropping ours closes the channel
    // once every collector has stopped.
    drop(publisher);

    let engine = Arc::new(AggregationEngine::new(
        store.clone(),
        config.intervals.clone(),
    ));
    let mut worker_handles = Vec::new();
    for id in 0..config.engine.workers.max(1) {
        worker_handles.push(tokio::spawn(engine::run_worker(
            id,
            engine.clone(),
            subscriber.clone(),
            shutdown.clone(),
        )));
    }

    let api_state = ApiState {
        store,
        intervals: config.intervals.clone(),
    };
    let mut api_handle = tokio::spawn(api::start_server(
        api_state,
        config.api.host.clone(),
        config.api.port,
        shutdown.clone(),
    ));

    let mut api_finished = false;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, stopping...");
        }
        result = &mut api_handle => {
            api_finished = true;
            match result {
                Ok(Ok(())) => warn!("API server exited before shutdown"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task panicked"),
            }
        }
    }

    shutdown.cancel();

    for handle in collector_handles {
        let _ = handle.await;
    }
    for handle in worker_handles {
        let _ = handle.await;
    }
    if !api_finished {
        match api_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "API server exited with error"),
            Err(e) => error!(error = %e, "API server task panicked"),
        }
    }

    let stats = engine.stats();
    info!(
        merged = stats.merged,
        failed = stats.failed,
        "midstream stopped"
    );
    Ok(())
}
