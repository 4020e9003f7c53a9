//! Quote collectors
//!
//! One task per upstream subscription so a slow or broken stream cannot
//! block the others. Every variant publishes canonical quotes through
//! the same bounded channel.

pub mod binance;
pub mod normalizer;
pub mod simulator;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::QuotePublisher;
use crate::config::AppConfig;

/// Spawn every enabled feed; returns one handle per subscription
pub fn spawn_collectors(
    config: &AppConfig,
    publisher: &QuotePublisher,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    if config.binance.enabled {
        for mapping in &config.binance.symbols {
            let feed = binance::BinanceFeed::new(
                config.binance.ws_base.clone(),
                mapping.clone(),
                config.binance.reconnect_delay_secs,
            );
            handles.push(tokio::spawn(feed.run(publisher.clone(), shutdown.clone())));
        }
        info!(symbols = config.binance.symbols.len(), "Binance collectors spawned");
    }

    if config.simulator.enabled {
        for sim in &config.simulator.symbols {
            let feed = simulator::SimulatedFeed::new(
                sim.symbol.clone(),
                sim.start_price,
                config.simulator.seed_range,
            );
            handles.push(tokio::spawn(feed.run(publisher.clone(), shutdown.clone())));
        }
        info!(symbols = config.simulator.symbols.len(), "Simulator collectors spawned");
    }

    handles
}
