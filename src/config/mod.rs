//! Configuration management for midstream
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;

use crate::types::IntervalDef;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    /// Aggregation intervals shared by the engine and the query API
    #[serde(default = "default_intervals")]
    pub intervals: Vec<IntervalDef>,
    pub channel: ChannelConfig,
    pub engine: EngineConfig,
    pub binance: BinanceConfig,
    pub simulator: SimulatorConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite candle database
    pub path: String,
    /// Maximum pooled connections
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Quote channel capacity; publishers drop on overflow instead of blocking
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of aggregation workers draining the quote channel
    pub workers: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
    /// Enable the live Binance bookTicker feed
    pub enabled: bool,
    /// WebSocket base URL
    pub ws_base: String,
    /// Fixed delay between reconnect attempts in seconds (floored at 1)
    pub reconnect_delay_secs: u64,
    /// Upstream symbols and the internal symbols they publish as
    #[serde(default = "default_binance_symbols")]
    pub symbols: Vec<FeedMapping>,
}

/// Upstream exchange symbol mapped to an internal symbol alias
#[derive(Debug, Clone, Deserialize)]
pub struct FeedMapping {
    /// Exchange symbol (e.g. "BTCUSDT")
    pub upstream: String,
    /// Internal symbol quotes are published under (e.g. "BTC-USD")
    pub internal: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    /// Enable the synthetic random-walk feed
    pub enabled: bool,
    /// Upper bound of the per-symbol speed seed (drawn from 1..=seed_range)
    pub seed_range: u32,
    /// Simulated instruments
    #[serde(default = "default_simulator_symbols")]
    pub symbols: Vec<SimSymbol>,
}

/// One simulated instrument
#[derive(Debug, Clone, Deserialize)]
pub struct SimSymbol {
    /// Internal symbol quotes are published under
    pub symbol: String,
    /// Starting mid price of the walk
    pub start_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

fn default_intervals() -> Vec<IntervalDef> {
    vec![
        IntervalDef {
            id: "1m".to_string(),
            seconds: 60,
        },
        IntervalDef {
            id: "5m".to_string(),
            seconds: 300,
        },
        IntervalDef {
            id: "1h".to_string(),
            seconds: 3600,
        },
    ]
}

fn default_binance_symbols() -> Vec<FeedMapping> {
    vec![FeedMapping {
        upstream: "BTCUSDT".to_string(),
        internal: "BTC-USD".to_string(),
    }]
}

fn default_simulator_symbols() -> Vec<SimSymbol> {
    vec![SimSymbol {
        symbol: "BTC-USD".to_string(),
        start_price: 50_000.0,
    }]
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Database defaults
            .set_default("database.path", "data/midstream.db")?
            .set_default("database.pool_size", 8)?
            // Channel / engine defaults
            .set_default("channel.capacity", 1024)?
            .set_default("engine.workers", 1)?
            // Binance feed defaults
            .set_default("binance.enabled", false)?
            .set_default("binance.ws_base", "wss://stream.binance.com:9443/ws")?
            .set_default("binance.reconnect_delay_secs", 5)?
            // Simulator defaults
            .set_default("simulator.enabled", true)?
            .set_default("simulator.seed_range", 50)?
            // Query API defaults
            .set_default("api.host", "0.0.0.0")?
            .set_default("api.port", 8080)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (MIDSTREAM_*)
            .add_source(Environment::with_prefix("MIDSTREAM").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Reject configurations the pipeline cannot run with.
    ///
    /// Bad interval definitions are a startup error, never a merge-time one.
    pub fn validate(&self) -> Result<()> {
        if self.intervals.is_empty() {
            bail!("At least one aggregation interval must be configured");
        }

        let mut seen = HashSet::new();
        for def in &self.intervals {
            if def.seconds <= 0 {
                bail!(
                    "Interval '{}' has non-positive length: {}",
                    def.id,
                    def.seconds
                );
            }
            if !seen.insert(def.id.as_str()) {
                bail!("Duplicate interval id: {}", def.id);
            }
        }

        Ok(())
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        let intervals: Vec<&str> = self.intervals.iter().map(|d| d.id.as_str()).collect();
        format!(
            "db={} intervals={:?} binance={} simulator={} workers={} api={}:{}",
            self.database.path,
            intervals,
            self.binance.enabled,
            self.simulator.enabled,
            self.engine.workers,
            self.api.host,
            self.api.port
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
