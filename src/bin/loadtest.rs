//! Concurrent load harness for the history query API
//!
//! Usage: cargo run --bin loadtest
//!
//! Fires a fixed range query at /history from many concurrent workers,
//! then reports throughput and latency percentiles and exits.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use midstream::api::HistoryResponse;

#[derive(Debug, Clone, Deserialize)]
struct LoadTestConfig {
    base_url: String,
    threads: usize,
    requests_per_thread: usize,
    symbol: String,
    interval: String,
    from: i64,
    to: i64,
}

impl LoadTestConfig {
    /// Load configuration from file and environment (LOADTEST_*)
    fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("base_url", "http://localhost:8080")?
            .set_default("threads", 10)?
            .set_default("requests_per_thread", 100)?
            .set_default("symbol", "BTC-USD")?
            .set_default("interval", "1m")?
            .set_default("from", 1_764_470_000)?
            .set_default("to", 1_764_480_000)?
            .add_source(File::with_name("config/loadtest").required(false))
            .add_source(Environment::with_prefix("LOADTEST").separator("__"))
            .build()
            .context("Failed to build load test configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize load test configuration")
    }

    fn history_url(&self) -> String {
        format!(
            "{}/history?symbol={}&interval={}&from={}&to={}",
            self.base_url, self.symbol, self.interval, self.from, self.to
        )
    }
}

struct WorkerOutcome {
    latencies: Vec<Duration>,
    errors: Vec<String>,
}

async fn run_worker(client: reqwest::Client, url: String, requests: usize) -> WorkerOutcome {
    let mut latencies = Vec::with_capacity(requests);
    let mut errors = Vec::new();

    for _ in 0..requests {
        let started = Instant::now();
        let outcome = match client.get(&url).send().await {
            Ok(response) => match response.json::<HistoryResponse>().await {
                Ok(body) if body.s == "ok" => Ok(()),
                Ok(body) => Err(format!(
                    "Non-ok status: {} msg={}",
                    body.s,
                    body.message.unwrap_or_default()
                )),
                Err(e) => Err(format!("invalid response body: {e}")),
            },
            Err(e) => Err(e.to_string()),
        };

        // Failed requests count toward latency too; the harness measures
        // what the caller experienced, not just the happy path.
        latencies.push(started.elapsed());
        if let Err(message) = outcome {
            errors.push(message);
        }
    }

    WorkerOutcome { latencies, errors }
}

/// Linear-interpolated percentile over a sorted latency slice
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    match sorted.len() {
        0 => Duration::ZERO,
        1 => sorted[0],
        len => {
            let rank = p / 100.0 * (len - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            if lo == hi {
                return sorted[lo];
            }
            let weight = rank - lo as f64;
            let lo_s = sorted[lo].as_secs_f64();
            let hi_s = sorted[hi].as_secs_f64();
            Duration::from_secs_f64(lo_s + (hi_s - lo_s) * weight)
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = LoadTestConfig::load()?;
    let url = config.history_url();
    let total_planned = config.threads.max(1) * config.requests_per_thread;

    info!(
        threads = config.threads,
        requests_per_thread = config.requests_per_thread,
        url = %url,
        "🚀 Starting load test"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let started = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..config.threads.max(1) {
        handles.push(tokio::spawn(run_worker(
            client.clone(),
            url.clone(),
            config.requests_per_thread,
        )));
    }

    let mut latencies = Vec::with_capacity(total_planned);
    let mut errors = Vec::new();
    for handle in handles {
        let outcome = handle.await.context("Load worker panicked")?;
        latencies.extend(outcome.latencies);
        errors.extend(outcome.errors);
    }
    let elapsed = started.elapsed();

    latencies.sort();
    let total = latencies.len();

    info!("📊 LOAD TEST COMPLETE");
    info!("============================");
    info!(
        "Requests:   {} total, {} ok, {} failed",
        total,
        total - errors.len(),
        errors.len()
    );
    info!("Wall time:  {:.2}s", elapsed.as_secs_f64());
    info!(
        "Throughput: {:.1} req/s",
        total as f64 / elapsed.as_secs_f64().max(f64::MIN_POSITIVE)
    );

    if !latencies.is_empty() {
        let sum: Duration = latencies.iter().sum();
        let mean = sum / latencies.len() as u32;
        info!(
            "Latency:    min={:.2}ms mean={:.2}ms max={:.2}ms",
            millis(latencies[0]),
            millis(mean),
            millis(latencies[latencies.len() - 1])
        );
        info!(
            "Percentile: p50={:.2}ms p95={:.2}ms p99={:.2}ms",
            millis(percentile(&latencies, 50.0)),
            millis(percentile(&latencies, 95.0)),
            millis(percentile(&latencies, 99.0))
        );
    }

    if !errors.is_empty() {
        warn!(
            "There were {} errors during load test (showing up to 5):",
            errors.len()
        );
        for err in errors.iter().take(5) {
            warn!("  {}", err);
        }
        bail!("Load test finished with {} failed requests", errors.len());
    }

    info!("No errors encountered during load test.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations(millis: &[u64]) -> Vec<Duration> {
        millis.iter().map(|&m| Duration::from_millis(m)).collect()
    }

    #[test]
    fn test_percentile_interpolates_linearly() {
        let sorted = durations(&[10, 20, 30, 40, 50]);
        assert_eq!(percentile(&sorted, 0.0), Duration::from_millis(10));
        assert_eq!(percentile(&sorted, 50.0), Duration::from_millis(30));
        assert_eq!(percentile(&sorted, 100.0), Duration::from_millis(50));
        // p25 lands exactly on the second entry, no interpolation.
        assert_eq!(percentile(&sorted, 25.0), Duration::from_millis(20));
        // p90 sits 60% of the way from 40ms to 50ms.
        let p90 = percentile(&sorted, 90.0);
        assert!((p90.as_secs_f64() - 0.046).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_degenerate_inputs() {
        assert_eq!(percentile(&[], 99.0), Duration::ZERO);
        let one = durations(&[42]);
        assert_eq!(percentile(&one, 1.0), Duration::from_millis(42));
        assert_eq!(percentile(&one, 99.0), Duration::from_millis(42));
    }

    #[test]
    fn test_history_url() {
        let config = LoadTestConfig {
            base_url: "http://localhost:8080".to_string(),
            threads: 10,
            requests_per_thread: 100,
            symbol: "BTC-USD".to_string(),
            interval: "1m".to_string(),
            from: 1_764_470_000,
            to: 1_764_480_000,
        };
        assert_eq!(
            config.history_url(),
            "http://localhost:8080/history?symbol=BTC-USD&interval=1m&from=1764470000&to=1764480000"
        );
    }
}
