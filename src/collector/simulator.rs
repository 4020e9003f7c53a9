//! Synthetic quote feed
//!
//! Walks a geometric Brownian motion mid price per symbol and derives a
//! bid/ask spread around it, so the whole pipeline can run without
//! upstream connectivity. Each symbol draws a speed seed `k` at startup:
//! larger `k` means coarser steps published at a higher rate.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::QuotePublisher;
use crate::types::Quote;

const DRIFT: f64 = 0.1;
const VOLATILITY: f64 = 0.2;
/// Total bid/ask spread as a fraction of the mid, split evenly per side
const BASE_SPREAD: f64 = 0.0015;
const SPREAD_NOISE: f64 = 0.0001;

/// Random-walk feed for one simulated instrument
pub struct SimulatedFeed {
    symbol: String,
    price: f64,
    seed_range: u32,
}

impl SimulatedFeed {
    pub fn new(symbol: String, start_price: f64, seed_range: u32) -> Self {
        Self {
            symbol,
            price: start_price,
            seed_range: seed_range.max(1),
        }
    }

    /// Publish quotes until shutdown is requested
    pub async fn run(mut self, publisher: QuotePublisher, shutdown: CancellationToken) {
        let mut rng = StdRng::from_entropy();
        let k = rng.gen_range(1..=self.seed_range);
        let dt = f64::from(k) / 1000.0;
        let tick_interval = Duration::from_millis(u64::from(1000 / k).max(1));

        info!(
            symbol = %self.symbol,
            seed = k,
            tick_ms = tick_interval.as_millis() as u64,
            "Simulated feed started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(tick_interval) => {}
            }

            let z: f64 = rng.sample(StandardNormal);
            self.price = gbm_step(self.price, dt, z);

            let spread = self.price * (BASE_SPREAD + rng.gen_range(0.0..SPREAD_NOISE));
            publisher.publish(Quote {
                symbol: self.symbol.clone(),
                bid: round2(self.price - spread / 2.0),
                ask: round2(self.price + spread / 2.0),
                timestamp: chrono::Utc::now().timestamp(),
            });
        }

        info!(symbol = %self.symbol, "Simulated feed stopped");
    }
}

/// One geometric Brownian motion step with drawn noise `z ~ N(0, 1)`
fn gbm_step(price: f64, dt: f64, z: f64) -> f64 {
    price * ((DRIFT - VOLATILITY * VOLATILITY / 2.0) * dt + VOLATILITY * dt.sqrt() * z).exp()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbm_step_stays_positive() {
        let mut price = 50_000.0;
        for z in [-4.0, -1.0, 0.0, 1.0, 4.0, -4.0, -4.0] {
            price = gbm_step(price, 0.05, z);
            assert!(price > 0.0);
        }
    }

    #[test]
    fn test_gbm_step_direction_follows_noise() {
        let price = 100.0;
        assert!(gbm_step(price, 0.01, 2.0) > price);
        assert!(gbm_step(price, 0.01, -2.0) < price);
    }

    #[test]
    fn test_zero_noise_step_is_deterministic_drift() {
        let stepped = gbm_step(100.0, 0.01, 0.0);
        let expected = 100.0 * ((DRIFT - VOLATILITY * VOLATILITY / 2.0) * 0.01f64).exp();
        assert!((stepped - expected).abs() < 1e-12);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(100.456), 100.46);
        assert_eq!(round2(100.454), 100.45);
        assert_eq!(round2(100.0), 100.0);
    }

    #[test]
    fn test_spread_keeps_bid_below_ask() {
        let price = 50_000.0;
        let spread = price * BASE_SPREAD;
        let bid = round2(price - spread / 2.0);
        let ask = round2(price + spread / 2.0);
        assert!(bid < ask);
        // A 15 bps spread on 50k is 75.0, split evenly around the mid.
        assert_eq!(ask - bid, 75.0);
        assert_eq!((bid + ask) / 2.0, price);
    }

    #[tokio::test]
    async fn test_feed_publishes_then_honors_shutdown() {
        let (publisher, subscriber) = crate::channel::quote_channel(64);
        let feed = SimulatedFeed::new("BTC-USD".to_string(), 50_000.0, 1);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(feed.run(publisher, shutdown.clone()));

        // seed_range 1 forces k = 1, so ticks arrive every second at most;
        // wait for the first one.
        let quote = tokio::time::timeout(Duration::from_secs(5), subscriber.recv())
            .await
            .expect("no quote published")
            .expect("channel closed early");
        assert_eq!(quote.symbol, "BTC-USD");
        assert!(quote.bid < quote.ask);
        assert!(quote.timestamp > 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("feed did not honor shutdown")
            .unwrap();
    }
}
