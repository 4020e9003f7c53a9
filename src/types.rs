//! Core types used throughout midstream
//!
//! Defines the canonical quote, interval definitions and OHLCV candles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized bid/ask quote as carried on the quote channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Internal instrument symbol (e.g. "BTC-USD")
    pub symbol: String,
    /// Best bid price
    pub bid: f64,
    /// Best ask price
    pub ask: f64,
    /// Event time in unix seconds
    pub timestamp: i64,
}

impl Quote {
    /// Mid price, recomputed deterministically from bid and ask
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }
}

/// One configured aggregation interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalDef {
    /// Identifier used by the query API (e.g. "1m")
    pub id: String,
    /// Interval length in seconds
    pub seconds: i64,
}

impl fmt::Display for IntervalDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}s)", self.id, self.seconds)
    }
}

/// Align a timestamp down to the start of its interval bucket.
///
/// The result is a multiple of `interval_secs` with
/// `bucket_start <= timestamp < bucket_start + interval_secs`.
pub fn bucket_start(timestamp: i64, interval_secs: i64) -> i64 {
    (timestamp / interval_secs) * interval_secs
}

/// Unique identity of one persisted candle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleKey {
    pub symbol: String,
    pub interval_secs: i64,
    /// Interval-aligned bucket start in unix seconds
    pub bucket_start: i64,
}

impl CandleKey {
    /// Build the key for the bucket a timestamp falls into
    pub fn for_timestamp(symbol: &str, interval_secs: i64, timestamp: i64) -> Self {
        Self {
            symbol: symbol.to_string(),
            interval_secs,
            bucket_start: bucket_start(timestamp, interval_secs),
        }
    }
}

impl fmt::Display for CandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s@{}", self.symbol, self.interval_secs, self.bucket_start)
    }
}

/// OHLCV state of one bucket
///
/// `volume` counts merged quotes, not traded size; the feed carries no
/// traded quantity. `open` and `close` follow merge arrival order, which
/// under at-least-once delivery is not necessarily timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    /// Fresh candle before any quote has merged into it
    pub fn seed(mid: f64) -> Self {
        Self {
            open: mid,
            high: mid,
            low: mid,
            close: mid,
            volume: 0,
        }
    }

    /// Merge one mid price into this candle
    pub fn merge(&mut self, mid: f64) {
        self.high = self.high.max(mid);
        self.low = self.low.min(mid);
        self.close = mid;
        self.volume += 1;
    }

    /// Check the OHLC ordering invariants
    pub fn is_consistent(&self) -> bool {
        self.low <= self.high
            && self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high
    }
}
