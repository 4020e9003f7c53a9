//! Candle storage
//!
//! The store exclusively owns persisted candle state; the engine holds
//! nothing across calls. Every merge is an atomic read-modify-write
//! against the store, which serializes concurrent writers per key.

mod sqlite;

pub use sqlite::SqliteCandleStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Candle, CandleKey};

/// Storage failures surfaced to the engine and the query service.
///
/// All variants are transient from the caller's perspective: the engine
/// drops the affected merge, the query service returns an error result.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Keyed candle storage consumed by the engine and the query service
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Atomically merge one mid price into the candle for `key`.
    ///
    /// Seeds a fresh candle when the key is absent, then applies the
    /// OHLCV merge. Two concurrent merges on the same key must not lose
    /// an update. Returns the candle state after the merge.
    async fn upsert_merge(&self, key: CandleKey, mid: f64) -> Result<Candle, StoreError>;

    /// Candles with bucket start in `[from, to]`, ascending by bucket start
    async fn range_scan(
        &self,
        symbol: &str,
        interval_secs: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<(i64, Candle)>, StoreError>;
}
