//! SQLite-backed candle store
//!
//! One row per (symbol, interval, bucket). Merges run inside an
//! IMMEDIATE transaction, so concurrent writers serialize on SQLite's
//! write lock and the read-modify-write is never split.

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{CandleStore, StoreError};
use crate::types::{Candle, CandleKey};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS candles (
    symbol TEXT NOT NULL,
    interval_secs INTEGER NOT NULL,
    bucket_start INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (symbol, interval_secs, bucket_start)
);
"#;

/// Candle store over a pooled SQLite database file
#[derive(Clone)]
pub struct SqliteCandleStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCandleStore {
    /// Open (or create) the database at `path` and ensure the schema
    pub fn open(path: impl AsRef<Path>, pool_size: u32) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Task(format!("create data dir: {e}")))?;
            }
        }

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
        });
        let pool = Pool::builder().max_size(pool_size.max(1)).build(manager)?;

        let conn = pool.get()?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "Candle store ready");
        Ok(Self { pool })
    }

    fn merge_blocking(
        pool: &Pool<SqliteConnectionManager>,
        key: &CandleKey,
        mid: f64,
    ) -> Result<Candle, StoreError> {
        let mut conn = pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<Candle> = tx
            .query_row(
                "SELECT open, high, low, close, volume FROM candles
                 WHERE symbol = ?1 AND interval_secs = ?2 AND bucket_start = ?3",
                params![key.symbol, key.interval_secs, key.bucket_start],
                Self::row_to_candle,
            )
            .optional()?;

        let mut candle = existing.unwrap_or_else(|| Candle::seed(mid));
        candle.merge(mid);

        tx.execute(
            "INSERT INTO candles (symbol, interval_secs, bucket_start, open, high, low, close, volume)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (symbol, interval_secs, bucket_start) DO UPDATE SET
                 open = excluded.open,
                 high = excluded.high,
                 low = excluded.low,
                 close = excluded.close,
                 volume = excluded.volume",
            params![
                key.symbol,
                key.interval_secs,
                key.bucket_start,
                candle.open,
                candle.high,
                candle.low,
                candle.close,
                candle.volume,
            ],
        )?;

        tx.commit()?;
        Ok(candle)
    }

    fn scan_blocking(
        pool: &Pool<SqliteConnectionManager>,
        symbol: &str,
        interval_secs: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<(i64, Candle)>, StoreError> {
        let conn = pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT bucket_start, open, high, low, close, volume FROM candles
             WHERE symbol = ?1 AND interval_secs = ?2 AND bucket_start BETWEEN ?3 AND ?4
             ORDER BY bucket_start ASC",
        )?;

        let rows = stmt
            .query_map(params![symbol, interval_secs, from, to], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    Candle {
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                    },
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn row_to_candle(row: &rusqlite::Row<'_>) -> rusqlite::Result<Candle> {
        Ok(Candle {
            open: row.get(0)?,
            high: row.get(1)?,
            low: row.get(2)?,
            close: row.get(3)?,
            volume: row.get(4)?,
        })
    }
}

#[async_trait]
impl CandleStore for SqliteCandleStore {
    async fn upsert_merge(&self, key: CandleKey, mid: f64) -> Result<Candle, StoreError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || Self::merge_blocking(&pool, &key, mid))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn range_scan(
        &self,
        symbol: &str,
        interval_secs: i64,
        from: i64,
        to: i64,
    ) -> Result<Vec<(i64, Candle)>, StoreError> {
        let pool = self.pool.clone();
        let symbol = symbol.to_string();
        tokio::task::spawn_blocking(move || {
            Self::scan_blocking(&pool, &symbol, interval_secs, from, to)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
