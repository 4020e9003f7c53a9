//! Candle aggregation engine
//!
//! Consumes canonical quotes from the channel and merges each one into
//! every configured interval through the store's atomic upsert. The
//! engine is stateless: the store is the sole source of truth.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::channel::QuoteSubscriber;
use crate::store::CandleStore;
use crate::types::{CandleKey, IntervalDef, Quote};

/// Merge counters for logging and diagnostics
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    pub merged: u64,
    pub failed: u64,
}

/// Stateless aggregation engine over a shared candle store
pub struct AggregationEngine {
    store: Arc<dyn CandleStore>,
    intervals: Vec<IntervalDef>,
    merged: AtomicU64,
    failed: AtomicU64,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn CandleStore>, intervals: Vec<IntervalDef>) -> Self {
        Self {
            store,
            intervals,
            merged: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Merge one quote into every configured interval.
    ///
    /// Interval merges are independent: a failed merge is logged and
    /// dropped without blocking the remaining intervals, and no retry is
    /// queued. Duplicate deliveries merge again by design.
    pub async fn on_quote(&self, quote: &Quote) {
        let mid = quote.mid();

        for def in &self.intervals {
            let key = CandleKey::for_timestamp(&quote.symbol, def.seconds, quote.timestamp);
            let bucket = key.bucket_start;

            match self.store.upsert_merge(key, mid).await {
                Ok(candle) => {
                    self.merged.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        symbol = %quote.symbol,
                        interval = %def.id,
                        bucket = bucket,
                        close = candle.close,
                        volume = candle.volume,
                        "Merged quote into candle"
                    );
                }
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    error!(
                        symbol = %quote.symbol,
                        interval = %def.id,
                        bucket = bucket,
                        error = %e,
                        "Candle merge failed, dropping update"
                    );
                }
            }
        }
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            merged: self.merged.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Drain the quote channel until it closes; on shutdown, buffered
/// quotes are merged before the worker exits
pub async fn run_worker(
    id: usize,
    engine: Arc<AggregationEngine>,
    subscriber: QuoteSubscriber,
    shutdown: CancellationToken,
) {
    info!(worker = id, "Aggregation worker started");

    loop {
        let quote = tokio::select! {
            _ = shutdown.cancelled() => break,
            quote = subscriber.recv() => match quote {
                Some(quote) => quote,
                None => break,
            },
        };

        engine.on_quote(&quote).await;
    }

    // On shutdown the collectors exit on the same token and drop their
    // publishers, closing the channel; quotes they already published
    // still get merged before the worker exits.
    if shutdown.is_cancelled() {
        while let Some(quote) = subscriber.recv().await {
            engine.on_quote(&quote).await;
        }
    }

    let stats = engine.stats();
    info!(
        worker = id,
        merged = stats.merged,
        failed = stats.failed,
        "Aggregation worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::quote_channel;
    use crate::store::StoreError;
    use crate::types::Candle;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store double that records merges and can fail one interval
    struct RecordingStore {
        fail_interval: Option<i64>,
        keys: Mutex<Vec<CandleKey>>,
    }

    impl RecordingStore {
        fn new(fail_interval: Option<i64>) -> Self {
            Self {
                fail_interval,
                keys: Mutex::new(Vec::new()),
            }
        }

        fn recorded(&self) -> Vec<CandleKey> {
            self.keys.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CandleStore for RecordingStore {
        async fn upsert_merge(&self, key: CandleKey, mid: f64) -> Result<Candle, StoreError> {
            if self.fail_interval == Some(key.interval_secs) {
                return Err(StoreError::Task("injected failure".to_string()));
            }
            self.keys.lock().unwrap().push(key);
            let mut candle = Candle::seed(mid);
            candle.merge(mid);
            Ok(candle)
        }

        async fn range_scan(
            &self,
            _symbol: &str,
            _interval_secs: i64,
            _from: i64,
            _to: i64,
        ) -> Result<Vec<(i64, Candle)>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn intervals() -> Vec<IntervalDef> {
        vec![
            IntervalDef {
                id: "1m".to_string(),
                seconds: 60,
            },
            IntervalDef {
                id: "5m".to_string(),
                seconds: 300,
            },
        ]
    }

    fn make_quote(symbol: &str, bid: f64, ask: f64, timestamp: i64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            bid,
            ask,
            timestamp,
        }
    }

    #[tokio::test]
    async fn test_quote_merges_into_every_interval() {
        let store = Arc::new(RecordingStore::new(None));
        let engine = AggregationEngine::new(store.clone(), intervals());

        engine
            .on_quote(&make_quote("BTCUSD", 100.0, 102.0, 1_700_000_060))
            .await;

        let keys = store.recorded();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].interval_secs, 60);
        assert_eq!(keys[0].bucket_start, 1_700_000_040);
        assert_eq!(keys[1].interval_secs, 300);
        assert_eq!(keys[1].bucket_start, 1_699_999_800);

        let stats = engine.stats();
        assert_eq!(stats.merged, 2);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn test_failed_interval_does_not_block_others() {
        let store = Arc::new(RecordingStore::new(Some(60)));
        let engine = AggregationEngine::new(store.clone(), intervals());

        engine
            .on_quote(&make_quote("BTCUSD", 100.0, 102.0, 1_700_000_060))
            .await;

        // The 1m merge failed; the 5m merge still went through.
        let keys = store.recorded();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].interval_secs, 300);

        let stats = engine.stats();
        assert_eq!(stats.merged, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_worker_drains_channel_until_close() {
        let store = Arc::new(RecordingStore::new(None));
        let engine = Arc::new(AggregationEngine::new(store.clone(), intervals()));
        let (publisher, subscriber) = quote_channel(16);
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(run_worker(0, engine.clone(), subscriber, shutdown));

        publisher.publish(make_quote("BTCUSD", 100.0, 102.0, 1_700_000_060));
        publisher.publish(make_quote("BTCUSD", 101.0, 103.0, 1_700_000_061));
        drop(publisher);

        worker.await.unwrap();
        assert_eq!(store.recorded().len(), 4);
        assert_eq!(engine.stats().merged, 4);
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let store = Arc::new(RecordingStore::new(None));
        let engine = Arc::new(AggregationEngine::new(store, intervals()));
        let (publisher, subscriber) = quote_channel(16);
        let shutdown = CancellationToken::new();

        let worker = tokio::spawn(run_worker(0, engine, subscriber, shutdown.clone()));
        shutdown.cancel();
        drop(publisher);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_drains_buffered_quotes_on_shutdown() {
        let store = Arc::new(RecordingStore::new(None));
        let engine = Arc::new(AggregationEngine::new(store.clone(), intervals()));
        let (publisher, subscriber) = quote_channel(16);
        let shutdown = CancellationToken::new();

        // Quotes buffered before the shutdown fires must still be merged.
        for i in 0..5 {
            publisher.publish(make_quote("BTCUSD", 100.0, 102.0, 1_700_000_000 + i));
        }
        shutdown.cancel();
        drop(publisher);

        let worker = tokio::spawn(run_worker(0, engine.clone(), subscriber, shutdown));
        worker.await.unwrap();

        assert_eq!(store.recorded().len(), 10);
        assert_eq!(engine.stats().merged, 10);
    }
}
