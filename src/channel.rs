//! Bounded quote channel between collectors and the aggregation engine
//!
//! Publishers never block: a full channel drops the quote and logs it,
//! so one slow consumer cannot stall the feeds. Workers share the single
//! receiver, so each quote is delivered to exactly one of them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver};
use tokio::sync::Mutex;
use tracing::warn;

use crate::types::Quote;

/// Create a bounded quote channel with the given capacity
pub fn quote_channel(capacity: usize) -> (QuotePublisher, QuoteSubscriber) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let publisher = QuotePublisher {
        tx,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    let subscriber = QuoteSubscriber {
        rx: Arc::new(Mutex::new(rx)),
    };
    (publisher, subscriber)
}

/// Producing side of the quote channel
#[derive(Clone)]
pub struct QuotePublisher {
    tx: mpsc::Sender<Quote>,
    dropped: Arc<AtomicU64>,
}

impl QuotePublisher {
    /// Publish a quote without blocking.
    ///
    /// A full or closed channel drops the quote; the affected bucket
    /// loses precision but the feed keeps running.
    pub fn publish(&self, quote: Quote) {
        match self.tx.try_send(quote) {
            Ok(()) => {}
            Err(TrySendError::Full(quote)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    symbol = %quote.symbol,
                    dropped_total = dropped,
                    "Quote channel full, dropping quote"
                );
            }
            Err(TrySendError::Closed(quote)) => {
                warn!(symbol = %quote.symbol, "Quote channel closed, dropping quote");
            }
        }
    }

    /// Quotes dropped because the channel was full
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consuming side of the quote channel, shared by the engine workers
#[derive(Clone)]
pub struct QuoteSubscriber {
    rx: Arc<Mutex<Receiver<Quote>>>,
}

impl QuoteSubscriber {
    /// Receive the next quote; `None` once the channel is closed and drained
    pub async fn recv(&self) -> Option<Quote> {
        self.rx.lock().await.recv().await
    }
}
