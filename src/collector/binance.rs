//! Binance bookTicker feed
//!
//! One WebSocket subscription per symbol. On failure or close the feed
//! waits a fixed delay and reconnects forever; there is no exponential
//! backoff and no retry cap for these long-lived streams.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::normalizer;
use crate::channel::QuotePublisher;
use crate::config::FeedMapping;

/// Live bookTicker subscription for one symbol
pub struct BinanceFeed {
    ws_base: String,
    mapping: FeedMapping,
    reconnect_delay: Duration,
}

impl BinanceFeed {
    pub fn new(ws_base: String, mapping: FeedMapping, reconnect_delay_secs: u64) -> Self {
        Self {
            ws_base,
            mapping,
            // Floor the delay so a zero config value cannot hot-loop reconnects.
            reconnect_delay: Duration::from_secs(reconnect_delay_secs.max(1)),
        }
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/{}@bookTicker",
            self.ws_base,
            self.mapping.upstream.to_lowercase()
        )
    }

    /// Connect, normalize and publish until shutdown is requested.
    ///
    /// Both the socket read and the reconnect sleep race the shutdown
    /// token, so the task exits promptly mid-backoff.
    pub async fn run(self, publisher: QuotePublisher, shutdown: CancellationToken) {
        let url = self.stream_url();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            info!(symbol = %self.mapping.internal, url = %url, "Connecting to Binance bookTicker stream...");

            let connect = tokio::select! {
                _ = shutdown.cancelled() => break,
                connect = connect_async(&url) => connect,
            };

            match connect {
                Ok((ws_stream, _)) => {
                    info!(symbol = %self.mapping.internal, "✅ Connected to Binance");
                    let (mut write, mut read) = ws_stream.split();

                    loop {
                        let message = tokio::select! {
                            _ = shutdown.cancelled() => break,
                            message = read.next() => message,
                        };

                        match message {
                            Some(Ok(Message::Text(text))) => {
                                match normalizer::normalize_book_ticker(&text, &self.mapping.internal) {
                                    Some(quote) => publisher.publish(quote),
                                    None => {
                                        debug!(symbol = %self.mapping.internal, "Skipping partial book ticker")
                                    }
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) => {
                                warn!(symbol = %self.mapping.internal, "Connection closed by server");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(symbol = %self.mapping.internal, error = %e, "WebSocket error");
                                break;
                            }
                            None => {
                                warn!(symbol = %self.mapping.internal, "Stream ended");
                                break;
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => {
                    warn!(symbol = %self.mapping.internal, error = %e, "Connection failed");
                }
            }

            if shutdown.is_cancelled() {
                break;
            }

            warn!(
                symbol = %self.mapping.internal,
                delay_secs = self.reconnect_delay.as_secs(),
                "🔄 Reconnecting after delay..."
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        info!(symbol = %self.mapping.internal, "Binance feed stopped");
    }
}
