//! Book ticker normalization
//!
//! Converts a raw upstream payload into a canonical quote addressed to
//! the configured internal symbol.

use crate::types::Quote;

/// Extract a canonical quote from a Binance bookTicker payload.
///
/// Best bid `"b"` and best ask `"a"` arrive as decimal strings; a tick
/// missing either is partial and returns `None` (not an error). Prices
/// that parse but are not finite are dropped the same way. Event time
/// `"T"` is in milliseconds and converts to whole seconds; when absent,
/// the ingestion wall clock is used instead.
pub fn normalize_book_ticker(text: &str, internal_symbol: &str) -> Option<Quote> {
    let payload: serde_json::Value = serde_json::from_str(text).ok()?;

    let bid: f64 = payload["b"].as_str()?.parse().ok()?;
    let ask: f64 = payload["a"].as_str()?.parse().ok()?;
    // "NaN" and "inf" parse as f64; neither makes a usable price.
    if !bid.is_finite() || !ask.is_finite() {
        return None;
    }

    let timestamp = payload["T"]
        .as_i64()
        .map(|ms| ms / 1000)
        .unwrap_or_else(|| chrono::Utc::now().timestamp());

    Some(Quote {
        symbol: internal_symbol.to_string(),
        bid,
        ask,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_full_payload() {
        let text = r#"{"u":400900217,"s":"BTCUSDT","b":"100.0","B":"31.2","a":"102.0","A":"40.6","T":1700000060123}"#;
        let quote = normalize_book_ticker(text, "BTC-USD").unwrap();

        assert_eq!(quote.symbol, "BTC-USD");
        assert_eq!(quote.bid, 100.0);
        assert_eq!(quote.ask, 102.0);
        assert_eq!(quote.timestamp, 1_700_000_060);
        assert_eq!(quote.mid(), 101.0);
    }

    #[test]
    fn test_drops_partial_ticks() {
        let missing_bid = r#"{"s":"BTCUSDT","a":"102.0","T":1700000060123}"#;
        assert!(normalize_book_ticker(missing_bid, "BTC-USD").is_none());

        let missing_ask = r#"{"s":"BTCUSDT","b":"100.0","T":1700000060123}"#;
        assert!(normalize_book_ticker(missing_ask, "BTC-USD").is_none());
    }

    #[test]
    fn test_drops_unparsable_prices() {
        let text = r#"{"s":"BTCUSDT","b":"not-a-number","a":"102.0","T":1700000060123}"#;
        assert!(normalize_book_ticker(text, "BTC-USD").is_none());
    }

    #[test]
    fn test_drops_non_finite_prices() {
        let nan_bid = r#"{"s":"BTCUSDT","b":"NaN","a":"102.0","T":1700000060123}"#;
        assert!(normalize_book_ticker(nan_bid, "BTC-USD").is_none());

        let inf_ask = r#"{"s":"BTCUSDT","b":"100.0","a":"inf","T":1700000060123}"#;
        assert!(normalize_book_ticker(inf_ask, "BTC-USD").is_none());
    }

    #[test]
    fn test_drops_malformed_json() {
        assert!(normalize_book_ticker("not json at all", "BTC-USD").is_none());
    }

    #[test]
    fn test_missing_event_time_falls_back_to_wall_clock() {
        let before = chrono::Utc::now().timestamp();
        let text = r#"{"s":"BTCUSDT","b":"100.0","a":"102.0"}"#;
        let quote = normalize_book_ticker(text, "BTC-USD").unwrap();
        let after = chrono::Utc::now().timestamp();

        assert!(quote.timestamp >= before && quote.timestamp <= after);
    }
}
