//! Midstream Library
//!
//! Streaming bid/ask quote ingestion and OHLCV candle aggregation with
//! a range-query HTTP API

pub mod api;
pub mod channel;
pub mod collector;
pub mod config;
pub mod engine;
pub mod store;
pub mod types;
