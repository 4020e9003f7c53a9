//! History query HTTP API
//!
//! Serves candle range queries as six parallel arrays ordered by bucket
//! start. Handled requests always answer HTTP 200; the `s` field of the
//! envelope carries success or failure.

use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

use crate::store::CandleStore;
use crate::types::IntervalDef;

/// Shared state for the query handlers
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn CandleStore>,
    pub intervals: Vec<IntervalDef>,
}

impl ApiState {
    fn interval_seconds(&self, id: &str) -> Option<i64> {
        self.intervals
            .iter()
            .find(|def| def.id == id)
            .map(|def| def.seconds)
    }
}

/// Range query response envelope.
///
/// The six arrays have equal length, ascend by `t`, and are omitted from
/// error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub s: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub o: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub h: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub v: Option<Vec<i64>>,
}

impl HistoryResponse {
    pub fn ok(t: Vec<i64>, o: Vec<f64>, h: Vec<f64>, l: Vec<f64>, c: Vec<f64>, v: Vec<i64>) -> Self {
        Self {
            s: "ok".to_string(),
            message: None,
            t: Some(t),
            o: Some(o),
            h: Some(h),
            l: Some(l),
            c: Some(c),
            v: Some(v),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            s: "error".to_string(),
            message: Some(message.into()),
            t: None,
            o: None,
            h: None,
            l: None,
            c: None,
            v: None,
        }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/history", get(get_history))
        .route("/healthz", get(get_healthz))
        .with_state(state)
        // CORS for browser charting clients
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub symbol: String,
    pub interval: String,
    pub from: i64,
    pub to: i64,
}

/// GET /history?symbol=BTC-USD&interval=1m&from=1700000000&to=1700000100
async fn get_history(
    Query(query): Query<HistoryQuery>,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    // Validation order matters: the range check comes before interval lookup.
    if query.from > query.to {
        return Json(HistoryResponse::error("from must be <= to"));
    }

    let Some(interval_secs) = state.interval_seconds(&query.interval) else {
        return Json(HistoryResponse::error(format!(
            "Unsupported interval: {}",
            query.interval
        )));
    };

    match state
        .store
        .range_scan(&query.symbol, interval_secs, query.from, query.to)
        .await
    {
        Ok(rows) => {
            let mut t = Vec::with_capacity(rows.len());
            let mut o = Vec::with_capacity(rows.len());
            let mut h = Vec::with_capacity(rows.len());
            let mut l = Vec::with_capacity(rows.len());
            let mut c = Vec::with_capacity(rows.len());
            let mut v = Vec::with_capacity(rows.len());
            for (bucket_start, candle) in rows {
                t.push(bucket_start);
                o.push(candle.open);
                h.push(candle.high);
                l.push(candle.low);
                c.push(candle.close);
                v.push(candle.volume);
            }
            Json(HistoryResponse::ok(t, o, h, l, c, v))
        }
        Err(e) => {
            error!(
                symbol = %query.symbol,
                interval = %query.interval,
                error = %e,
                "History range scan failed"
            );
            Json(HistoryResponse::error("Internal storage error"))
        }
    }
}

/// GET /healthz - liveness check
async fn get_healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Bind and serve the query API until shutdown is requested
pub async fn start_server(
    state: ApiState,
    host: String,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🖥️ History API listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
