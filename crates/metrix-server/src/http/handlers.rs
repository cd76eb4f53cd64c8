//! Endpoint handlers.
//!
//! JSON bodies are parsed by hand from `Bytes` so that malformed input is
//! always a `400` carrying `{"error": ...}`.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

use metrix_common::protocol::error::MetrixError;
use metrix_common::{Ack, Metric, MetricKind, MetricRecord, MetricValue};

use crate::state::AppState;
use crate::storage::MetricStore;

/// An error that terminates an HTTP request.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: MetrixError,
}

impl ApiError {
    pub fn with_status(status: StatusCode, error: MetrixError) -> Self {
        Self { status, error }
    }
}

impl From<MetrixError> for ApiError {
    fn from(error: MetrixError) -> Self {
        Self {
            status: error.status_code(),
            error,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!("Request failed: {}", self.error);
        } else {
            debug!("Request rejected: {}", self.error);
        }
        (self.status, Json(json!({ "error": self.error.to_string() }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| MetrixError::Validation(format!("malformed body: {e}")).into())
}

/// `POST /update/{kind}/{name}/{value}`
pub async fn update_path(
    State(state): State<Arc<AppState>>,
    Path((kind, name, raw)): Path<(String, String, String)>,
) -> ApiResult<&'static str> {
    let kind: MetricKind = kind.parse()?;
    let value = MetricValue::parse(kind, &raw)?;
    state
        .timed(state.storage.apply(Metric { id: name, value }))
        .await?;
    Ok("Registered successfully!")
}

/// `GET /value/{kind}/{name}`
pub async fn value_path(
    State(state): State<Arc<AppState>>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<String> {
    let kind: MetricKind = kind.parse()?;
    let metric = state.timed(state.storage.get(kind, &name)).await?;
    Ok(metric.value.to_string())
}

/// `GET /`
pub async fn index(State(state): State<Arc<AppState>>) -> ApiResult<Html<String>> {
    let gauges = state.timed(state.storage.gauges()).await?;
    let counters = state.timed(state.storage.counters()).await?;

    let mut rows: Vec<(String, String)> = gauges
        .into_iter()
        .map(|(name, value)| (name, format!("{value:.6}")))
        .chain(counters.into_iter().map(|(name, total)| (name, total.to_string())))
        .collect();
    rows.sort();

    Ok(Html(render_index(&rows)))
}

fn render_index(rows: &[(String, String)]) -> String {
    let mut page = String::from(
        "<html>\n<table>\n  <h2>Metrics storage:</h2>\n  <thead>\n    <tr>\n      \
         <th>Metric name</th>\n      <th>Metric value</th>\n    </tr>\n  </thead>\n  <tbody>\n",
    );
    for (name, value) in rows {
        let _ = write!(
            page,
            "    <tr>\n      <td><b>{}</b></td>\n      <td>{}</td>\n    </tr>\n",
            escape_html(name),
            value
        );
    }
    page.push_str("  </tbody>\n</table>\n</html>\n");
    page
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// `POST /update/`
pub async fn update_json(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Json<MetricRecord>> {
    let record: MetricRecord = parse_json(&body)?;
    let metric = record.validate()?;
    let stored = state.timed(state.storage.apply(metric)).await?;
    Ok(Json(stored.into()))
}

/// `POST /value/`
pub async fn value_json(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Json<MetricRecord>> {
    let query: MetricRecord = parse_json(&body)?;
    let metric = state.timed(state.storage.get(query.kind, &query.id)).await?;
    Ok(Json(metric.into()))
}

/// `POST /updates/`
pub async fn updates(State(state): State<Arc<AppState>>, body: Bytes) -> ApiResult<Json<Ack>> {
    let records: Vec<MetricRecord> = parse_json(&body)?;
    state.timed(state.storage.apply_batch(&records)).await?;
    debug!("Applied batch of {} records", records.len());
    Ok(Json(Ack::ok()))
}

/// `GET /ping`
pub async fn ping(State(state): State<Arc<AppState>>) -> ApiResult<&'static str> {
    state
        .timed(state.storage.health_check())
        .await
        .map_err(|e| ApiError::with_status(StatusCode::INTERNAL_SERVER_ERROR, e))?;
    Ok("DB alive!")
}
