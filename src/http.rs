use crate::metrics::Metrics;
use crate::normalize;
use crate::store::{
    AgentRecord, AgentStore, DiskUsage, EventEntry, MemoryUsage, ProcessInfo, Sample,
};
use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

pub const INGEST_SECRET_HEADER: &str = "x-ingest-secret";

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub store: Arc<AgentStore>,
    pub ingest_secret: Arc<String>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid or missing ingest secret")]
    Unauthorized,
    #[error("request body is not valid JSON")]
    MalformedBody,
    #[error("payload has no agent identifier")]
    MissingAgentId,
}

impl IngestError {
    fn status(&self) -> StatusCode {
        match self {
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::MalformedBody => StatusCode::BAD_REQUEST,
            IngestError::MissingAgentId => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            IngestError::Unauthorized => "unauthorized",
            IngestError::MalformedBody => "malformed",
            IngestError::MissingAgentId => "invalid",
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, serde::Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, serde::Serialize)]
pub struct IngestAck {
    pub status: &'static str,
    pub agent_id: String,
}

#[derive(Debug, serde::Deserialize)]
pub struct IngestQuery {
    secret: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AgentsResponse {
    pub generated_at: String,
    pub agents: Vec<ApiAgent>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiAgent {
    pub agent_id: String,
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub last_seen: String,
    pub samples: Vec<ApiSample>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ApiSample {
    pub collected_at: String,
    pub cpu_percent: Option<f64>,
    pub memory: Option<MemoryUsage>,
    pub disks: Vec<DiskUsage>,
    pub processes: Vec<ProcessInfo>,
    pub events: Vec<EventEntry>,
}

impl From<&AgentRecord> for ApiAgent {
    fn from(value: &AgentRecord) -> Self {
        Self {
            agent_id: value.agent_id.clone(),
            hostname: value.hostname.clone(),
            ip: value.ip.clone(),
            last_seen: format_unix(value.last_seen_unix),
            samples: value.samples.iter().map(ApiSample::from).collect(),
        }
    }
}

impl From<&Sample> for ApiSample {
    fn from(value: &Sample) -> Self {
        Self {
            collected_at: format_unix(value.collected_at_unix),
            cpu_percent: value.cpu_percent,
            memory: value.memory.clone(),
            disks: value.disks.clone(),
            processes: value.processes.clone(),
            events: value.events.clone(),
        }
    }
}

pub fn build_router(metrics: Arc<Metrics>, store: Arc<AgentStore>, ingest_secret: String) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/agents", get(agents_handler))
        .with_state(HttpAppState {
            metrics,
            store,
            ingest_secret: Arc::new(ingest_secret),
        })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    let stats = state.store.stats().await;
    state.metrics.update_gauges(&stats);
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {err}"),
        )
            .into_response(),
    }
}

async fn ingest_handler(
    State(state): State<HttpAppState>,
    Query(query): Query<IngestQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match ingest(&state, &query, &headers, &body).await {
        Ok(ack) => {
            state.metrics.observe_ingest("accepted");
            state.metrics.inc_samples_stored();
            state.metrics.set_last_ingest(now_unix());
            debug!(agent = %ack.agent_id, "sample stored");
            (StatusCode::OK, Json(ack)).into_response()
        }
        Err(err) => {
            state.metrics.observe_ingest(err.outcome());
            warn!(error = %err, "ingest rejected");
            err.into_response()
        }
    }
}

async fn ingest(
    state: &HttpAppState,
    query: &IngestQuery,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<IngestAck, IngestError> {
    // The header wins; the query parameter is only consulted when the
    // header is absent. Checked before the body is even parsed.
    let supplied = headers
        .get(INGEST_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query.secret.as_deref());
    if supplied != Some(state.ingest_secret.as_str()) {
        return Err(IngestError::Unauthorized);
    }

    let payload: serde_json::Value =
        serde_json::from_slice(body).map_err(|_| IngestError::MalformedBody)?;

    let normalized = normalize::normalize_payload(&payload, now_unix())
        .ok_or(IngestError::MissingAgentId)?;

    let agent_id = normalized.identity.agent_id.clone();
    state
        .store
        .upsert(normalized.identity, normalized.sample)
        .await;

    Ok(IngestAck {
        status: "ok",
        agent_id,
    })
}

async fn agents_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let records = state.store.snapshot().await;
    let agents = records.iter().map(ApiAgent::from).collect();
    Json(AgentsResponse {
        generated_at: format_unix(now_unix()),
        agents,
    })
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn format_unix(ts_unix: i64) -> String {
    let ts = UNIX_EPOCH + Duration::from_secs(ts_unix.max(0) as u64);
    humantime::format_rfc3339_seconds(ts).to_string()
}
