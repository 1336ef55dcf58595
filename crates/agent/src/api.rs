//! HTTP API: metrics queries, container enumeration, control, diagnostics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dockmon_lib::{
    AgentMetrics, CollectError, ContainerSummary, ControlAction, HostHealthTracker, HostRegistry,
    HostStatus, MetricsFilter, MetricsStore,
};
use dockmon_lib::runtime::ReaderProvider;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::proxy;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MetricsStore>,
    pub health: Arc<HostHealthTracker>,
    pub registry: Arc<HostRegistry>,
    pub provider: Arc<dyn ReaderProvider>,
    pub metrics: AgentMetrics,
    pub http: reqwest::Client,
    pub local_host_id: String,
}

/// API error with a well-typed JSON body.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl From<CollectError> for ApiError {
    fn from(err: CollectError) -> Self {
        let status = match &err {
            CollectError::HostNotFound(_) | CollectError::ContainerNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            CollectError::RuntimeUnavailable(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// One container as listed by the enumeration endpoint, tagged with the
/// host it was found on.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerListEntry {
    pub host_id: String,
    pub host_name: String,
    pub id: String,
    pub name: String,
    pub state: String,
}

impl ContainerListEntry {
    fn new(host_id: &str, host_name: &str, summary: ContainerSummary) -> Self {
        Self {
            host_id: host_id.to_string(),
            host_name: host_name.to_string(),
            id: summary.id,
            name: summary.name,
            state: summary.state,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    all: bool,
}

/// Enumerate containers across every enabled host. Hosts that fail to
/// answer are skipped; enumeration degrades rather than failing whole.
async fn list_containers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ContainerListEntry>>, ApiError> {
    let mut out = Vec::new();

    for host in state.registry.list_enabled() {
        let reader = match state.provider.reader_for(&host).await {
            Ok(reader) => reader,
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "Skipping unreachable host in listing");
                continue;
            }
        };
        match reader.list_containers(query.all).await {
            Ok(containers) => out.extend(
                containers
                    .into_iter()
                    .map(|c| ContainerListEntry::new(&host.id, &host.name, c)),
            ),
            Err(e) => {
                warn!(host_id = %host.id, error = %e, "Container listing failed for host");
            }
        }
    }

    Ok(Json(out))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    host_id: Option<String>,
}

/// Real-time state of one container, bypassing the store.
async fn container_status(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Response, ApiError> {
    let host_id = query.host_id.unwrap_or_else(|| state.local_host_id.clone());
    let host = state
        .registry
        .get(&host_id)
        .ok_or(CollectError::HostNotFound(host_id))?;

    let reader = state.provider.reader_for(&host).await?;
    let status = reader.container_status(&container_id).await?;
    Ok(Json(status).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    /// Comma-separated container ids
    id: Option<String>,
    /// Comma-separated host ids
    host_id: Option<String>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    #[serde(default)]
    latest: bool,
    limit: Option<usize>,
}

fn split_ids(raw: &Option<String>) -> Option<Vec<String>> {
    raw.as_ref().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl MetricsQuery {
    fn into_filter(self) -> MetricsFilter {
        MetricsFilter {
            container_ids: split_ids(&self.id),
            host_ids: split_ids(&self.host_id),
            from: self.from,
            to: self.to,
            latest: self.latest,
            limit: self.limit,
        }
    }
}

/// Stored container metrics, filtered by id and time range.
async fn container_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    Json(state.store.query_containers(&query.into_filter()))
}

/// Stored host metrics, filtered by id and time range.
async fn host_metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    Json(state.store.query_hosts(&query.into_filter()))
}

/// All configured hosts joined with their health state, container count,
/// and the runtime's view of the host (best effort; unreachable hosts
/// simply omit the resource fields).
async fn list_hosts(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut statuses = Vec::new();

    for host in state.registry.list() {
        let health = state.health.get(&host.id);
        let info = match state.provider.reader_for(&host).await {
            Ok(reader) => reader.host_info().await.ok(),
            Err(_) => None,
        };

        statuses.push(HostStatus {
            container_count: state.store.container_count_for_host(&host.id),
            last_checked: health.as_ref().map(|h| h.last_checked),
            healthy: health.as_ref().map(|h| h.healthy).unwrap_or(false),
            last_error: health.and_then(|h| h.last_error),
            cpus: info.as_ref().map(|i| i.cpus),
            total_memory_bytes: info.map(|i| i.total_memory_bytes),
            id: host.id,
            name: host.name,
            url: host.url,
            enabled: host.enabled,
        });
    }

    Json(statuses)
}

/// Diagnostic counts: configured hosts, known containers, store volume.
async fn store_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.store.stats();
    Json(json!({
        "hosts": state.registry.len(),
        "containers": state.store.known_container_ids().len(),
        "seriesCount": stats.series_count,
        "totalPoints": stats.total_points,
    }))
}

/// Control action result echoed back with its target.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    pub action: String,
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Invoke a container lifecycle action on one host.
///
/// Runtime-reported failures come back as a 200 with `success: false`;
/// transport failures and unknown hosts/containers map to 5xx/4xx.
async fn control_container(
    State(state): State<Arc<AppState>>,
    Path((host_id, container_id, action)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let action = ControlAction::parse(&action)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown action: {action}")))?;

    let host = state
        .registry
        .get(&host_id)
        .ok_or(CollectError::HostNotFound(host_id))?;

    let reader = state.provider.reader_for(&host).await?;
    let outcome = reader.control(action, &container_id).await?;

    if outcome.success {
        info!(
            host_id = %host.id,
            container_id = %container_id,
            action = action.as_str(),
            "Container action applied"
        );
    } else {
        warn!(
            host_id = %host.id,
            container_id = %container_id,
            action = action.as_str(),
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Container action rejected by runtime"
        );
    }

    Ok(Json(ControlResponse {
        success: outcome.success,
        action: action.as_str().to_string(),
        container_id,
        error: outcome.error,
    })
    .into_response())
}

/// Liveness: healthy while every polled host answers.
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.health.all_healthy();
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(json!({ "healthy": healthy, "hosts": state.health.get_all() })),
    )
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<Response, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::bad_gateway(format!("Metrics encoding failed: {e}")))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/containers", get(list_containers))
        .route("/api/containers/:id/status", get(container_status))
        // Same param name as the status route so the trie slots agree.
        .route(
            "/api/containers/:id/:containerId/:action",
            post(control_container),
        )
        .route("/api/metrics/containers", get(container_metrics))
        .route("/api/metrics/hosts", get(host_metrics))
        .route("/api/hosts", get(list_hosts))
        .route("/api/stats", get(store_stats))
        .route("/proxy", get(proxy::relay).post(proxy::relay))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
