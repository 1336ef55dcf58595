//! Relay proxy for reaching telemetry endpoints on monitored hosts
//!
//! Browsers talking to the agent cannot reach exporters on remote Docker
//! hosts directly, so the agent relays the request. Only http and https
//! targets are accepted; hop-by-hop headers are stripped in both
//! directions so connection semantics stay per-hop.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::api::{ApiError, AppState};

/// Headers that describe the connection, not the payload (RFC 9110 §7.6.1).
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}

/// Validate a relay target before any connection is attempted.
pub fn validate_target(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("Invalid proxy target: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("Unsupported proxy scheme: {other}")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    url: String,
}

/// Relay one request to the target and stream back status, headers, and body.
pub async fn relay(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProxyQuery>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let target = validate_target(&query.url).map_err(ApiError::bad_request)?;
    debug!(target = %target, method = %method, "Relaying proxy request");

    let mut request = state.http.request(method, target.as_str());
    for (name, value) in headers.iter() {
        // Host is recomputed for the new target.
        if is_hop_by_hop(name.as_str()) || name == "host" {
            continue;
        }
        request = request.header(name, value);
    }
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = request
        .send()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("Proxy target unreachable: {e}")))?;

    let status =
        StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream.headers().iter() {
        if !is_hop_by_hop(name.as_str()) {
            response_headers.insert(name.clone(), value.clone());
        }
    }

    let body = upstream
        .bytes()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("Proxy target read failed: {e}")))?;

    Ok((status, response_headers, body).into_response())
}
