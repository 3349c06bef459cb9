//! Auto-start routing and reverse proxy.
//!
//! Grounded on spec.md §4.5(b): a request against a suspended/idle team
//! enqueues `team.start`, polls the team's status every 2 seconds for up
//! to 60 seconds, then either proxies the request through or gives up
//! with a 503. Header/body forwarding and the hop-by-hop header strip
//! mirror the teacher's own reverse-proxy handler.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use cp_core::broker::Priority;
use cp_core::model::{Team, TeamStatus};

use crate::error::GatewayError;
use crate::state::AppState;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const POLL_ATTEMPTS: u32 = 30;

/// Request/response headers that must not be forwarded across the proxy
/// hop, per RFC 7230 §6.1.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP.contains(&name.as_str()) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

/// Ensures `team` is `Active`, auto-starting it first if it is suspended
/// or idle. Returns the (possibly refreshed) team once active.
pub async fn ensure_team_active(state: &AppState, mut team: Team) -> Result<Team, GatewayError> {
    if team.status == TeamStatus::Active {
        return Ok(team);
    }
    if !matches!(team.status, TeamStatus::Suspended | TeamStatus::Idle) {
        return Err(GatewayError::Conflict(format!(
            "team is {:?} and cannot be auto-started",
            team.status
        )));
    }

    state
        .broker()
        .enqueue(
            cp_core::broker::TaskType::TeamStart(cp_core::broker::payload::TeamLifecyclePayload {
                team_id: team.id,
            }),
            Priority::High,
        )
        .await;

    for _ in 0..POLL_ATTEMPTS {
        tokio::time::sleep(POLL_INTERVAL).await;
        team = state
            .store()
            .get_team(team.id)
            .await
            .ok_or_else(|| GatewayError::NotFound("team disappeared during auto-start".to_string()))?;
        if team.status == TeamStatus::Active {
            return Ok(team);
        }
        if team.status == TeamStatus::Failed {
            return Err(GatewayError::UpstreamUnavailable);
        }
    }

    Err(GatewayError::UpstreamUnavailable)
}

/// Proxies `method`/`headers`/`body` through to the team's kanban API
/// container, forwarding the caller's own `Authorization` header
/// verbatim (the upstream container trusts the gateway's network
/// boundary, not a re-derived credential).
pub async fn proxy_to_team(
    state: &AppState,
    team_slug: &str,
    method: Method,
    path_and_query: &str,
    headers: HeaderMap,
    body: Body,
) -> Result<axum::response::Response, GatewayError> {
    let target = format!("http://kanban-team-{team_slug}-api-1:8000{path_and_query}");

    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    let mut request = state.http().request(method, &target).body(body_bytes);
    for (name, value) in strip_hop_by_hop(&headers).iter() {
        request = request.header(name, value);
    }

    let response = request.send().await.map_err(classify_transport_error)?;

    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = axum::response::Response::builder().status(status);
    for (name, value) in response.headers().iter() {
        if let Ok(name) = HeaderName::from_bytes(name.as_str().as_bytes()) {
            if !HOP_BY_HOP.contains(&name.as_str()) {
                builder = builder.header(name, value.as_bytes());
            }
        }
    }

    let upstream_body = response
        .bytes()
        .await
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    builder
        .body(Body::from(upstream_body))
        .map_err(|err| GatewayError::Internal(err.to_string()))
}

fn classify_transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_connect() {
        GatewayError::UpstreamUnavailable
    } else if err.is_timeout() {
        GatewayError::UpstreamTimeout
    } else {
        GatewayError::Internal(err.to_string())
    }
}
