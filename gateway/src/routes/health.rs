//! Health check endpoint — unscoped, ambient.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    base_domain: String,
    orchestrator_workers: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        base_domain: state.config().base_domain.clone(),
        orchestrator_workers: state.config().orchestrator_workers,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
