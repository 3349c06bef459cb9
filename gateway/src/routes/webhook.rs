//! Tenant → orchestrator webhook receiver.
//!
//! Grounded on spec.md §4.5(c)/§6 and `kanban-agents/agents/webhook_server.py`'s
//! `card.moved` handling: HMAC-verify the raw body against the sandbox's
//! stored secret, map the destination column to an agent role, and
//! enqueue `agent.process_card` on the agents queue.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use cp_core::broker::payload::AgentProcessCardPayload;
use cp_core::broker::{Priority, TaskType};
use cp_orchestrator::agent_for_column;

use crate::error::GatewayError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    card: WebhookCard,
    #[serde(default)]
    #[allow(dead_code)]
    previous_column: Option<serde_json::Value>,
    #[serde(default)]
    #[allow(dead_code)]
    board: Option<serde_json::Value>,
    sandbox_id: Option<String>,
    workspace_slug: String,
    #[allow(dead_code)]
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct WebhookCard {
    id: String,
    title: String,
    description: Option<String>,
    column_name: String,
}

#[derive(Serialize)]
struct WebhookResponse {
    status: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive_webhook))
}

async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<WebhookResponse>, GatewayError> {
    let signature = headers
        .get("X-Webhook-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| GatewayError::Unauthorized("missing webhook signature".to_string()))?;
    let signature_hex = signature
        .strip_prefix("sha256=")
        .ok_or_else(|| GatewayError::Unauthorized("unsupported webhook signature scheme".to_string()))?;

    let payload: WebhookPayload =
        serde_json::from_slice(&body).map_err(|err| GatewayError::Validation(err.to_string()))?;

    let sandbox_id = payload
        .sandbox_id
        .as_deref()
        .ok_or_else(|| GatewayError::Validation("sandbox_id is required to verify this webhook".to_string()))?;

    let workspace = state
        .store()
        .get_workspace_by_slug(&payload.workspace_slug)
        .await
        .ok_or_else(|| GatewayError::NotFound("unknown workspace_slug".to_string()))?;

    let sandbox = state
        .store()
        .list_sandboxes_for_workspace(workspace.id)
        .await
        .into_iter()
        .find(|sandbox| sandbox.full_slug == sandbox_id)
        .ok_or_else(|| GatewayError::NotFound("unknown sandbox_id".to_string()))?;

    verify_signature(&body, signature_hex, &sandbox.agent_webhook_secret)?;

    if payload.event != "card.moved" {
        return Ok(Json(WebhookResponse { status: "ignored" }));
    }

    if agent_for_column(&payload.card.column_name).is_none() {
        return Ok(Json(WebhookResponse { status: "ignored" }));
    }

    let team = state
        .store()
        .get_team_for_workspace(workspace.id)
        .await
        .ok_or_else(|| GatewayError::Internal("workspace has no team".to_string()))?;

    state
        .broker()
        .enqueue(
            TaskType::AgentProcessCard(AgentProcessCardPayload {
                team_id: team.id,
                card_id: payload.card.id,
                column_name: payload.card.column_name,
                card_title: payload.card.title,
                card_description: payload.card.description,
                webhook_callback_url: format!("http://kanban-team-{}-api-1:8000/api/cards/comments", team.slug),
            }),
            Priority::Normal,
        )
        .await;

    Ok(Json(WebhookResponse { status: "queued" }))
}

fn verify_signature(body: &[u8], signature_hex: &str, secret: &str) -> Result<(), GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| GatewayError::Internal("invalid webhook secret length".to_string()))?;
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.as_bytes().ct_eq(signature_hex.as_bytes()).into() {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized("webhook signature mismatch".to_string()))
    }
}
