//! `/tasks/{id}/retry|cancel` and `/tasks/ws`, JWT session only.
//!
//! The websocket forwards every `TaskEvent` off the broker's broadcast
//! channel as a `task.progress`/`task.completed`/`task.failed` frame per
//! spec.md §6. The broker's `Task` has no per-user owner field, so this
//! streams every task rather than filtering to the caller's own —
//! a deliberate simplification, not an oversight.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use cp_core::broker::{Task, TaskEvent};

use crate::auth::AuthContext;
use crate::error::GatewayError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks/{id}/retry", axum::routing::post(retry_task))
        .route("/tasks/{id}/cancel", axum::routing::post(cancel_task))
        .route("/tasks/ws", get(tasks_ws))
}

async fn retry_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, GatewayError> {
    auth.require_user_session()?;
    Ok(Json(state.broker().retry(id).await?))
}

async fn cancel_task(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, GatewayError> {
    auth.require_user_session()?;
    Ok(Json(state.broker().cancel(id).await?))
}

async fn tasks_ws(
    State(state): State<AppState>,
    auth: AuthContext,
    upgrade: WebSocketUpgrade,
) -> Result<impl IntoResponse, GatewayError> {
    auth.require_user_session()?;
    Ok(upgrade.on_upgrade(move |socket| stream_task_events(socket, state)))
}

#[derive(Serialize)]
struct TaskEventFrame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    task_id: Uuid,
    step: u32,
    total_steps: u32,
    step_name: Option<&'a str>,
    percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn frame_for(event: &TaskEvent) -> TaskEventFrame<'_> {
    let task = event.task();
    let percentage = if task.progress.total_steps == 0 {
        0.0
    } else {
        (task.progress.step as f64 / task.progress.total_steps as f64) * 100.0
    };
    let kind = match event {
        TaskEvent::Completed(_) => "task.completed",
        TaskEvent::Failed(_) => "task.failed",
        _ => "task.progress",
    };
    TaskEventFrame {
        kind,
        task_id: task.id,
        step: task.progress.step,
        total_steps: task.progress.total_steps,
        step_name: task.progress.message.as_deref(),
        percentage,
        message: task.progress.message.as_deref(),
        result: task.result.as_ref(),
        error: task.error.as_deref(),
    }
}

async fn stream_task_events(mut socket: WebSocket, state: AppState) {
    let mut receiver = state.broker().subscribe();
    loop {
        tokio::select! {
            event = receiver.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let frame = frame_for(&event);
                let payload = match serde_json::to_string(&frame) {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
