//! Sandbox CRUD nested under a workspace, scope `sandboxes:read|write`.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cp_core::broker::payload::{SandboxLifecyclePayload, SandboxProvisionPayload};
use cp_core::broker::{Priority, TaskType};
use cp_core::model::Sandbox;

use crate::auth::AuthContext;
use crate::error::GatewayError;
use crate::state::AppState;

const SCOPE_READ: &str = "sandboxes:read";
const SCOPE_WRITE: &str = "sandboxes:write";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/workspaces/{slug}/sandboxes",
            get(list_sandboxes).post(create_sandbox),
        )
        .route(
            "/workspaces/{slug}/sandboxes/{sandbox_slug}",
            get(get_sandbox).delete(delete_sandbox),
        )
}

async fn workspace_id_for(state: &AppState, slug: &str) -> Result<Uuid, GatewayError> {
    state
        .store()
        .get_workspace_by_slug(slug)
        .await
        .map(|workspace| workspace.id)
        .ok_or_else(|| GatewayError::NotFound(format!("workspace '{slug}' not found")))
}

async fn list_sandboxes(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(workspace_slug): Path<String>,
) -> Result<Json<Vec<Sandbox>>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let workspace_id = workspace_id_for(&state, &workspace_slug).await?;
    Ok(Json(state.store().list_sandboxes_for_workspace(workspace_id).await))
}

async fn get_sandbox(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((workspace_slug, sandbox_slug)): Path<(String, String)>,
) -> Result<Json<Sandbox>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let workspace_id = workspace_id_for(&state, &workspace_slug).await?;
    let sandbox = state
        .store()
        .list_sandboxes_for_workspace(workspace_id)
        .await
        .into_iter()
        .find(|sandbox| sandbox.slug == sandbox_slug)
        .ok_or_else(|| GatewayError::NotFound(format!("sandbox '{sandbox_slug}' not found")))?;
    Ok(Json(sandbox))
}

#[derive(Deserialize)]
struct CreateSandboxRequest {
    slug: String,
    source_branch: String,
}

#[derive(Serialize)]
struct SandboxProvisioningResponse {
    workspace_slug: String,
    slug: String,
    status: &'static str,
}

async fn create_sandbox(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(workspace_slug): Path<String>,
    Json(body): Json<CreateSandboxRequest>,
) -> Result<Json<SandboxProvisioningResponse>, GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let workspace_id = workspace_id_for(&state, &workspace_slug).await?;

    state
        .broker()
        .enqueue(
            TaskType::SandboxProvision(SandboxProvisionPayload {
                workspace_id,
                // The sandbox row itself doesn't exist until the pipeline
                // creates it (its id, branch name and secret are all
                // derived there); this placeholder id is not referenced.
                sandbox_id: Uuid::new_v4(),
                slug: body.slug.clone(),
                source_branch: body.source_branch,
            }),
            Priority::High,
        )
        .await;

    Ok(Json(SandboxProvisioningResponse {
        workspace_slug,
        slug: body.slug,
        status: "provisioning",
    }))
}

async fn delete_sandbox(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((workspace_slug, sandbox_slug)): Path<(String, String)>,
) -> Result<Json<SandboxProvisioningResponse>, GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let workspace_id = workspace_id_for(&state, &workspace_slug).await?;
    let sandbox = state
        .store()
        .list_sandboxes_for_workspace(workspace_id)
        .await
        .into_iter()
        .find(|sandbox| sandbox.slug == sandbox_slug)
        .ok_or_else(|| GatewayError::NotFound(format!("sandbox '{sandbox_slug}' not found")))?;

    state
        .broker()
        .enqueue(
            TaskType::SandboxDelete(SandboxLifecyclePayload { sandbox_id: sandbox.id }),
            Priority::High,
        )
        .await;

    Ok(Json(SandboxProvisioningResponse {
        workspace_slug,
        slug: sandbox_slug,
        status: "deleting",
    }))
}
