//! Workspace CRUD + status, scope `workspaces:read|write`.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use cp_core::broker::payload::WorkspaceProvisionPayload;
use cp_core::broker::{Priority, TaskType};
use cp_core::model::{CreateWorkspaceRequest, WorkspaceSummary};

use crate::auth::AuthContext;
use crate::error::GatewayError;
use crate::state::AppState;

const SCOPE_READ: &str = "workspaces:read";
const SCOPE_WRITE: &str = "workspaces:write";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workspaces", get(list_workspaces).post(create_workspace))
        .route("/workspaces/{slug}", get(get_workspace))
        .route("/workspaces/{slug}/status", get(get_workspace_status))
}

async fn list_workspaces(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<WorkspaceSummary>>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let owner_user_id = auth
        .user_id()
        .ok_or_else(|| GatewayError::Unauthorized("no identifiable owner".to_string()))?;
    let workspaces = state.store().list_workspaces_owned_by(owner_user_id).await;
    Ok(Json(workspaces.iter().map(WorkspaceSummary::from).collect()))
}

async fn create_workspace(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<CreateWorkspaceRequest>,
) -> Result<Json<WorkspaceSummary>, GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let owner_user_id = auth
        .user_id()
        .ok_or_else(|| GatewayError::Unauthorized("no identifiable owner".to_string()))?;

    let workspace = state
        .store()
        .create_workspace(body, owner_user_id, &state.config().reserved_slugs)
        .await?;

    state
        .broker()
        .enqueue(
            TaskType::WorkspaceProvision(WorkspaceProvisionPayload {
                workspace_id: workspace.id,
                slug: workspace.slug.clone(),
                owner_user_id,
                app_template_id: workspace.app_template_id,
            }),
            Priority::High,
        )
        .await;

    Ok(Json(WorkspaceSummary::from(&workspace)))
}

async fn get_workspace(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<WorkspaceSummary>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let workspace = state
        .store()
        .get_workspace_by_slug(&slug)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("workspace '{slug}' not found")))?;
    Ok(Json(WorkspaceSummary::from(&workspace)))
}

#[derive(Serialize)]
struct WorkspaceStatusResponse {
    slug: String,
    status: cp_core::model::WorkspaceStatus,
}

async fn get_workspace_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<WorkspaceStatusResponse>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let workspace = state
        .store()
        .get_workspace_by_slug(&slug)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("workspace '{slug}' not found")))?;
    Ok(Json(WorkspaceStatusResponse {
        slug: workspace.slug,
        status: workspace.status,
    }))
}
