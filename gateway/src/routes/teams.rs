//! Team CRUD, lifecycle and membership, scope `teams:read|write` (restart
//! is JWT + team-admin-or-above instead of a scope, per spec.md §6).

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use cp_core::broker::payload::{TeamLifecyclePayload, TeamProvisionPayload};
use cp_core::broker::{Priority, TaskType};
use cp_core::model::{Membership, Role, Team};

use crate::auth::AuthContext;
use crate::error::GatewayError;
use crate::state::AppState;

const SCOPE_READ: &str = "teams:read";
const SCOPE_WRITE: &str = "teams:write";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/{slug}", get(get_team).delete(delete_team))
        .route("/teams/{slug}/restart", axum::routing::post(restart_team))
        .route(
            "/teams/{slug}/members",
            get(list_members).post(add_member),
        )
        .route("/teams/{slug}/members/{user_id}", axum::routing::delete(remove_member))
}

async fn team_by_slug(state: &AppState, slug: &str) -> Result<Team, GatewayError> {
    let workspace = state
        .store()
        .get_workspace_by_slug(slug)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("team '{slug}' not found")))?;
    state
        .store()
        .get_team_for_workspace(workspace.id)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("team '{slug}' not found")))
}

async fn list_teams(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<Team>>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let owner_user_id = auth
        .user_id()
        .ok_or_else(|| GatewayError::Unauthorized("no identifiable owner".to_string()))?;
    let workspaces = state.store().list_workspaces_owned_by(owner_user_id).await;
    let mut teams = Vec::new();
    for workspace in workspaces {
        if let Some(team) = state.store().get_team_for_workspace(workspace.id).await {
            teams.push(team);
        }
    }
    Ok(Json(teams))
}

#[derive(Deserialize)]
struct CreateTeamRequest {
    workspace_slug: String,
}

async fn create_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<CreateTeamRequest>,
) -> Result<Json<Team>, GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let workspace = state
        .store()
        .get_workspace_by_slug(&body.workspace_slug)
        .await
        .ok_or_else(|| GatewayError::NotFound(format!("workspace '{}' not found", body.workspace_slug)))?;

    if state.store().get_team_for_workspace(workspace.id).await.is_some() {
        return Err(GatewayError::Conflict("workspace already has a team".to_string()));
    }

    let team = state.store().create_team(workspace.id, &workspace.slug).await?;

    state
        .broker()
        .enqueue(
            TaskType::TeamProvision(TeamProvisionPayload {
                workspace_id: workspace.id,
                team_id: team.id,
                slug: workspace.slug.clone(),
                github_repo_name: workspace.github_repo_name.clone(),
                app_database_name: workspace.app_database_name.clone(),
            }),
            Priority::High,
        )
        .await;

    Ok(Json(team))
}

async fn get_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<Team>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    Ok(Json(team_by_slug(&state, &slug).await?))
}

async fn delete_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<Team>, GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let team = team_by_slug(&state, &slug).await?;
    state
        .broker()
        .enqueue(TaskType::TeamDelete(TeamLifecyclePayload { team_id: team.id }), Priority::High)
        .await;
    Ok(Json(team))
}

#[derive(Deserialize)]
struct RestartTeamRequest {
    #[allow(dead_code)]
    rebuild: bool,
}

async fn restart_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(_body): Json<RestartTeamRequest>,
) -> Result<Json<Team>, GatewayError> {
    let user_id = auth.require_user_session()?;
    let team = team_by_slug(&state, &slug).await?;

    let membership = state
        .store()
        .get_membership(team.id, user_id)
        .await
        .ok_or_else(|| GatewayError::Forbidden("team membership required".to_string()))?;
    auth.require_role_at_least_admin(membership.role)?;

    state
        .broker()
        .enqueue(
            TaskType::TeamRestart(TeamLifecyclePayload { team_id: team.id }),
            Priority::High,
        )
        .await;
    Ok(Json(team))
}

async fn list_members(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
) -> Result<Json<Vec<Membership>>, GatewayError> {
    auth.require_scope(SCOPE_READ)?;
    let team = team_by_slug(&state, &slug).await?;
    Ok(Json(state.store().list_memberships_for_team(team.id).await))
}

#[derive(Deserialize)]
struct AddMemberRequest {
    user_id: Uuid,
    role: String,
}

async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(slug): Path<String>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<Membership>, GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let team = team_by_slug(&state, &slug).await?;
    let role: Role = body
        .role
        .parse()
        .map_err(|_| GatewayError::Validation(format!("unknown role '{}'", body.role)))?;
    let membership = state.store().add_membership(team.id, body.user_id, role).await?;
    Ok(Json(membership))
}

async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((slug, user_id)): Path<(String, Uuid)>,
) -> Result<(), GatewayError> {
    auth.require_scope(SCOPE_WRITE)?;
    let team = team_by_slug(&state, &slug).await?;
    state.store().remove_membership(team.id, user_id).await?;
    Ok(())
}
