//! Portal login/session routes.
//!
//! Grounded on `original_source/portal/backend/app/routes/auth.py`:
//! `/login` redirects to the IdP with the caller's own post-login
//! redirect threaded through as OAuth `state`; `/callback` exchanges the
//! authorization code, upserts the user, and redirects back to that same
//! `state` URL with `?token=` appended; `/exchange` trades a short-lived
//! cross-domain token for a fresh portal session token.

use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::error::GatewayError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/callback", get(callback))
        .route("/auth/exchange", post(exchange))
        .route("/users/me", get(get_me).put(update_me))
}

#[derive(Deserialize)]
struct LoginQuery {
    redirect_uri: String,
}

async fn login(State(state): State<AppState>, Query(query): Query<LoginQuery>) -> Result<Redirect, GatewayError> {
    let url = state
        .idp()
        .authorize_url(&query.redirect_uri)
        .map_err(|err| GatewayError::Internal(err.to_string()))?;
    Ok(Redirect::temporary(&url))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: String,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, GatewayError> {
    if let Some(error) = query.error {
        return Err(GatewayError::Validation(
            query.error_description.unwrap_or(error),
        ));
    }
    let code = query
        .code
        .ok_or_else(|| GatewayError::Validation("missing authorization code".to_string()))?;

    let identity = state
        .idp()
        .exchange_code(&code)
        .await
        .map_err(|err| GatewayError::Unauthorized(err.to_string()))?;

    let user = state
        .store()
        .upsert_user_from_external_identity(&identity.subject, &identity.email)
        .await?;

    let (token, _exp) = state
        .auth()
        .issue_access_token(user.id)
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    let separator = if query.state.contains('?') { '&' } else { '?' };
    Ok(Redirect::temporary(&format!("{}{separator}token={token}", query.state)))
}

#[derive(Deserialize)]
struct ExchangeQuery {
    token: String,
}

#[derive(Serialize)]
struct ExchangeResponse {
    access_token: String,
    token_type: &'static str,
    user: UserResponse,
}

async fn exchange(
    State(state): State<AppState>,
    Query(query): Query<ExchangeQuery>,
) -> Result<Json<ExchangeResponse>, GatewayError> {
    let claims = state
        .auth()
        .verify_cross_domain_token(&query.token)
        .map_err(|err| GatewayError::Unauthorized(err.to_string()))?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| GatewayError::Unauthorized("malformed subject".to_string()))?;
    let user = state
        .store()
        .get_user(user_id)
        .await
        .ok_or_else(|| GatewayError::Unauthorized("unknown user".to_string()))?;

    let (access_token, _exp) = state
        .auth()
        .issue_access_token(user.id)
        .map_err(|err| GatewayError::Internal(err.to_string()))?;

    Ok(Json(ExchangeResponse {
        access_token,
        token_type: "bearer",
        user: UserResponse::from(user),
    }))
}

#[derive(Serialize)]
struct UserResponse {
    id: Uuid,
    email: String,
    display_name: Option<String>,
}

impl From<cp_core::model::User> for UserResponse {
    fn from(user: cp_core::model::User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
        }
    }
}

async fn get_me(State(state): State<AppState>, auth: AuthContext) -> Result<Json<UserResponse>, GatewayError> {
    let user_id = auth.require_user_session()?;
    let user = state
        .store()
        .get_user(user_id)
        .await
        .ok_or_else(|| GatewayError::NotFound("user not found".to_string()))?;
    Ok(Json(UserResponse::from(user)))
}

#[derive(Deserialize)]
struct UpdateMeRequest {
    display_name: String,
}

async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, GatewayError> {
    let user_id = auth.require_user_session()?;
    let user = state
        .store()
        .update_user_display_name(user_id, body.display_name)
        .await?;
    Ok(Json(UserResponse::from(user)))
}
