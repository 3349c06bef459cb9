//! `/portal/tokens` — portal-scope API token issuance, JWT session only.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cp_core::model::{generate_token, ApiToken, TokenOwner};

use crate::auth::AuthContext;
use crate::error::GatewayError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/portal/tokens", get(list_tokens).post(create_token))
        .route("/portal/tokens/{id}", axum::routing::delete(revoke_token))
}

#[derive(Serialize)]
struct TokenSummary {
    id: Uuid,
    name: String,
    scopes: Vec<String>,
    active: bool,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ApiToken> for TokenSummary {
    fn from(token: ApiToken) -> Self {
        Self {
            id: token.id,
            name: token.name,
            scopes: token.scopes,
            active: token.active,
            expires_at: token.expires_at,
            last_used_at: token.last_used_at,
            created_at: token.created_at,
        }
    }
}

async fn list_tokens(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<TokenSummary>>, GatewayError> {
    let user_id = auth.require_user_session()?;
    let tokens = state
        .store()
        .list_api_tokens_for_owner(TokenOwner::Portal, user_id, None)
        .await;
    Ok(Json(tokens.into_iter().map(TokenSummary::from).collect()))
}

#[derive(Deserialize)]
struct CreateTokenRequest {
    name: String,
    scopes: Vec<String>,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct CreateTokenResponse {
    token: TokenSummary,
    /// The bearer secret, returned exactly once.
    plaintext: String,
}

async fn create_token(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(body): Json<CreateTokenRequest>,
) -> Result<Json<CreateTokenResponse>, GatewayError> {
    let user_id = auth.require_user_session()?;
    let (plaintext, hash) = generate_token();
    let now = Utc::now();
    let token = ApiToken {
        id: Uuid::new_v4(),
        name: body.name,
        token_hash: hash,
        scopes: body.scopes,
        created_by_user: user_id,
        owner: TokenOwner::Portal,
        team_id: None,
        expires_at: body.expires_at,
        active: true,
        last_used_at: None,
        created_at: now,
        updated_at: now,
    };
    let created = state.store().insert_api_token(token).await?;
    Ok(Json(CreateTokenResponse {
        token: TokenSummary::from(created),
        plaintext,
    }))
}

async fn revoke_token(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TokenSummary>, GatewayError> {
    auth.require_user_session()?;
    let revoked = state.store().revoke_api_token(id).await?;
    Ok(Json(TokenSummary::from(revoked)))
}
