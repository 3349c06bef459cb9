//! `AuthContext` — the axum extractor every scoped route pulls its
//! identity and capability set from.
//!
//! Grounded on `original_source/portal/backend/app/auth/unified.py`'s
//! `get_auth_context`/`AuthContext`/`require_scope`: a `pk_`-prefixed
//! bearer value is looked up as an API token (hashed, checked for
//! `is_usable`, scopes taken from the token record, `last_used_at`
//! touched); anything else is verified as a portal session JWT and
//! granted the implicit `["*"]` scope of its owning user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use cp_core::model::{ApiToken, Role, TokenOwner};

use crate::error::GatewayError;
use crate::state::AppState;

const TOKEN_PREFIX: &str = "pk_";

#[derive(Debug, Clone)]
pub enum Principal {
    User { user_id: Uuid },
    ApiToken {
        token_id: Uuid,
        created_by_user: Uuid,
        owner: TokenOwner,
        team_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
    scopes: Vec<String>,
}

impl AuthContext {
    fn from_user(user_id: Uuid) -> Self {
        Self {
            principal: Principal::User { user_id },
            scopes: vec!["*".to_string()],
        }
    }

    fn from_api_token(token: &ApiToken) -> Self {
        Self {
            principal: Principal::ApiToken {
                token_id: token.id,
                created_by_user: token.created_by_user,
                owner: token.owner,
                team_id: token.team_id,
            },
            scopes: token.scopes.clone(),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self.principal {
            Principal::User { user_id } => Some(user_id),
            Principal::ApiToken { created_by_user, .. } => Some(created_by_user),
        }
    }

    /// spec.md §4.5(a)'s scope check: `*`, exact match, or
    /// `{category}:*`.
    pub fn has_scope(&self, required: &str) -> bool {
        if self.scopes.iter().any(|scope| scope == "*") {
            return true;
        }
        if self.scopes.iter().any(|scope| scope == required) {
            return true;
        }
        let category = required.split(':').next().unwrap_or(required);
        let wildcard = format!("{category}:*");
        self.scopes.iter().any(|scope| *scope == wildcard)
    }

    pub fn require_scope(&self, required: &str) -> Result<(), GatewayError> {
        if self.has_scope(required) {
            Ok(())
        } else {
            Err(GatewayError::Forbidden(required.to_string()))
        }
    }

    /// JWT-only surfaces (portal session required, API tokens rejected
    /// regardless of scope) per spec.md §6's `/users/me`, `/portal/tokens`,
    /// `/tasks/ws` rows.
    pub fn require_user_session(&self) -> Result<Uuid, GatewayError> {
        match self.principal {
            Principal::User { user_id } => Ok(user_id),
            Principal::ApiToken { .. } => Err(GatewayError::Forbidden("portal session required".to_string())),
        }
    }

    pub fn require_role_at_least_admin(&self, role: Role) -> Result<(), GatewayError> {
        if role.at_least_admin() {
            Ok(())
        } else {
            Err(GatewayError::Forbidden("team admin role required".to_string()))
        }
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| GatewayError::Unauthorized("missing authorization header".to_string()))?;

        let bearer = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| GatewayError::Unauthorized("expected a bearer token".to_string()))?;

        if let Some(secret) = bearer.strip_prefix(TOKEN_PREFIX) {
            let hash = cp_core::model::hash_token(&format!("{TOKEN_PREFIX}{secret}"));
            let token = state
                .store()
                .get_api_token_by_hash(&hash)
                .await
                .ok_or_else(unauthorized)?;
            if !token.is_usable() {
                return Err(unauthorized());
            }
            state.store().touch_api_token(token.id).await.ok();
            return Ok(AuthContext::from_api_token(&token));
        }

        let claims = state
            .auth()
            .verify_access_token(bearer)
            .map_err(|_| unauthorized())?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| unauthorized())?;
        Ok(AuthContext::from_user(user_id))
    }
}

fn unauthorized() -> GatewayError {
    GatewayError::Unauthorized("invalid or expired credential".to_string())
}
