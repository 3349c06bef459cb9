//! `PortalAuthStore` — JWT issuance/verification over the C1 user
//! collection.
//!
//! Grounded on the teacher's `AuthStore::{issue_claims,encode_claims,
//! decode_claims}` (`auth/store.rs`): HS256 via `jsonwebtoken`, one secret
//! for session tokens, a TTL read from config with the teacher's own
//! insecure-default-plus-warning precedent (see `GatewayConfig::from_env`).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use uuid::Uuid;

use super::jwt::{CrossDomainClaims, UserClaims, CROSS_DOMAIN_TOKEN_KIND};

const CROSS_DOMAIN_TTL_MINUTES: i64 = 5;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("failed to sign token: {0}")]
    SignFailed(String),
}

#[derive(Clone)]
pub struct PortalAuthStore {
    jwt_secret: String,
    access_token_ttl_hours: i64,
}

impl PortalAuthStore {
    pub fn new(jwt_secret: impl Into<String>, access_token_ttl_hours: i64) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_token_ttl_hours,
        }
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<(String, usize), AuthError> {
        let exp = (Utc::now() + Duration::hours(self.access_token_ttl_hours)).timestamp() as usize;
        let claims = UserClaims {
            sub: user_id.to_string(),
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|err| AuthError::SignFailed(err.to_string()))?;
        Ok((token, exp))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<UserClaims, AuthError> {
        decode::<UserClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|decoded| decoded.claims)
        .map_err(|_| AuthError::InvalidToken)
    }

    pub fn issue_cross_domain_token(&self, user_id: Uuid, team_slug: &str) -> Result<String, AuthError> {
        let exp = (Utc::now() + Duration::minutes(CROSS_DOMAIN_TTL_MINUTES)).timestamp() as usize;
        let claims = CrossDomainClaims {
            sub: user_id.to_string(),
            team_slug: team_slug.to_string(),
            kind: CROSS_DOMAIN_TOKEN_KIND.to_string(),
            exp,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|err| AuthError::SignFailed(err.to_string()))
    }

    pub fn verify_cross_domain_token(&self, token: &str) -> Result<CrossDomainClaims, AuthError> {
        let claims = decode::<CrossDomainClaims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|decoded| decoded.claims)
        .map_err(|_| AuthError::InvalidToken)?;
        if claims.kind != CROSS_DOMAIN_TOKEN_KIND {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_token_roundtrip() {
        let store = PortalAuthStore::new("secret", 8);
        let user_id = Uuid::new_v4();
        let (token, _exp) = store.issue_access_token(user_id).unwrap();
        let claims = store.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn cross_domain_token_carries_team_slug_and_kind() {
        let store = PortalAuthStore::new("secret", 8);
        let user_id = Uuid::new_v4();
        let token = store.issue_cross_domain_token(user_id, "acme").unwrap();
        let claims = store.verify_cross_domain_token(&token).unwrap();
        assert_eq!(claims.team_slug, "acme");
        assert_eq!(claims.sub, user_id.to_string());
    }

    #[test]
    fn access_token_rejected_by_cross_domain_verify() {
        let store = PortalAuthStore::new("secret", 8);
        let (token, _exp) = store.issue_access_token(Uuid::new_v4()).unwrap();
        assert!(store.verify_cross_domain_token(&token).is_err());
    }
}
