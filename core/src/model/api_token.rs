//! APIToken entity — opaque bearer credential for machine callers.
//!
//! Grounded on the teacher's API-key generation/hashing in
//! `gateway/src/auth/store.rs` (`generate_api_key_token`/
//! `hash_api_key_token`), with two changes per DESIGN.md's Open Question
//! resolutions: prefix `pk_` (spec.md §4.5a) instead of `vk_`, and a hex
//! digest instead of base64 (spec.md §3's `sha256(secret)_hex`).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const TOKEN_PREFIX: &str = "pk_";

/// A `category:action` capability string, or `*` for full access.
pub type Scope = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenOwner {
    /// Portal-scope: bound to the user, valid across any team they belong
    /// to.
    Portal,
    /// Team-scope: bound to a single team.
    Team,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiToken {
    pub id: Uuid,
    pub name: String,
    pub token_hash: String,
    pub scopes: Vec<Scope>,
    pub created_by_user: Uuid,
    pub owner: TokenOwner,
    pub team_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiToken {
    pub fn is_usable(&self) -> bool {
        self.active
            && self
                .expires_at
                .map(|expiry| expiry > Utc::now())
                .unwrap_or(true)
    }

    /// spec.md §4.5(a)'s `has_scope`: `*` present, `required` present
    /// literally, or `{category}:*` present where
    /// `category = required.split(':').next()`.
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
}

/// Result of creating a token: the plaintext secret is returned exactly
/// once, per spec.md §3's invariant.
pub struct CreatedApiToken {
    pub token: ApiToken,
    pub plaintext: String,
}

/// Generate a new bearer value and its stored, hashed representation.
pub fn generate_token() -> (String, String) {
    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let token = format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes));
    let hash = hash_token(&token);
    (token, hash)
}

/// `sha256(secret)_hex` over the bearer value minus its `pk_` prefix, per
/// spec.md §4.5(a): "hashes the bearer value (minus prefix) with SHA-256".
pub fn hash_token(token: &str) -> String {
    let secret = token.strip_prefix(TOKEN_PREFIX).unwrap_or(token);
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(scopes: &[&str]) -> ApiToken {
        ApiToken {
            id: Uuid::new_v4(),
            name: "ci".to_string(),
            token_hash: "irrelevant".to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            created_by_user: Uuid::new_v4(),
            owner: TokenOwner::Team,
            team_id: Some(Uuid::new_v4()),
            expires_at: None,
            active: true,
            last_used_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn wildcard_scope_grants_everything() {
        assert!(token(&["*"]).has_scope("teams:write"));
    }

    #[test]
    fn literal_scope_match() {
        assert!(token(&["teams:read"]).has_scope("teams:read"));
        assert!(!token(&["teams:read"]).has_scope("teams:write"));
    }

    #[test]
    fn category_wildcard_scope_match() {
        assert!(token(&["teams:*"]).has_scope("teams:write"));
        assert!(!token(&["teams:*"]).has_scope("workspaces:write"));
    }

    #[test]
    fn generated_token_hash_matches_sha256_hex_of_secret_without_prefix() {
        let (token, hash) = generate_token();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(hash, hash_token(&token));
        assert_eq!(hash.len(), 64);
    }
}
