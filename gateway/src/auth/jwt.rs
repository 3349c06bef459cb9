//! JWT claim shapes.
//!
//! Grounded on the teacher's `UserJwtClaims`/`HostJwtClaims`
//! (`auth/jwt.rs`): one struct per token purpose, HS256 throughout.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub exp: usize,
}

/// One-time cross-domain SSO token, grounded on the original source's
/// `create_cross_domain_token`/`verify_cross_domain_token` (5 minute TTL,
/// single-use in spirit though not tracked server-side here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossDomainClaims {
    pub sub: String,
    pub team_slug: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub exp: usize,
}

pub const CROSS_DOMAIN_TOKEN_KIND: &str = "cross_domain";
