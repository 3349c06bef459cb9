//! User entity — external identity subject.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    /// Stable external subject id from the identity provider, used by
    /// `upsert_user_from_external_identity` to merge on re-login.
    pub external_subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub last_login_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(external_subject: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_subject: external_subject.into(),
            email: email.into().trim().to_lowercase(),
            display_name: None,
            last_login_at: now,
            created_at: now,
            updated_at: now,
        }
    }
}
