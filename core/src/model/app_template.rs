//! AppTemplate entity — registry entry for a workspace's optional custom app.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTemplate {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub template_owner: String,
    pub template_repo: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppTemplate {
    pub fn new(
        slug: impl Into<String>,
        display_name: impl Into<String>,
        template_owner: impl Into<String>,
        template_repo: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            display_name: display_name.into(),
            template_owner: template_owner.into(),
            template_repo: template_repo.into(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}
