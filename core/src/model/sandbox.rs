//! Sandbox entity — an ephemeral, branch-scoped clone of a workspace's app.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStatus {
    Provisioning,
    Active,
    Suspended,
    Deleting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub slug: String,
    /// `{workspace_slug}-{sandbox_slug}`, globally unique, used for all
    /// external naming (containers, DNS, DB).
    pub full_slug: String,
    pub source_branch: String,
    pub branch_name: String,
    pub database_name: String,
    pub agent_container_name: String,
    pub agent_webhook_secret: String,
    pub status: SandboxStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sandbox {
    pub fn new(
        workspace_id: Uuid,
        workspace_slug: &str,
        slug: impl Into<String>,
        source_branch: impl Into<String>,
        agent_webhook_secret: impl Into<String>,
    ) -> Self {
        let slug = slug.into();
        let full_slug = format!("{}-{}", workspace_slug, slug);
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            branch_name: format!("sandbox/{}", full_slug),
            database_name: full_slug.replace('-', "_"),
            agent_container_name: format!("kanban-agent-{}", full_slug),
            full_slug,
            slug,
            source_branch: source_branch.into(),
            agent_webhook_secret: agent_webhook_secret.into(),
            status: SandboxStatus::Provisioning,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_slug_and_derived_names_match_spec_naming() {
        let sandbox = Sandbox::new(Uuid::new_v4(), "shop", "feat-x", "main", "deadbeef");
        assert_eq!(sandbox.full_slug, "shop-feat-x");
        assert_eq!(sandbox.branch_name, "sandbox/shop-feat-x");
        assert_eq!(sandbox.database_name, "shop_feat_x");
        assert_eq!(sandbox.agent_container_name, "kanban-agent-shop-feat-x");
    }
}
