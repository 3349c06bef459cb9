//! Workspace entity — a kanban team plus an optional custom application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStatus {
    Provisioning,
    Active,
    Suspended,
    Deleting,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub owner_user_id: Uuid,
    pub app_template_id: Option<Uuid>,
    pub status: WorkspaceStatus,

    // Populated during provisioning. All-null while kanban-only, all-set
    // once app-backed provisioning finalizes (see spec.md §3 invariant).
    pub kanban_team_id: Option<Uuid>,
    pub github_repo_name: Option<String>,
    pub source_branch: Option<String>,
    pub app_database_name: Option<String>,
    pub azure_app_id: Option<String>,
    pub azure_object_id: Option<String>,
    pub azure_secret_encrypted: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(slug: impl Into<String>, name: impl Into<String>, owner_user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            name: name.into(),
            owner_user_id,
            app_template_id: None,
            status: WorkspaceStatus::Provisioning,
            kanban_team_id: None,
            github_repo_name: None,
            source_branch: None,
            app_database_name: None,
            azure_app_id: None,
            azure_object_id: None,
            azure_secret_encrypted: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Is this workspace backed by a custom application (as opposed to
    /// kanban-only)?
    pub fn is_app_backed(&self) -> bool {
        self.app_template_id.is_some()
    }

    /// spec.md §3: app_* fields are all-null or all-set outside of a
    /// provisioning/teardown transient window.
    pub fn app_fields_consistent(&self) -> bool {
        if !self.is_app_backed() {
            return self.github_repo_name.is_none()
                && self.app_database_name.is_none()
                && self.azure_app_id.is_none();
        }
        let all_set = self.github_repo_name.is_some()
            && self.app_database_name.is_some()
            && self.azure_app_id.is_some()
            && self.azure_object_id.is_some();
        let all_null = self.github_repo_name.is_none()
            && self.app_database_name.is_none()
            && self.azure_app_id.is_none()
            && self.azure_object_id.is_none();
        all_set || all_null || matches!(
            self.status,
            WorkspaceStatus::Provisioning | WorkspaceStatus::Deleting
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkspaceRequest {
    pub name: String,
    pub slug: String,
    pub app_template_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub status: WorkspaceStatus,
    pub app_template_id: Option<Uuid>,
    pub kanban_team_id: Option<Uuid>,
    pub github_repo_name: Option<String>,
    pub app_database_name: Option<String>,
    pub azure_app_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Workspace> for WorkspaceSummary {
    fn from(workspace: &Workspace) -> Self {
        Self {
            id: workspace.id,
            slug: workspace.slug.clone(),
            name: workspace.name.clone(),
            status: workspace.status,
            app_template_id: workspace.app_template_id,
            kanban_team_id: workspace.kanban_team_id,
            github_repo_name: workspace.github_repo_name.clone(),
            app_database_name: workspace.app_database_name.clone(),
            azure_app_id: workspace.azure_app_id.clone(),
            created_at: workspace.created_at,
            updated_at: workspace.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanban_only_workspace_has_no_app_fields() {
        let workspace = Workspace::new("acme", "Acme", Uuid::new_v4());
        assert!(!workspace.is_app_backed());
        assert!(workspace.app_fields_consistent());
    }

    #[test]
    fn app_backed_with_partial_fields_during_provisioning_is_consistent() {
        let mut workspace = Workspace::new("shop", "Shop", Uuid::new_v4());
        workspace.app_template_id = Some(Uuid::new_v4());
        workspace.github_repo_name = Some("shop".to_string());
        // status is still Provisioning; app DB/azure fields not set yet.
        assert!(workspace.app_fields_consistent());
    }

    #[test]
    fn app_backed_active_with_partial_fields_is_inconsistent() {
        let mut workspace = Workspace::new("shop", "Shop", Uuid::new_v4());
        workspace.app_template_id = Some(Uuid::new_v4());
        workspace.status = WorkspaceStatus::Active;
        workspace.github_repo_name = Some("shop".to_string());
        assert!(!workspace.app_fields_consistent());
    }
}
