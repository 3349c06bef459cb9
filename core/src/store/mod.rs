//! C1 State Store — the durable entity collections behind the control
//! plane: users, workspaces, sandboxes, teams, memberships, API tokens and
//! app templates.
//!
//! Grounded on the teacher's `gateway/src/auth/store.rs` (`AuthStore`,
//! `load_state`/`persist_state`) for the single-JSON-document,
//! multi-collection layout, and on `core/src/workspace/store.rs`
//! (`WorkspaceStore::persist_snapshot`) for the atomic
//! temp-file/backup/rename write sequence. Where the teacher kept one
//! store per entity kind, this crate holds every collection behind one
//! `RwLock` snapshot so cross-entity invariants (slug uniqueness across
//! workspaces *and* sandboxes, membership uniqueness) can be checked and
//! persisted atomically.

mod snapshot;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{
    normalize_slug, ApiToken, AppTemplate, CreateWorkspaceRequest, Membership, Role, Sandbox,
    SandboxStatus, Team, TeamStatus, TokenOwner, User, Workspace, WorkspaceStatus,
};
use crate::Result;

pub use snapshot::StateSnapshot;

#[derive(Clone)]
pub struct StateStore {
    inner: Arc<RwLock<StateSnapshot>>,
    file_path: std::path::PathBuf,
}

impl StateStore {
    pub async fn new(file_path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let file_path = file_path.into();
        let snapshot = if file_path.exists() {
            let content = tokio::fs::read_to_string(&file_path)
                .await
                .map_err(|e| CoreError::Storage(format!("reading state file: {e}")))?;
            serde_json::from_str(&content)
                .map_err(|e| CoreError::Storage(format!("parsing state file: {e}")))?
        } else {
            StateSnapshot::default()
        };

        Ok(Self {
            inner: Arc::new(RwLock::new(snapshot)),
            file_path,
        })
    }

    async fn persist(&self, snapshot: &StateSnapshot) -> Result<()> {
        let content = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::Storage(format!("creating state directory: {e}")))?;
        }

        let parent = self.file_path.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = parent.join(format!(".{}.tmp", Uuid::new_v4().as_hyphenated()));

        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| CoreError::Storage(format!("writing temp state file: {e}")))?;

        let backup_path = parent.join(format!(".{}.bak", Uuid::new_v4().as_hyphenated()));
        let had_original = tokio::fs::metadata(&self.file_path).await.is_ok();

        if had_original {
            if let Err(err) = tokio::fs::rename(&self.file_path, &backup_path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(CoreError::Storage(format!(
                    "preparing atomic state write: {err}"
                )));
            }
        }

        if let Err(err) = tokio::fs::rename(&temp_path, &self.file_path).await {
            if had_original {
                let _ = tokio::fs::rename(&backup_path, &self.file_path).await;
            }
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CoreError::Storage(format!(
                "finalizing atomic state write: {err}"
            )));
        }

        if had_original {
            let _ = tokio::fs::remove_file(&backup_path).await;
        }

        Ok(())
    }

    fn check_slug_available(
        snapshot: &StateSnapshot,
        reserved_slugs: &[String],
        slug: &str,
        exclude: Option<Uuid>,
    ) -> Result<()> {
        if reserved_slugs.iter().any(|r| r == slug) {
            return Err(CoreError::conflict(format!("slug '{slug}' is reserved")));
        }
        let clashes_workspace = snapshot
            .workspaces
            .values()
            .any(|w| w.slug == slug && Some(w.id) != exclude);
        let clashes_sandbox = snapshot
            .sandboxes
            .values()
            .any(|s| s.full_slug == slug && Some(s.id) != exclude);
        if clashes_workspace || clashes_sandbox {
            return Err(CoreError::conflict(format!(
                "slug '{slug}' is already in use"
            )));
        }
        Ok(())
    }

    // ---- users --------------------------------------------------------

    /// Find the user by external subject, updating email/login time; or
    /// create a new one. Mirrors the teacher's login-time upsert in
    /// `AuthStore::login`.
    pub async fn upsert_user_from_external_identity(
        &self,
        external_subject: &str,
        email: &str,
    ) -> Result<User> {
        let mut guard = self.inner.write().await;
        let normalized_email = email.trim().to_lowercase();

        let existing_id = guard
            .users
            .values()
            .find(|u| u.external_subject == external_subject)
            .map(|u| u.id);

        let user = if let Some(id) = existing_id {
            let user = guard.users.get_mut(&id).expect("checked above");
            user.email = normalized_email;
            user.last_login_at = Utc::now();
            user.updated_at = Utc::now();
            user.clone()
        } else {
            let user = User::new(external_subject, normalized_email);
            guard.users.insert(user.id, user.clone());
            user
        };

        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> Option<User> {
        self.inner.read().await.users.get(&id).cloned()
    }

    pub async fn update_user_display_name(&self, id: Uuid, display_name: String) -> Result<User> {
        let mut guard = self.inner.write().await;
        let user = guard
            .users
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("user not found"))?;
        user.display_name = Some(display_name);
        user.updated_at = Utc::now();
        let user = user.clone();

        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(user)
    }

    // ---- workspaces -----------------------------------------------------

    pub async fn create_workspace(
        &self,
        request: CreateWorkspaceRequest,
        owner_user_id: Uuid,
        reserved_slugs: &[String],
    ) -> Result<Workspace> {
        let slug = normalize_slug(&request.slug)
            .ok_or_else(|| CoreError::validation("workspace slug cannot be empty"))?;

        let app_template_id = match request.app_template_slug.as_deref() {
            Some(template_slug) => {
                let guard = self.inner.read().await;
                let template = guard
                    .app_templates
                    .values()
                    .find(|t| t.slug == template_slug && t.active)
                    .cloned();
                drop(guard);
                Some(
                    template
                        .ok_or_else(|| {
                            CoreError::validation(format!(
                                "unknown or inactive app template '{template_slug}'"
                            ))
                        })?
                        .id,
                )
            }
            None => None,
        };

        let mut guard = self.inner.write().await;
        Self::check_slug_available(&guard, reserved_slugs, &slug, None)?;

        let mut workspace = Workspace::new(slug, request.name, owner_user_id);
        workspace.app_template_id = app_template_id;

        guard.workspaces.insert(workspace.id, workspace.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(workspace)
    }

    pub async fn get_workspace(&self, id: Uuid) -> Option<Workspace> {
        self.inner.read().await.workspaces.get(&id).cloned()
    }

    pub async fn get_workspace_by_slug(&self, slug: &str) -> Option<Workspace> {
        self.inner
            .read()
            .await
            .workspaces
            .values()
            .find(|w| w.slug == slug)
            .cloned()
    }

    pub async fn list_workspaces_owned_by(&self, owner_user_id: Uuid) -> Vec<Workspace> {
        let mut workspaces: Vec<_> = self
            .inner
            .read()
            .await
            .workspaces
            .values()
            .filter(|w| w.owner_user_id == owner_user_id)
            .cloned()
            .collect();
        workspaces.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        workspaces
    }

    pub async fn update_workspace(&self, workspace: Workspace) -> Result<Workspace> {
        let mut guard = self.inner.write().await;
        if !guard.workspaces.contains_key(&workspace.id) {
            return Err(CoreError::not_found(format!(
                "workspace {} not found",
                workspace.id
            )));
        }
        let mut updated = workspace;
        updated.updated_at = Utc::now();
        guard.workspaces.insert(updated.id, updated.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    pub async fn mark_workspace_status(
        &self,
        id: Uuid,
        status: WorkspaceStatus,
    ) -> Result<Workspace> {
        let mut guard = self.inner.write().await;
        let workspace = guard
            .workspaces
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("workspace {id} not found")))?;
        workspace.status = status;
        workspace.updated_at = Utc::now();
        let updated = workspace.clone();
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    // ---- teams ----------------------------------------------------------

    pub async fn create_team(&self, workspace_id: Uuid, slug: impl Into<String>) -> Result<Team> {
        let team = Team::new(workspace_id, slug);
        let mut guard = self.inner.write().await;
        guard.teams.insert(team.id, team.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(team)
    }

    pub async fn get_team(&self, id: Uuid) -> Option<Team> {
        self.inner.read().await.teams.get(&id).cloned()
    }

    pub async fn get_team_for_workspace(&self, workspace_id: Uuid) -> Option<Team> {
        self.inner
            .read()
            .await
            .teams
            .values()
            .find(|t| t.workspace_id == workspace_id)
            .cloned()
    }

    pub async fn mark_team_status(&self, id: Uuid, status: TeamStatus) -> Result<Team> {
        let mut guard = self.inner.write().await;
        let team = guard
            .teams
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("team {id} not found")))?;
        team.status = status;
        team.updated_at = Utc::now();
        let updated = team.clone();
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    // ---- sandboxes --------------------------------------------------------

    pub async fn create_sandbox(
        &self,
        workspace_id: Uuid,
        slug: impl Into<String>,
        source_branch: impl Into<String>,
        agent_webhook_secret: impl Into<String>,
        reserved_slugs: &[String],
    ) -> Result<Sandbox> {
        let slug = slug.into();
        let mut guard = self.inner.write().await;
        let workspace = guard
            .workspaces
            .get(&workspace_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("workspace {workspace_id} not found")))?;

        let sandbox = Sandbox::new(
            workspace_id,
            &workspace.slug,
            slug,
            source_branch,
            agent_webhook_secret,
        );
        Self::check_slug_available(&guard, reserved_slugs, &sandbox.full_slug, None)?;

        guard.sandboxes.insert(sandbox.id, sandbox.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(sandbox)
    }

    pub async fn get_sandbox(&self, id: Uuid) -> Option<Sandbox> {
        self.inner.read().await.sandboxes.get(&id).cloned()
    }

    pub async fn list_sandboxes_for_workspace(&self, workspace_id: Uuid) -> Vec<Sandbox> {
        let mut sandboxes: Vec<_> = self
            .inner
            .read()
            .await
            .sandboxes
            .values()
            .filter(|s| s.workspace_id == workspace_id)
            .cloned()
            .collect();
        sandboxes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        sandboxes
    }

    pub async fn mark_sandbox_status(&self, id: Uuid, status: SandboxStatus) -> Result<Sandbox> {
        let mut guard = self.inner.write().await;
        let sandbox = guard
            .sandboxes
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("sandbox {id} not found")))?;
        sandbox.status = status;
        sandbox.updated_at = Utc::now();
        let updated = sandbox.clone();
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    pub async fn remove_sandbox(&self, id: Uuid) -> Result<Option<Sandbox>> {
        let mut guard = self.inner.write().await;
        let Some(removed) = guard.sandboxes.remove(&id) else {
            return Ok(None);
        };
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(Some(removed))
    }

    // ---- memberships ------------------------------------------------------

    pub async fn add_membership(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        let mut guard = self.inner.write().await;
        if guard
            .memberships
            .values()
            .any(|m| m.team_id == team_id && m.user_id == user_id)
        {
            return Err(CoreError::conflict("user is already a member of this team"));
        }
        let membership = Membership::new(team_id, user_id, role);
        guard.memberships.insert(membership.id, membership.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(membership)
    }

    pub async fn get_membership(&self, team_id: Uuid, user_id: Uuid) -> Option<Membership> {
        self.inner
            .read()
            .await
            .memberships
            .values()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .cloned()
    }

    pub async fn list_memberships_for_team(&self, team_id: Uuid) -> Vec<Membership> {
        let mut memberships: Vec<_> = self
            .inner
            .read()
            .await
            .memberships
            .values()
            .filter(|m| m.team_id == team_id)
            .cloned()
            .collect();
        memberships.sort_by(|a, b| a.joined_at.cmp(&b.joined_at));
        memberships
    }

    pub async fn update_membership_role(
        &self,
        team_id: Uuid,
        user_id: Uuid,
        role: Role,
    ) -> Result<Membership> {
        let mut guard = self.inner.write().await;
        let membership = guard
            .memberships
            .values_mut()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .ok_or_else(|| CoreError::not_found("membership not found"))?;
        membership.role = role;
        let updated = membership.clone();
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    pub async fn remove_membership(&self, team_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut guard = self.inner.write().await;
        let id = guard
            .memberships
            .values()
            .find(|m| m.team_id == team_id && m.user_id == user_id)
            .map(|m| m.id);
        let Some(id) = id else {
            return Err(CoreError::not_found("membership not found"));
        };
        guard.memberships.remove(&id);
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(())
    }

    // ---- api tokens --------------------------------------------------------

    pub async fn insert_api_token(&self, token: ApiToken) -> Result<ApiToken> {
        let mut guard = self.inner.write().await;
        guard.api_tokens.insert(token.id, token.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(token)
    }

    pub async fn get_api_token_by_hash(&self, token_hash: &str) -> Option<ApiToken> {
        self.inner
            .read()
            .await
            .api_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned()
    }

    pub async fn list_api_tokens_for_owner(
        &self,
        owner: TokenOwner,
        created_by_user: Uuid,
        team_id: Option<Uuid>,
    ) -> Vec<ApiToken> {
        let mut tokens: Vec<_> = self
            .inner
            .read()
            .await
            .api_tokens
            .values()
            .filter(|t| t.owner == owner && t.created_by_user == created_by_user && t.team_id == team_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tokens
    }

    pub async fn touch_api_token(&self, id: Uuid) -> Result<()> {
        let mut guard = self.inner.write().await;
        let token = guard
            .api_tokens
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("api token {id} not found")))?;
        token.last_used_at = Some(Utc::now());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(())
    }

    pub async fn revoke_api_token(&self, id: Uuid) -> Result<ApiToken> {
        let mut guard = self.inner.write().await;
        let token = guard
            .api_tokens
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("api token {id} not found")))?;
        token.active = false;
        token.updated_at = Utc::now();
        let updated = token.clone();
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(updated)
    }

    // ---- app templates ------------------------------------------------------

    pub async fn list_app_templates(&self) -> Vec<AppTemplate> {
        let mut templates: Vec<_> = self
            .inner
            .read()
            .await
            .app_templates
            .values()
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.slug.cmp(&b.slug));
        templates
    }

    pub async fn get_app_template_by_slug(&self, slug: &str) -> Option<AppTemplate> {
        self.inner
            .read()
            .await
            .app_templates
            .values()
            .find(|t| t.slug == slug)
            .cloned()
    }

    pub async fn get_app_template(&self, id: Uuid) -> Option<AppTemplate> {
        self.inner.read().await.app_templates.get(&id).cloned()
    }

    pub async fn insert_app_template(&self, template: AppTemplate) -> Result<AppTemplate> {
        let mut guard = self.inner.write().await;
        if guard.app_templates.values().any(|t| t.slug == template.slug) {
            return Err(CoreError::conflict(format!(
                "app template '{}' already exists",
                template.slug
            )));
        }
        guard.app_templates.insert(template.id, template.clone());
        let snapshot = guard.clone();
        drop(guard);
        self.persist(&snapshot).await?;
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> Vec<String> {
        vec!["app".to_string(), "api".to_string()]
    }

    #[tokio::test]
    async fn create_workspace_rejects_reserved_and_duplicate_slugs() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json")).await.unwrap();
        let owner = Uuid::new_v4();

        let reserved_slug_request = CreateWorkspaceRequest {
            name: "App".to_string(),
            slug: "app".to_string(),
            app_template_slug: None,
        };
        assert!(store
            .create_workspace(reserved_slug_request, owner, &reserved())
            .await
            .is_err());

        let request = CreateWorkspaceRequest {
            name: "Acme".to_string(),
            slug: "acme".to_string(),
            app_template_slug: None,
        };
        let created = store
            .create_workspace(request.clone(), owner, &reserved())
            .await
            .unwrap();
        assert_eq!(created.slug, "acme");

        let duplicate = store.create_workspace(request, owner, &reserved()).await;
        assert!(matches!(duplicate, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn sandbox_slug_must_be_globally_unique_against_workspaces() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json")).await.unwrap();
        let owner = Uuid::new_v4();

        let workspace = store
            .create_workspace(
                CreateWorkspaceRequest {
                    name: "Shop".to_string(),
                    slug: "shop".to_string(),
                    app_template_slug: None,
                },
                owner,
                &reserved(),
            )
            .await
            .unwrap();

        let sandbox = store
            .create_sandbox(workspace.id, "feat-x", "main", "secret", &reserved())
            .await
            .unwrap();
        assert_eq!(sandbox.full_slug, "shop-feat-x");

        // Creating another workspace whose slug collides with the sandbox's
        // full_slug must fail.
        let collide = store
            .create_workspace(
                CreateWorkspaceRequest {
                    name: "Collide".to_string(),
                    slug: "shop-feat-x".to_string(),
                    app_template_slug: None,
                },
                owner,
                &reserved(),
            )
            .await;
        assert!(matches!(collide, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn membership_uniqueness_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json")).await.unwrap();
        let owner = Uuid::new_v4();
        let workspace = store
            .create_workspace(
                CreateWorkspaceRequest {
                    name: "Acme".to_string(),
                    slug: "acme".to_string(),
                    app_template_slug: None,
                },
                owner,
                &reserved(),
            )
            .await
            .unwrap();
        let team = store.create_team(workspace.id, "acme").await.unwrap();

        store
            .add_membership(team.id, owner, Role::Owner)
            .await
            .unwrap();
        let duplicate = store.add_membership(team.id, owner, Role::Admin).await;
        assert!(matches!(duplicate, Err(CoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn state_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let owner = Uuid::new_v4();
        {
            let store = StateStore::new(&path).await.unwrap();
            store
                .create_workspace(
                    CreateWorkspaceRequest {
                        name: "Acme".to_string(),
                        slug: "acme".to_string(),
                        app_template_slug: None,
                    },
                    owner,
                    &reserved(),
                )
                .await
                .unwrap();
        }

        let reloaded = StateStore::new(&path).await.unwrap();
        let workspace = reloaded.get_workspace_by_slug("acme").await;
        assert!(workspace.is_some());
    }

    #[tokio::test]
    async fn update_user_display_name_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json")).await.unwrap();
        let user = store
            .upsert_user_from_external_identity("subject-1", "person@example.com")
            .await
            .unwrap();
        assert!(user.display_name.is_none());

        let updated = store
            .update_user_display_name(user.id, "Person One".to_string())
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Person One"));

        assert!(store
            .update_user_display_name(Uuid::new_v4(), "Nobody".to_string())
            .await
            .is_err());
    }
}
