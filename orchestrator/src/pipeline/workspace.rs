//! `workspace.provision` / `workspace.delete` / `workspace.restart` /
//! `workspace.start` pipelines.
//!
//! `workspace.provision` is the 4-step umbrella pipeline from
//! `orchestrator/app/main.py`: validate, create the tenant kanban team (by
//! dispatching a `team.provision` sub-task and waiting for it to settle),
//! run the app-backed steps (repo/db/identity/containers) when the
//! workspace has a template, then finalize and publish.

use std::collections::HashMap;
use std::time::Duration;

use cp_adapters::ContainerSpec;
use cp_core::broker::payload::{TeamProvisionPayload, WorkspaceLifecyclePayload, WorkspaceProvisionPayload};
use cp_core::broker::{Priority, TaskStatus, TaskType};
use cp_core::model::WorkspaceStatus;
use tokio::time::Instant;
use uuid::Uuid;

use super::PipelineRunner;
use crate::error::{OrchestratorError, Result};

fn app_container_name(slug: &str) -> String {
    format!("kanban-app-{slug}-api-1")
}

fn app_web_container_name(slug: &str) -> String {
    format!("kanban-app-{slug}-web-1")
}

const TOTAL_STEPS: u32 = 4;
const SUB_TASK_POLL_INTERVAL: Duration = Duration::from_secs(2);
const SUB_TASK_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn provision(runner: &PipelineRunner, task_id: Uuid, payload: WorkspaceProvisionPayload) -> Result<()> {
    runner.report(task_id, 1, TOTAL_STEPS, "validating workspace").await;
    let workspace = runner
        .deps()
        .store
        .get_workspace(payload.workspace_id)
        .await
        .ok_or_else(|| OrchestratorError::step_failed("validate", "workspace not found"))?;

    runner
        .report(task_id, 2, TOTAL_STEPS, "provisioning tenant kanban team")
        .await;
    let team = runner
        .deps()
        .store
        .create_team(workspace.id, &workspace.slug)
        .await?;
    let sub_task = runner
        .enqueue(
            TaskType::TeamProvision(TeamProvisionPayload {
                workspace_id: workspace.id,
                team_id: team.id,
                slug: workspace.slug.clone(),
                github_repo_name: workspace.github_repo_name.clone(),
                app_database_name: workspace.app_database_name.clone(),
            }),
            Priority::High,
        )
        .await;
    wait_for_sub_task(runner, sub_task.id).await?;

    let mut app_fields: Option<AppProvisionResult> = None;
    if workspace.is_app_backed() {
        runner
            .report(task_id, 3, TOTAL_STEPS, "provisioning app-backed resources")
            .await;
        app_fields = Some(provision_app_resources(runner, &workspace).await?);
    } else {
        runner.report(task_id, 3, TOTAL_STEPS, "kanban-only workspace, skipping app provisioning").await;
    }

    runner.report(task_id, 4, TOTAL_STEPS, "finalizing workspace").await;
    let mut updated = runner
        .deps()
        .store
        .get_workspace(workspace.id)
        .await
        .ok_or_else(|| OrchestratorError::step_failed("finalize", "workspace disappeared"))?;
    updated.kanban_team_id = Some(team.id);
    if let Some(app) = app_fields {
        updated.github_repo_name = Some(app.github_repo_name);
        updated.app_database_name = Some(app.app_database_name);
        updated.azure_app_id = Some(app.azure_app_id);
        updated.azure_object_id = Some(app.azure_object_id);
        updated.azure_secret_encrypted = Some(app.azure_secret_encrypted);
    }
    runner.deps().store.update_workspace(updated).await?;
    runner
        .deps()
        .store
        .mark_workspace_status(workspace.id, WorkspaceStatus::Active)
        .await?;
    Ok(())
}

struct AppProvisionResult {
    github_repo_name: String,
    app_database_name: String,
    azure_app_id: String,
    azure_object_id: String,
    azure_secret_encrypted: String,
}

/// Steps 3a-3d of `workspace.provision`: generate the app's repository from
/// its template, carve out an empty application database, register it with
/// the identity provider, and start its api/web containers.
async fn provision_app_resources(runner: &PipelineRunner, workspace: &cp_core::model::Workspace) -> Result<AppProvisionResult> {
    let deps = runner.deps();
    let template_id = workspace
        .app_template_id
        .ok_or_else(|| OrchestratorError::step_failed("provision_app", "workspace has no app template"))?;
    let template = deps
        .store
        .get_app_template(template_id)
        .await
        .ok_or_else(|| OrchestratorError::step_failed("provision_app", "app template not found"))?;

    // 3a. repository
    let repo = deps
        .repository
        .create_from_template(&template.template_owner, &template.template_repo, &deps.github_owner, &workspace.slug)
        .await?;

    // 3b. application database
    let app_database_name = format!("{}_app", workspace.slug.replace('-', "_"));
    let app_container = app_container_name(&workspace.slug);
    deps.database.create_database(&app_container, &app_database_name).await?;

    // 3c. identity — redirect URIs cover the workspace app host plus every
    // sandbox currently hanging off this workspace.
    let app_host = format!("{}.app.{}", workspace.slug, deps.base_domain);
    let mut redirect_uris = vec![format!("https://{app_host}/auth/callback")];
    for sandbox in deps.store.list_sandboxes_for_workspace(workspace.id).await {
        let sandbox_host = format!("{}.{}", sandbox.full_slug, deps.base_domain);
        redirect_uris.push(format!("https://{sandbox_host}/auth/callback"));
    }
    let registration = deps
        .identity
        .create_app_registration(&format!("kanban-app-{}", workspace.slug), &redirect_uris)
        .await?;

    // 3d. containers: api + web, host-routed and TLS-enabled
    let web_container = app_web_container_name(&workspace.slug);
    deps.dns.add_record(&app_host, "127.0.0.1").await?;
    deps.dns.wait_propagation(&app_host).await?;
    deps.tls.issue(&app_host).await?;
    deps.containers
        .create(ContainerSpec {
            name: app_container.clone(),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([
                ("DATABASE_NAME".to_string(), app_database_name.clone()),
                ("GITHUB_REPO".to_string(), repo.name.clone()),
            ]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.workspace".to_string(), workspace.slug.clone()),
                ("cp.route.host".to_string(), app_host.clone()),
                ("cp.route.path".to_string(), "/api/*".to_string()),
                ("cp.route.strip_prefix".to_string(), "/api".to_string()),
                ("cp.route.port".to_string(), "8000".to_string()),
                ("cp.route.tls".to_string(), "true".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;
    deps.containers
        .create(ContainerSpec {
            name: web_container,
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([("GITHUB_REPO".to_string(), repo.name.clone())]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.workspace".to_string(), workspace.slug.clone()),
                ("cp.route.host".to_string(), app_host.clone()),
                ("cp.route.path".to_string(), "/*".to_string()),
                ("cp.route.port".to_string(), "80".to_string()),
                ("cp.route.tls".to_string(), "true".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;

    Ok(AppProvisionResult {
        github_repo_name: repo.name,
        app_database_name,
        azure_app_id: registration.app_id,
        azure_object_id: registration.object_id,
        azure_secret_encrypted: registration.client_secret,
    })
}

async fn wait_for_sub_task(runner: &PipelineRunner, sub_task_id: Uuid) -> Result<()> {
    let deadline = Instant::now() + SUB_TASK_TIMEOUT;
    loop {
        let task = runner
            .deps()
            .broker
            .get(sub_task_id)
            .await
            .ok_or_else(|| OrchestratorError::step_failed("team.provision", "sub-task disappeared"))?;
        match task.status {
            TaskStatus::Completed => return Ok(()),
            TaskStatus::Failed => {
                return Err(OrchestratorError::step_failed(
                    "team.provision",
                    task.error.unwrap_or_else(|| "sub-task failed".to_string()),
                ))
            }
            TaskStatus::Cancelled => {
                return Err(OrchestratorError::step_failed("team.provision", "sub-task cancelled"))
            }
            TaskStatus::Pending | TaskStatus::Running => {
                if Instant::now() >= deadline {
                    return Err(OrchestratorError::Timeout {
                        seconds: SUB_TASK_TIMEOUT.as_secs(),
                    });
                }
                tokio::time::sleep(SUB_TASK_POLL_INTERVAL).await;
            }
        }
    }
}

/// Best-effort reverse of provisioning: continues past individual step
/// failures so the workspace still ends up marked deleted.
pub async fn delete(runner: &PipelineRunner, task_id: Uuid, payload: WorkspaceLifecyclePayload) -> Result<()> {
    runner.report(task_id, 1, 1, "tearing down workspace").await;
    let Some(workspace) = runner.deps().store.get_workspace(payload.workspace_id).await else {
        return Ok(());
    };

    if let Some(team) = runner.deps().store.get_team_for_workspace(workspace.id).await {
        let sub_task = runner
            .enqueue(
                TaskType::TeamDelete(cp_core::broker::payload::TeamLifecyclePayload { team_id: team.id }),
                Priority::High,
            )
            .await;
        if let Err(err) = wait_for_sub_task(runner, sub_task.id).await {
            tracing::warn!(%err, workspace_id = %workspace.id, "team teardown reported an error, continuing");
        }
    }

    runner
        .deps()
        .store
        .mark_workspace_status(workspace.id, WorkspaceStatus::Deleting)
        .await?;
    Ok(())
}

pub async fn restart(runner: &PipelineRunner, task_id: Uuid, payload: WorkspaceLifecyclePayload) -> Result<()> {
    runner.report(task_id, 1, 1, "restarting workspace team").await;
    let Some(team) = runner.deps().store.get_team_for_workspace(payload.workspace_id).await else {
        return Err(OrchestratorError::step_failed("restart", "no team for workspace"));
    };
    let sub_task = runner
        .enqueue(
            TaskType::TeamRestart(cp_core::broker::payload::TeamLifecyclePayload { team_id: team.id }),
            Priority::High,
        )
        .await;
    wait_for_sub_task(runner, sub_task.id).await
}

pub async fn start(runner: &PipelineRunner, task_id: Uuid, payload: WorkspaceLifecyclePayload) -> Result<()> {
    runner.report(task_id, 1, 1, "starting workspace team").await;
    let Some(team) = runner.deps().store.get_team_for_workspace(payload.workspace_id).await else {
        return Err(OrchestratorError::step_failed("start", "no team for workspace"));
    };
    let sub_task = runner
        .enqueue(
            TaskType::TeamStart(cp_core::broker::payload::TeamLifecyclePayload { team_id: team.id }),
            Priority::High,
        )
        .await;
    wait_for_sub_task(runner, sub_task.id).await?;
    runner
        .deps()
        .store
        .mark_workspace_status(payload.workspace_id, WorkspaceStatus::Active)
        .await?;
    Ok(())
}
