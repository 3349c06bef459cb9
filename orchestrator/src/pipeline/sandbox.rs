//! `sandbox.provision` and lifecycle pipelines — the 8-step ephemeral
//! branch-scoped clone bring-up.

use std::collections::HashMap;

use cp_adapters::{CloneMode, ContainerSpec};
use cp_core::broker::payload::{SandboxLifecyclePayload, SandboxProvisionPayload};
use cp_core::model::{SandboxStatus, WorkspaceStatus};
use rand::RngCore;
use uuid::Uuid;

use super::PipelineRunner;
use crate::error::{OrchestratorError, Result};

const TOTAL_STEPS: u32 = 8;

fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub async fn provision(runner: &PipelineRunner, task_id: Uuid, payload: SandboxProvisionPayload) -> Result<()> {
    let deps = runner.deps();

    // 1. validate parent active + app-backed
    runner.report(task_id, 1, TOTAL_STEPS, "validating parent workspace").await;
    let workspace = deps
        .store
        .get_workspace(payload.workspace_id)
        .await
        .ok_or_else(|| OrchestratorError::step_failed("validate_parent", "workspace not found"))?;
    if workspace.status != WorkspaceStatus::Active {
        return Err(OrchestratorError::step_failed("validate_parent", "workspace is not active"));
    }
    if !workspace.is_app_backed() {
        return Err(OrchestratorError::step_failed(
            "validate_parent",
            "sandboxes require an app-backed workspace",
        ));
    }
    let repo_name = workspace
        .github_repo_name
        .clone()
        .ok_or_else(|| OrchestratorError::step_failed("validate_parent", "workspace has no repository"))?;

    let secret = generate_webhook_secret();
    let sandbox = deps
        .store
        .create_sandbox(
            workspace.id,
            &payload.slug,
            &payload.source_branch,
            &secret,
            &[],
        )
        .await?;

    // 2. create branch
    runner.report(task_id, 2, TOTAL_STEPS, "creating sandbox branch").await;
    deps.repository
        .branch_create(&workspace.slug, &repo_name, &sandbox.branch_name, &payload.source_branch)
        .await?;

    // 3. clone DB direct-pipe
    runner.report(task_id, 3, TOTAL_STEPS, "cloning sandbox database").await;
    let source_db = workspace
        .app_database_name
        .clone()
        .ok_or_else(|| OrchestratorError::step_failed("clone_database", "workspace has no database"))?;
    let source_container = format!("kanban-team-{}-api-1", workspace.slug);
    deps.database
        .clone(
            &source_container,
            &source_db,
            &source_container,
            &sandbox.database_name,
            CloneMode::DirectPipe,
        )
        .await?;

    // 4. start containers: api + web, routed for the sandbox's own host
    runner.report(task_id, 4, TOTAL_STEPS, "starting sandbox app containers").await;
    let app_container = format!("kanban-sandbox-{}-api-1", sandbox.full_slug);
    let web_container = format!("kanban-sandbox-{}-web-1", sandbox.full_slug);
    let sandbox_host = format!("{}.sandbox.{}", sandbox.full_slug, deps.base_domain);
    deps.containers
        .create(ContainerSpec {
            name: app_container.clone(),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([
                ("DATABASE_NAME".to_string(), sandbox.database_name.clone()),
                ("GIT_BRANCH".to_string(), sandbox.branch_name.clone()),
            ]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.sandbox".to_string(), sandbox.full_slug.clone()),
                ("cp.route.host".to_string(), sandbox_host.clone()),
                ("cp.route.path".to_string(), "/api/*".to_string()),
                ("cp.route.strip_prefix".to_string(), "/api".to_string()),
                ("cp.route.port".to_string(), "8000".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;
    deps.containers
        .create(ContainerSpec {
            name: web_container.clone(),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([("GIT_BRANCH".to_string(), sandbox.branch_name.clone())]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.sandbox".to_string(), sandbox.full_slug.clone()),
                ("cp.route.host".to_string(), sandbox_host.clone()),
                ("cp.route.path".to_string(), "/*".to_string()),
                ("cp.route.port".to_string(), "80".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;

    // 5. provision dedicated agent container
    runner.report(task_id, 5, TOTAL_STEPS, "provisioning dedicated agent container").await;
    deps.containers
        .create(ContainerSpec {
            name: sandbox.agent_container_name.clone(),
            image: deps.agent_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([
                ("AGENT_WEBHOOK_SECRET".to_string(), sandbox.agent_webhook_secret.clone()),
                ("SANDBOX_SLUG".to_string(), sandbox.full_slug.clone()),
            ]),
            mounts: vec![],
            labels: HashMap::from([("cp.sandbox".to_string(), sandbox.full_slug.clone())]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;

    // 6. issue TLS
    runner.report(task_id, 6, TOTAL_STEPS, "issuing TLS certificate").await;
    let host = format!("{}.{}", sandbox.full_slug, deps.base_domain);
    deps.dns.add_record(&host, "127.0.0.1").await?;
    deps.dns.wait_propagation(&host).await?;
    deps.tls.issue(&host).await?;

    // 7. update identity redirect URIs
    runner.report(task_id, 7, TOTAL_STEPS, "updating identity redirect URIs").await;
    if let Some(object_id) = workspace.azure_object_id.clone() {
        let redirect_uri = format!("https://{host}/auth/callback");
        deps.identity
            .update_redirect_uris(&object_id, &[redirect_uri])
            .await?;
    }

    // 8. publish sandbox:status
    runner.report(task_id, 8, TOTAL_STEPS, "publishing sandbox status").await;
    deps.store.mark_sandbox_status(sandbox.id, SandboxStatus::Active).await?;
    Ok(())
}

/// Best-effort reverse of provisioning: on completion, status=deleted
/// removal of the C1 row is performed by the caller (the gateway's task
/// event listener), not here — this pipeline only tears down external
/// resources and marks the sandbox `Deleting`.
pub async fn delete(runner: &PipelineRunner, task_id: Uuid, payload: SandboxLifecyclePayload) -> Result<()> {
    let deps = runner.deps();
    runner.report(task_id, 1, 1, "tearing down sandbox").await;

    let Some(sandbox) = deps.store.get_sandbox(payload.sandbox_id).await else {
        return Ok(());
    };

    let app_container = format!("kanban-sandbox-{}-api-1", sandbox.full_slug);
    let web_container = format!("kanban-sandbox-{}-web-1", sandbox.full_slug);
    if let Err(err) = deps.containers.remove(&app_container).await {
        tracing::warn!(%err, sandbox = %sandbox.full_slug, "failed to remove sandbox app container");
    }
    if let Err(err) = deps.containers.remove(&web_container).await {
        tracing::warn!(%err, sandbox = %sandbox.full_slug, "failed to remove sandbox web container");
    }
    if let Err(err) = deps.containers.remove(&sandbox.agent_container_name).await {
        tracing::warn!(%err, sandbox = %sandbox.full_slug, "failed to remove sandbox agent container");
    }
    let host = format!("{}.{}", sandbox.full_slug, deps.base_domain);
    if let Err(err) = deps.tls.revoke(&host).await {
        tracing::warn!(%err, sandbox = %sandbox.full_slug, "failed to revoke sandbox TLS cert");
    }
    if let Err(err) = deps.dns.remove_record(&host).await {
        tracing::warn!(%err, sandbox = %sandbox.full_slug, "failed to remove sandbox DNS record");
    }

    let workspace_slug = deps
        .store
        .get_workspace(sandbox.workspace_id)
        .await
        .map(|w| w.slug)
        .unwrap_or_else(|| sandbox.workspace_id.to_string());
    let source_container = format!("kanban-team-{workspace_slug}-api-1");
    if let Err(err) = deps.database.delete(&source_container, &sandbox.database_name).await {
        tracing::warn!(%err, sandbox = %sandbox.full_slug, "failed to delete sandbox database");
    }

    deps.store.mark_sandbox_status(sandbox.id, SandboxStatus::Deleting).await?;
    Ok(())
}

pub async fn agent_restart(runner: &PipelineRunner, task_id: Uuid, payload: SandboxLifecyclePayload) -> Result<()> {
    let deps = runner.deps();
    let sandbox = deps
        .store
        .get_sandbox(payload.sandbox_id)
        .await
        .ok_or_else(|| OrchestratorError::step_failed("agent_restart", "sandbox not found"))?;

    runner.report(task_id, 1, 2, "stopping sandbox agent container").await;
    deps.containers.remove(&sandbox.agent_container_name).await?;

    runner.report(task_id, 2, 2, "restarting sandbox agent container").await;
    deps.containers
        .create(ContainerSpec {
            name: sandbox.agent_container_name.clone(),
            image: deps.agent_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([
                ("AGENT_WEBHOOK_SECRET".to_string(), sandbox.agent_webhook_secret.clone()),
                ("SANDBOX_SLUG".to_string(), sandbox.full_slug.clone()),
            ]),
            mounts: vec![],
            labels: HashMap::from([("cp.sandbox".to_string(), sandbox.full_slug.clone())]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;
    Ok(())
}
