//! `team.provision` and lifecycle pipelines — the 11-step tenant bring-up
//! preserved exactly in order from `orchestrator/app/main.py`.

use std::collections::HashMap;
use std::time::Duration;

use cp_adapters::ContainerSpec;
use cp_core::broker::payload::{TeamLifecyclePayload, TeamProvisionPayload};
use cp_core::model::TeamStatus;
use uuid::Uuid;

use super::PipelineRunner;
use crate::error::{OrchestratorError, Result};

const TOTAL_STEPS: u32 = 11;
const HEALTH_CHECK_ATTEMPTS: u32 = 30;
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(2);

fn fqdn(base_domain: &str, slug: &str) -> String {
    format!("{slug}.{base_domain}")
}

fn container_name(slug: &str) -> String {
    format!("kanban-team-{slug}-api-1")
}

fn web_container_name(slug: &str) -> String {
    format!("kanban-team-{slug}-web-1")
}

pub async fn provision(runner: &PipelineRunner, task_id: Uuid, payload: TeamProvisionPayload) -> Result<()> {
    let deps = runner.deps();

    // 1. validate slug
    runner.report(task_id, 1, TOTAL_STEPS, "validating team slug").await;
    if payload.slug.trim().is_empty() {
        return Err(OrchestratorError::step_failed("validate_slug", "team slug cannot be empty"));
    }

    // 2. create dir tree
    runner.report(task_id, 2, TOTAL_STEPS, "creating tenant directory tree").await;
    let tenant_dir = deps.tenants_root.join(&payload.slug);
    tokio::fs::create_dir_all(&tenant_dir)
        .await
        .map_err(|e| OrchestratorError::step_failed("create_dir_tree", e.to_string()))?;

    // 3. init doc DB
    runner.report(task_id, 3, TOTAL_STEPS, "initializing kanban document database").await;
    let db_name = payload
        .app_database_name
        .clone()
        .unwrap_or_else(|| format!("kanban_{}", payload.slug.replace('-', "_")));
    deps.database
        .create_database(&container_name(&payload.slug), &db_name)
        .await?;

    // 4. generate config
    runner.report(task_id, 4, TOTAL_STEPS, "generating tenant config").await;
    let config = serde_json::json!({
        "slug": payload.slug,
        "teamId": payload.team_id,
        "databaseName": db_name,
        "githubRepoName": payload.github_repo_name,
    });
    tokio::fs::write(
        tenant_dir.join("config.json"),
        serde_json::to_vec_pretty(&config).map_err(|e| OrchestratorError::step_failed("generate_config", e.to_string()))?,
    )
    .await
    .map_err(|e| OrchestratorError::step_failed("generate_config", e.to_string()))?;

    // 5. add DNS record
    runner.report(task_id, 5, TOTAL_STEPS, "adding DNS record").await;
    let host = fqdn(&deps.base_domain, &payload.slug);
    deps.dns.add_record(&host, "127.0.0.1").await?;

    // 6. wait propagation
    runner.report(task_id, 6, TOTAL_STEPS, "waiting for DNS propagation").await;
    deps.dns.wait_propagation(&host).await?;

    // 7. issue TLS
    runner.report(task_id, 7, TOTAL_STEPS, "issuing TLS certificate").await;
    deps.tls.issue(&host).await?;

    // 8. update gateway config
    runner.report(task_id, 8, TOTAL_STEPS, "updating gateway routing config").await;
    let gateway_entry = serde_json::json!({
        "slug": payload.slug,
        "host": host,
        "api_upstream": container_name(&payload.slug),
        "web_upstream": web_container_name(&payload.slug),
    });
    tokio::fs::write(
        tenant_dir.join("gateway.json"),
        serde_json::to_vec_pretty(&gateway_entry)
            .map_err(|e| OrchestratorError::step_failed("update_gateway_config", e.to_string()))?,
    )
    .await
    .map_err(|e| OrchestratorError::step_failed("update_gateway_config", e.to_string()))?;

    // 9. start containers: one api, one web, both routed by the gateway
    runner.report(task_id, 9, TOTAL_STEPS, "starting kanban containers").await;
    let mut api_env = HashMap::new();
    api_env.insert("DATABASE_NAME".to_string(), db_name.clone());
    api_env.insert("TEAM_SLUG".to_string(), payload.slug.clone());
    deps.containers
        .create(ContainerSpec {
            name: container_name(&payload.slug),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: api_env,
            mounts: vec![],
            labels: HashMap::from([
                ("cp.team".to_string(), payload.slug.clone()),
                ("cp.route.host".to_string(), host.clone()),
                ("cp.route.path".to_string(), "/api/*".to_string()),
                ("cp.route.strip_prefix".to_string(), "/api".to_string()),
                ("cp.route.port".to_string(), "8000".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;
    deps.containers
        .create(ContainerSpec {
            name: web_container_name(&payload.slug),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([("TEAM_SLUG".to_string(), payload.slug.clone())]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.team".to_string(), payload.slug.clone()),
                ("cp.route.host".to_string(), host.clone()),
                ("cp.route.path".to_string(), "/*".to_string()),
                ("cp.route.port".to_string(), "80".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;

    // 10. health check poll
    runner.report(task_id, 10, TOTAL_STEPS, "waiting for container health").await;
    poll_until_running(runner, &container_name(&payload.slug)).await?;
    poll_until_running(runner, &web_container_name(&payload.slug)).await?;

    // 11. publish team:status
    runner.report(task_id, 11, TOTAL_STEPS, "publishing team status").await;
    deps.store.mark_team_status(payload.team_id, TeamStatus::Active).await?;
    Ok(())
}

async fn poll_until_running(runner: &PipelineRunner, container: &str) -> Result<()> {
    for attempt in 0..HEALTH_CHECK_ATTEMPTS {
        let status = runner.deps().containers.inspect(container).await?;
        if status.state == cp_adapters::container::ContainerState::Running {
            return Ok(());
        }
        if attempt + 1 == HEALTH_CHECK_ATTEMPTS {
            break;
        }
        tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;
    }
    Err(OrchestratorError::step_failed(
        "health_check",
        format!("{container} did not report healthy in time"),
    ))
}

/// Best-effort reverse of provisioning: removes containers, DNS, TLS and
/// the tenant directory, continuing past individual step failures.
pub async fn delete(runner: &PipelineRunner, task_id: Uuid, payload: TeamLifecyclePayload) -> Result<()> {
    let deps = runner.deps();
    runner.report(task_id, 1, 1, "tearing down team").await;

    let Some(team) = deps.store.get_team(payload.team_id).await else {
        return Ok(());
    };

    if let Err(err) = deps.containers.remove(&container_name(&team.slug)).await {
        tracing::warn!(%err, team = %team.slug, "failed to remove team api container during teardown");
    }
    if let Err(err) = deps.containers.remove(&web_container_name(&team.slug)).await {
        tracing::warn!(%err, team = %team.slug, "failed to remove team web container during teardown");
    }
    let host = fqdn(&deps.base_domain, &team.slug);
    if let Err(err) = deps.tls.revoke(&host).await {
        tracing::warn!(%err, team = %team.slug, "failed to revoke TLS cert during teardown");
    }
    if let Err(err) = deps.dns.remove_record(&host).await {
        tracing::warn!(%err, team = %team.slug, "failed to remove DNS record during teardown");
    }
    let tenant_dir = deps.tenants_root.join(&team.slug);
    let _ = tokio::fs::remove_dir_all(&tenant_dir).await;

    deps.store.mark_team_status(team.id, TeamStatus::Deleting).await?;
    Ok(())
}

pub async fn restart(runner: &PipelineRunner, task_id: Uuid, payload: TeamLifecyclePayload) -> Result<()> {
    let deps = runner.deps();
    let team = deps
        .store
        .get_team(payload.team_id)
        .await
        .ok_or_else(|| OrchestratorError::step_failed("restart", "team not found"))?;

    let host = fqdn(&deps.base_domain, &team.slug);

    runner.report(task_id, 1, 2, "stopping team containers").await;
    deps.containers.remove(&container_name(&team.slug)).await?;
    deps.containers.remove(&web_container_name(&team.slug)).await?;

    runner.report(task_id, 2, 2, "restarting team containers").await;
    deps.containers
        .create(ContainerSpec {
            name: container_name(&team.slug),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([("TEAM_SLUG".to_string(), team.slug.clone())]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.team".to_string(), team.slug.clone()),
                ("cp.route.host".to_string(), host.clone()),
                ("cp.route.path".to_string(), "/api/*".to_string()),
                ("cp.route.strip_prefix".to_string(), "/api".to_string()),
                ("cp.route.port".to_string(), "8000".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;
    deps.containers
        .create(ContainerSpec {
            name: web_container_name(&team.slug),
            image: deps.kanban_image.clone(),
            network: deps.docker_network.clone(),
            env: HashMap::from([("TEAM_SLUG".to_string(), team.slug.clone())]),
            mounts: vec![],
            labels: HashMap::from([
                ("cp.team".to_string(), team.slug.clone()),
                ("cp.route.host".to_string(), host.clone()),
                ("cp.route.path".to_string(), "/*".to_string()),
                ("cp.route.port".to_string(), "80".to_string()),
            ]),
            restart_policy: "unless-stopped".to_string(),
        })
        .await?;
    poll_until_running(runner, &container_name(&team.slug)).await?;
    poll_until_running(runner, &web_container_name(&team.slug)).await?;
    deps.store.mark_team_status(team.id, TeamStatus::Active).await?;
    Ok(())
}

pub async fn start(runner: &PipelineRunner, task_id: Uuid, payload: TeamLifecyclePayload) -> Result<()> {
    restart(runner, task_id, payload).await
}
