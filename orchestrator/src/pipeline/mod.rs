//! `PipelineRunner` — the C4 provisioning state machine.
//!
//! Grounded on `agent-runner/src/executor.rs`'s `TaskExecutor`: claim a task
//! from a queue, run its step list in order against shared dependencies,
//! reporting progress after each step, stopping (and failing the task) on
//! the first error. Background execution uses `tokio::spawn` per claimed
//! task, matching the teacher's split between the execution task and the
//! event-forwarding/persistence task.

mod agent;
mod sandbox;
mod team;
mod workspace;

use std::sync::Arc;
use std::time::Duration;

use cp_adapters::{ContainerRuntime, DatabaseCloner, DnsZone, IdentityProvider, RepositoryHost, TlsCertificates};
use cp_core::broker::{Priority, Progress, Task, TaskBroker, TaskType};
use cp_core::store::StateStore;
use tracing::{error, info, warn};

use crate::driver::AgentDriver;
use crate::error::{OrchestratorError, Result};

/// Shared dependencies every pipeline step needs. Concrete adapter
/// implementations are wired up at the gateway's composition root and
/// passed in here as trait objects, mirroring the adapters crate's own
/// `Arc<dyn Trait>` seam.
#[derive(Clone)]
pub struct PipelineDeps {
    pub store: StateStore,
    pub broker: TaskBroker,
    pub containers: Arc<dyn ContainerRuntime>,
    pub dns: Arc<dyn DnsZone>,
    pub tls: Arc<dyn TlsCertificates>,
    pub database: Arc<dyn DatabaseCloner>,
    pub identity: Arc<dyn IdentityProvider>,
    pub repository: Arc<dyn RepositoryHost>,
    pub agent_driver: Arc<dyn AgentDriver>,
    /// DNS zone suffix new tenant hostnames are provisioned under.
    pub base_domain: String,
    /// Filesystem root tenant directory trees are created under.
    pub tenants_root: std::path::PathBuf,
    /// Container image used for per-team kanban API containers.
    pub kanban_image: String,
    /// Container image used for per-sandbox dedicated agent containers.
    pub agent_image: String,
    /// Docker network new containers join.
    pub docker_network: String,
    /// GitHub org/user template-backed repositories are generated under.
    pub github_owner: String,
}

#[derive(Clone)]
pub struct PipelineRunner {
    deps: Arc<PipelineDeps>,
}

impl PipelineRunner {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    /// Claim and run tasks from `queue` until the process shuts down.
    /// `CP_ORCHESTRATOR_WORKERS` copies of this loop may run concurrently
    /// per queue to model multiple provisioning workers.
    pub async fn run_worker_loop(self, queue: &'static str) {
        loop {
            match self.deps.broker.claim(queue).await {
                Some(task) => {
                    let runner = self.clone();
                    tokio::spawn(async move {
                        runner.run_task(task).await;
                    });
                }
                None => tokio::time::sleep(Duration::from_millis(250)).await,
            }
        }
    }

    /// Run one task to completion, reporting progress and recording the
    /// terminal status on the broker. Never panics on pipeline failure —
    /// errors are recorded via `TaskBroker::fail`.
    pub async fn run_task(&self, task: Task) {
        let id = task.id;
        let type_name = task.task_type.type_name().to_string();
        info!(task_id = %id, task_type = %type_name, "starting pipeline");

        let outcome = match &task.task_type {
            TaskType::WorkspaceProvision(payload) => {
                workspace::provision(self, id, payload.clone()).await
            }
            TaskType::WorkspaceDelete(payload) => workspace::delete(self, id, payload.clone()).await,
            TaskType::WorkspaceRestart(payload) => {
                workspace::restart(self, id, payload.clone()).await
            }
            TaskType::WorkspaceStart(payload) => workspace::start(self, id, payload.clone()).await,
            TaskType::TeamProvision(payload) => team::provision(self, id, payload.clone()).await,
            TaskType::TeamDelete(payload) => team::delete(self, id, payload.clone()).await,
            TaskType::TeamRestart(payload) => team::restart(self, id, payload.clone()).await,
            TaskType::TeamStart(payload) => team::start(self, id, payload.clone()).await,
            TaskType::SandboxProvision(payload) => sandbox::provision(self, id, payload.clone()).await,
            TaskType::SandboxDelete(payload) => sandbox::delete(self, id, payload.clone()).await,
            TaskType::SandboxAgentRestart(payload) => {
                sandbox::agent_restart(self, id, payload.clone()).await
            }
            TaskType::CertIssue(payload) => {
                match self.deps.tls.issue(&payload.fqdn).await {
                    Ok(_) => Ok(()),
                    Err(err) => Err(OrchestratorError::from(err)),
                }
            }
            TaskType::AgentProcessCard(payload) => agent::process_card(self, id, payload.clone()).await,
            TaskType::AgentEnhanceDescription(_) => {
                // Catalogued for fidelity with the source's task type set;
                // no pipeline consumes it (kanban-domain CRUD is out of scope).
                Err(OrchestratorError::UnknownTaskType(type_name.clone()))
            }
        };

        match outcome {
            Ok(()) => {
                if let Err(err) = self.deps.broker.complete(id, None).await {
                    error!(task_id = %id, %err, "failed to record task completion");
                }
                info!(task_id = %id, task_type = %type_name, "pipeline completed");
            }
            Err(err) => {
                warn!(task_id = %id, task_type = %type_name, %err, "pipeline failed");
                if let Err(store_err) = self.deps.broker.fail(id, err.to_string()).await {
                    error!(task_id = %id, %store_err, "failed to record task failure");
                }
            }
        }
    }

    async fn report(&self, task_id: uuid::Uuid, step: u32, total_steps: u32, message: impl Into<String>) {
        let progress = Progress {
            step,
            total_steps,
            message: Some(message.into()),
        };
        if let Err(err) = self.deps.broker.update_progress(task_id, progress).await {
            warn!(task_id = %task_id, %err, "failed to report pipeline progress");
        }
    }

    /// Enqueue a follow-up task at the given priority. Used by
    /// `workspace.provision` to kick off its `team.provision` sub-task.
    pub(crate) async fn enqueue(&self, task_type: TaskType, priority: Priority) -> Task {
        self.deps.broker.enqueue(task_type, priority).await
    }
}
