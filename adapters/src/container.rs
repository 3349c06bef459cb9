//! C3 `ContainerRuntime` adapter — create/remove/inspect/logs over `docker`.
//!
//! Grounded on `orchestrator/app/main.py`'s container bring-up: `docker rm
//! -f` before `docker run -d` makes create idempotent, matching that
//! script's pattern of tearing down a stale container before starting the
//! fresh one.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::docker::run_docker;
use crate::error::{AdapterError, Result};

#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub env: HashMap<String, String>,
    pub mounts: Vec<(String, String)>,
    pub labels: HashMap<String, String>,
    pub restart_policy: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Exited,
    Absent,
}

#[derive(Debug, Clone)]
pub struct ContainerStatus {
    pub state: ContainerState,
    pub exit_code: Option<i32>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn create(&self, spec: ContainerSpec) -> Result<()>;
    async fn remove(&self, name: &str) -> Result<()>;
    async fn inspect(&self, name: &str) -> Result<ContainerStatus>;
    async fn logs(&self, name: &str, lines: u32) -> Result<String>;
}

pub struct DockerContainerRuntime;

impl Default for DockerContainerRuntime {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl ContainerRuntime for DockerContainerRuntime {
    async fn create(&self, spec: ContainerSpec) -> Result<()> {
        // Idempotent: drop any stale container with this name first.
        let _ = run_docker(&["rm", "-f", &spec.name]).await?;

        let mut args: Vec<String> = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            spec.name.clone(),
            "--network".to_string(),
            spec.network.clone(),
            "--restart".to_string(),
            spec.restart_policy.clone(),
        ];
        for (key, value) in &spec.env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        for (host_path, container_path) in &spec.mounts {
            args.push("-v".to_string());
            args.push(format!("{host_path}:{container_path}"));
        }
        for (key, value) in &spec.labels {
            args.push("--label".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(spec.image.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = run_docker(&arg_refs).await?;
        if !output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "docker run failed for {}: {}",
                spec.name,
                output.stderr_string()
            )));
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        // `docker rm -f` on an absent container exits non-zero but that is
        // not an error for an idempotent remove.
        let _ = run_docker(&["rm", "-f", name]).await?;
        Ok(())
    }

    async fn inspect(&self, name: &str) -> Result<ContainerStatus> {
        let output = run_docker(&[
            "inspect",
            "--format",
            "{{.State.Status}}|{{.State.ExitCode}}",
            name,
        ])
        .await?;

        if !output.status_success {
            return Ok(ContainerStatus {
                state: ContainerState::Absent,
                exit_code: None,
            });
        }

        let text = output.stdout_string();
        let mut parts = text.trim().splitn(2, '|');
        let status = parts.next().unwrap_or("");
        let exit_code = parts.next().and_then(|s| s.trim().parse::<i32>().ok());

        let state = match status {
            "running" => ContainerState::Running,
            "" => ContainerState::Absent,
            _ => ContainerState::Exited,
        };

        Ok(ContainerStatus { state, exit_code })
    }

    async fn logs(&self, name: &str, lines: u32) -> Result<String> {
        let tail = lines.to_string();
        let output = run_docker(&["logs", "--tail", &tail, name]).await?;
        if !output.status_success {
            return Err(AdapterError::CommandFailed(format!(
                "docker logs failed for {name}: {}",
                output.stderr_string()
            )));
        }
        // docker writes container stdout+stderr both to these streams.
        let mut combined = output.stdout_string();
        combined.push_str(&output.stderr_string());
        Ok(combined)
    }
}
