//! Shared `docker` subprocess helper.
//!
//! Grounded on `orchestrator/app/main.py`'s `run_docker_cmd`: every adapter
//! that needs the container runtime shells out to the `docker` binary
//! rather than talking to the daemon socket directly.

use tokio::process::Command;

use crate::error::{AdapterError, Result};

pub struct DockerOutput {
    pub status_success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl DockerOutput {
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

pub async fn run_docker(args: &[&str]) -> Result<DockerOutput> {
    let output = Command::new("docker")
        .args(args)
        .output()
        .await
        .map_err(AdapterError::Io)?;

    Ok(DockerOutput {
        status_success: output.status.success(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}
