//! `AgentDriver` — the single capability the orchestrator needs from an
//! agent backend: run a prompt against a working directory under a role's
//! timeout and stream its output back line by line.
//!
//! Grounded on `process.rs`'s `AgentProcess`/`OutputReaderHandle`: piped
//! stdio, `kill_on_drop`, a line-by-line stdout reader task. The teacher
//! split agent backend selection into an `AgentType` enum over one spawn
//! path; this crate instead gives each backend (local CLI, SSH CLI, HTTP
//! API) its own `AgentDriver` impl, since an HTTP-API agent has no child
//! process or stdio to read at all.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{OrchestratorError, Result};
use crate::roles::AgentRole;

/// How an agent run ended.
#[derive(Debug, Clone)]
pub struct AgentRunOutcome {
    pub success: bool,
    pub exit_summary: String,
}

/// Callback invoked once per line of agent output, as it arrives.
pub type OutputCallback = Box<dyn Fn(&str) + Send + Sync>;

#[async_trait]
pub trait AgentDriver: Send + Sync {
    async fn run(
        &self,
        prompt: &str,
        workdir: &Path,
        role: AgentRole,
        on_output: &OutputCallback,
        deadline: Duration,
    ) -> Result<AgentRunOutcome>;
}

/// Run the role's configured CLI as a local subprocess.
pub struct LocalCliDriver {
    command: String,
    args: Vec<String>,
}

impl LocalCliDriver {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl AgentDriver for LocalCliDriver {
    async fn run(
        &self,
        prompt: &str,
        workdir: &Path,
        _role: AgentRole,
        on_output: &OutputCallback,
        deadline: Duration,
    ) -> Result<AgentRunOutcome> {
        let mut cmd = Command::new(&self.command);
        cmd.current_dir(workdir)
            .args(&self.args)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        run_piped_command(cmd, on_output, deadline).await
    }
}

/// Run the role's configured CLI on a remote host over SSH.
pub struct SshCliDriver {
    host: String,
    remote_command: String,
}

impl SshCliDriver {
    pub fn new(host: impl Into<String>, remote_command: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            remote_command: remote_command.into(),
        }
    }
}

#[async_trait]
impl AgentDriver for SshCliDriver {
    async fn run(
        &self,
        prompt: &str,
        workdir: &Path,
        _role: AgentRole,
        on_output: &OutputCallback,
        deadline: Duration,
    ) -> Result<AgentRunOutcome> {
        let remote = format!(
            "cd {} && {} {}",
            shell_quote(&workdir.display().to_string()),
            self.remote_command,
            shell_quote(prompt),
        );

        let mut cmd = Command::new("ssh");
        cmd.arg(&self.host)
            .arg("--")
            .arg(remote)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        run_piped_command(cmd, on_output, deadline).await
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

async fn run_piped_command(
    mut cmd: Command,
    on_output: &OutputCallback,
    deadline: Duration,
) -> Result<AgentRunOutcome> {
    let mut child = cmd
        .spawn()
        .map_err(|e| OrchestratorError::spawn_failed_with_source(format!("spawn failed: {e}"), e))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| OrchestratorError::spawn_failed("failed to capture stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| OrchestratorError::spawn_failed("failed to capture stderr"))?;

    let pid = child.id();
    let read_and_wait = async {
        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        loop {
            tokio::select! {
                line = stdout_lines.next_line() => {
                    match line {
                        Ok(Some(line)) => on_output(&line),
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
                line = stderr_lines.next_line() => {
                    if let Ok(Some(line)) = line {
                        on_output(&line);
                    }
                }
            }
        }
        child.wait().await
    };

    match timeout(deadline, read_and_wait).await {
        Ok(Ok(status)) => {
            let code = status.code().unwrap_or(-1);
            Ok(AgentRunOutcome {
                success: status.success(),
                exit_summary: format!("exited with code {code}"),
            })
        }
        Ok(Err(err)) => Err(OrchestratorError::from(err)),
        Err(_) => {
            kill_with_grace(pid).await;
            Err(OrchestratorError::Timeout {
                seconds: deadline.as_secs(),
            })
        }
    }
}

/// SIGTERM, wait up to 5s, then SIGKILL. `kill_on_drop` on the `Command`
/// guarantees the process is gone by the time its `Child` handle drops, but
/// that is an immediate hard kill; this gives the agent a chance to flush
/// before that fallback fires.
async fn kill_with_grace(pid: Option<u32>) {
    let Some(pid) = pid else { return };

    #[cfg(unix)]
    {
        // SAFETY: pid is a process we spawned and still own at this point.
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
        unsafe {
            libc::kill(pid as i32, libc::SIGKILL);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Post the prompt to an HTTP agent endpoint and stream the newline-delimited
/// response body back through `on_output`.
pub struct HttpApiDriver {
    http: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl HttpApiDriver {
    pub fn new(endpoint: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            bearer_token,
        }
    }
}

#[async_trait]
impl AgentDriver for HttpApiDriver {
    async fn run(
        &self,
        prompt: &str,
        workdir: &Path,
        role: AgentRole,
        on_output: &OutputCallback,
        deadline: Duration,
    ) -> Result<AgentRunOutcome> {
        let mut request = self.http.post(&self.endpoint).json(&serde_json::json!({
            "prompt": prompt,
            "workdir": workdir.display().to_string(),
            "role": role.as_str(),
        }));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let send = async {
            let response = request.send().await.map_err(OrchestratorError::from)?;
            if !response.status().is_success() {
                return Err(OrchestratorError::ProcessExited {
                    code: Some(response.status().as_u16() as i32),
                    message: format!("agent endpoint returned {}", response.status()),
                });
            }

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(OrchestratorError::from)?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].to_string();
                    on_output(&line);
                    buffer.drain(..=pos);
                }
            }
            if !buffer.is_empty() {
                on_output(&buffer);
            }
            Ok(())
        };

        match timeout(deadline, send).await {
            Ok(Ok(())) => Ok(AgentRunOutcome {
                success: true,
                exit_summary: "agent endpoint completed".to_string(),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(OrchestratorError::Timeout {
                seconds: deadline.as_secs(),
            }),
        }
    }
}
