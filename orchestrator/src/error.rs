//! Error types for the orchestrator.
//!
//! Keeps `ExecutorError`'s spawn/timeout/process-exit vocabulary, trading the
//! worktree-specific variants (this crate has no worktrees) for the
//! pipeline-step and adapter errors it actually produces.

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("core error: {0}")]
    Core(#[from] cp_core::CoreError),

    #[error("adapter error: {0}")]
    Adapter(#[from] cp_adapters::AdapterError),

    /// Failed to spawn agent process
    #[error("Failed to spawn agent process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Agent process exited unexpectedly
    #[error("Agent process exited with code {code:?}: {message}")]
    ProcessExited { code: Option<i32>, message: String },

    /// Invalid agent type
    #[error("Invalid agent type: {agent_type}")]
    InvalidAgentType { agent_type: String },

    /// Execution timeout
    #[error("Execution timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    /// A pipeline step failed; the pipeline runner stops and fails the task.
    #[error("pipeline step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    #[error("no pipeline is registered for task type '{0}'")]
    UnknownTaskType(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Execution failed
    #[error("Execution failed: {message}")]
    ExecutionFailed { message: String },
}

impl OrchestratorError {
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
        }
    }

    pub fn step_failed(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StepFailed {
            step: step.into(),
            message: message.into(),
        }
    }
}
