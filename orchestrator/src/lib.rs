//! Provisioning state machine for the workspace orchestration control plane
//! (C4): the `PipelineRunner` that claims tasks off the C2 broker and drives
//! workspace/team/sandbox provisioning and agent dispatch against the C3
//! resource adapters.

pub mod driver;
pub mod error;
pub mod pipeline;
pub mod roles;

pub use driver::{AgentDriver, AgentRunOutcome, HttpApiDriver, LocalCliDriver, OutputCallback, SshCliDriver};
pub use error::{OrchestratorError, Result};
pub use pipeline::{PipelineDeps, PipelineRunner};
pub use roles::{agent_for_column, profile_for, AgentRole, RoleProfile, ToolProfile};
