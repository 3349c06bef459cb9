//! Task entity and its tagged payload catalogue.
//!
//! The `TaskType` enum and its queue routing mirror
//! `task_service.py::_get_queue_for_type`; the tagged-enum shape mirrors the
//! teacher's `gateway/protocol.rs` message variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod payload {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WorkspaceProvisionPayload {
        pub workspace_id: Uuid,
        pub slug: String,
        pub owner_user_id: Uuid,
        pub app_template_id: Option<Uuid>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WorkspaceLifecyclePayload {
        pub workspace_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TeamProvisionPayload {
        pub workspace_id: Uuid,
        pub team_id: Uuid,
        pub slug: String,
        pub github_repo_name: Option<String>,
        pub app_database_name: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TeamLifecyclePayload {
        pub team_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SandboxProvisionPayload {
        pub workspace_id: Uuid,
        pub sandbox_id: Uuid,
        pub slug: String,
        pub source_branch: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SandboxLifecyclePayload {
        pub sandbox_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CertIssuePayload {
        pub fqdn: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AgentProcessCardPayload {
        pub team_id: Uuid,
        pub card_id: String,
        pub column_name: String,
        pub card_title: String,
        pub card_description: Option<String>,
        pub webhook_callback_url: String,
    }

    /// Not executed by any pipeline (spec.md §1 excludes kanban-domain
    /// card CRUD); kept in the catalogue for fidelity with the source's
    /// task type set.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AgentEnhanceDescriptionPayload {
        pub team_id: Uuid,
        pub card_id: String,
        pub mode: EnhanceMode,
        pub options: EnhanceOptions,
    }

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum EnhanceMode {
        Append,
        Replace,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct EnhanceOptions {
        pub acceptance_criteria: bool,
        pub complexity_estimate: bool,
        pub suggest_labels: bool,
        pub refine_description: bool,
    }
}

use payload::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskType {
    TeamProvision(TeamProvisionPayload),
    TeamDelete(TeamLifecyclePayload),
    TeamRestart(TeamLifecyclePayload),
    TeamStart(TeamLifecyclePayload),
    WorkspaceProvision(WorkspaceProvisionPayload),
    WorkspaceDelete(WorkspaceLifecyclePayload),
    WorkspaceRestart(WorkspaceLifecyclePayload),
    WorkspaceStart(WorkspaceLifecyclePayload),
    SandboxProvision(SandboxProvisionPayload),
    SandboxDelete(SandboxLifecyclePayload),
    SandboxAgentRestart(SandboxLifecyclePayload),
    CertIssue(CertIssuePayload),
    AgentProcessCard(AgentProcessCardPayload),
    AgentEnhanceDescription(AgentEnhanceDescriptionPayload),
}

impl TaskType {
    /// `task_service.py::_get_queue_for_type`: provisioning lifecycle tasks
    /// share one queue regardless of entity kind, certs and agent work get
    /// their own, everything else falls to notifications.
    pub fn queue_name(&self) -> &'static str {
        match self {
            Self::TeamProvision(_)
            | Self::TeamDelete(_)
            | Self::TeamRestart(_)
            | Self::TeamStart(_)
            | Self::WorkspaceProvision(_)
            | Self::WorkspaceDelete(_)
            | Self::WorkspaceRestart(_)
            | Self::WorkspaceStart(_)
            | Self::SandboxProvision(_)
            | Self::SandboxDelete(_)
            | Self::SandboxAgentRestart(_) => "provisioning",
            Self::CertIssue(_) => "certificates",
            Self::AgentProcessCard(_) => "agents",
            Self::AgentEnhanceDescription(_) => "notifications",
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TeamProvision(_) => "team.provision",
            Self::TeamDelete(_) => "team.delete",
            Self::TeamRestart(_) => "team.restart",
            Self::TeamStart(_) => "team.start",
            Self::WorkspaceProvision(_) => "workspace.provision",
            Self::WorkspaceDelete(_) => "workspace.delete",
            Self::WorkspaceRestart(_) => "workspace.restart",
            Self::WorkspaceStart(_) => "workspace.start",
            Self::SandboxProvision(_) => "sandbox.provision",
            Self::SandboxDelete(_) => "sandbox.delete",
            Self::SandboxAgentRestart(_) => "sandbox.agent_restart",
            Self::CertIssue(_) => "cert.issue",
            Self::AgentProcessCard(_) => "agent.process_card",
            Self::AgentEnhanceDescription(_) => "agent.enhance_description",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub step: u32,
    pub total_steps: u32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    #[serde(flatten)]
    pub task_type: TaskType,
    pub queue: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub progress: Progress,
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(task_type: TaskType, queue: String, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type,
            queue,
            priority,
            status: TaskStatus::Pending,
            progress: Progress::default(),
            attempts: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
