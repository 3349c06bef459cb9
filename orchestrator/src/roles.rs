//! Column-to-role mapping and per-role dispatch profile for `agent.process_card`.
//!
//! Grounded on `personalities.py::get_agent_for_column`: a fuzzy,
//! keyword-group match against the lowercased column name, falling back to
//! no match (the source's "Done" board column matches nothing, and callers
//! skip dispatch for such cards).

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Triager,
    Planner,
    Developer,
    Reviewer,
    Tester,
    Unblocker,
    Documenter,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Triager => "triager",
            Self::Planner => "planner",
            Self::Developer => "developer",
            Self::Reviewer => "reviewer",
            Self::Tester => "tester",
            Self::Unblocker => "unblocker",
            Self::Documenter => "documenter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProfile {
    ReadOnly,
    Developer,
    FullAccess,
}

/// Timeout and tool allow-list for one role's `agent.process_card` run.
#[derive(Debug, Clone, Copy)]
pub struct RoleProfile {
    pub role: AgentRole,
    pub timeout: Duration,
    pub tools: ToolProfile,
}

/// `personalities.py::get_agent_for_column` keyword groups, checked in this
/// order against a lowercased column name; first match wins.
pub fn agent_for_column(column_name: &str) -> Option<AgentRole> {
    let name = column_name.to_lowercase();
    const GROUPS: &[(&[&str], AgentRole)] = &[
        (&["backlog", "triage", "inbox", "new"], AgentRole::Triager),
        (
            &["planning", "plan", "to do", "todo", "ready"],
            AgentRole::Planner,
        ),
        (
            &["progress", "development", "dev", "doing", "working"],
            AgentRole::Developer,
        ),
        (
            &["review", "pr", "pull request", "code review"],
            AgentRole::Reviewer,
        ),
        (&["test", "qa", "quality", "verification"], AgentRole::Tester),
        (&["blocked", "stuck", "impediment"], AgentRole::Unblocker),
        (&["docs", "documentation", "document"], AgentRole::Documenter),
    ];

    GROUPS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|kw| name.contains(kw)))
        .map(|(_, role)| *role)
}

pub fn profile_for(role: AgentRole) -> RoleProfile {
    let (seconds, tools) = match role {
        AgentRole::Triager => (180, ToolProfile::ReadOnly),
        AgentRole::Planner => (300, ToolProfile::ReadOnly),
        AgentRole::Developer => (900, ToolProfile::FullAccess),
        AgentRole::Reviewer => (300, ToolProfile::Developer),
        AgentRole::Tester => (600, ToolProfile::Developer),
        AgentRole::Unblocker => (600, ToolProfile::Developer),
        AgentRole::Documenter => (300, ToolProfile::Developer),
    };
    RoleProfile {
        role,
        timeout: Duration::from_secs(seconds),
        tools,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_groups_match_expected_roles() {
        assert_eq!(agent_for_column("Backlog"), Some(AgentRole::Triager));
        assert_eq!(agent_for_column("To Do"), Some(AgentRole::Planner));
        assert_eq!(agent_for_column("In Progress"), Some(AgentRole::Developer));
        assert_eq!(agent_for_column("Code Review"), Some(AgentRole::Reviewer));
        assert_eq!(agent_for_column("QA"), Some(AgentRole::Tester));
        assert_eq!(agent_for_column("Blocked"), Some(AgentRole::Unblocker));
        assert_eq!(agent_for_column("Documentation"), Some(AgentRole::Documenter));
    }

    #[test]
    fn done_column_matches_nothing() {
        assert_eq!(agent_for_column("Done"), None);
    }

    #[test]
    fn developer_profile_has_full_access_and_longest_timeout() {
        let profile = profile_for(AgentRole::Developer);
        assert_eq!(profile.tools, ToolProfile::FullAccess);
        assert_eq!(profile.timeout, Duration::from_secs(900));
    }
}
