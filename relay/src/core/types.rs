//! Shared deterministic types for pipeline logic.
//!
//! These types define stable contracts between the pipeline and the
//! dashboard that consumes its status lines.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state reported for an agent on the status protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Idle,
    Running,
    Paused,
    Failed,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Running => "running",
            AgentState::Paused => "paused",
            AgentState::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of an approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// Kind of project being generated; changes prompts and the README fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    #[default]
    Web,
    Blazor,
}

impl ProjectKind {
    /// Parse a `PROJECT_TYPE` value; anything unknown is `Web`.
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "blazor" => ProjectKind::Blazor,
            _ => ProjectKind::Web,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_kind_parses_case_insensitively() {
        assert_eq!(ProjectKind::from_env_value(" Blazor "), ProjectKind::Blazor);
        assert_eq!(ProjectKind::from_env_value("web"), ProjectKind::Web);
        assert_eq!(ProjectKind::from_env_value("unknown"), ProjectKind::Web);
    }

    #[test]
    fn agent_state_serializes_lowercase() {
        let encoded = serde_json::to_string(&AgentState::Running).expect("encode");
        assert_eq!(encoded, "\"running\"");
        assert_eq!(AgentState::Failed.to_string(), "failed");
    }
}
