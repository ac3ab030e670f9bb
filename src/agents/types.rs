use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Agent kinds known to the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    System,
    Assistant,
    Coordinator,
    Custom,
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::System => write!(f, "system"),
            AgentType::Assistant => write!(f, "assistant"),
            AgentType::Coordinator => write!(f, "coordinator"),
            AgentType::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(AgentType::System),
            "assistant" => Ok(AgentType::Assistant),
            "coordinator" => Ok(AgentType::Coordinator),
            "custom" => Ok(AgentType::Custom),
            other => Err(format!("Unknown agent type: {}", other)),
        }
    }
}

/// Lifecycle status of an agent
///
/// # Status Transitions
/// ```text
/// Inactive -> Initializing -> Active <-> Paused
///                  |            |          |
///                  v            v          v
///                Error       Inactive   Inactive
/// ```
/// `Error` may go back to `Initializing` (restart) or `Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Inactive,
    Active,
    Error,
    Paused,
    Initializing,
}

impl AgentStatus {
    /// Checks if a transition from the current status to `next` is allowed
    ///
    /// # Example
    /// ```
    /// use ghostpirates_coordinator::agents::types::AgentStatus;
    ///
    /// assert!(AgentStatus::Inactive.can_transition_to(AgentStatus::Initializing));
    /// assert!(!AgentStatus::Inactive.can_transition_to(AgentStatus::Active));
    /// ```
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Inactive, Initializing)
                | (Initializing, Active)
                | (Initializing, Error)
                | (Active, Paused)
                | (Active, Inactive)
                | (Active, Error)
                | (Paused, Active)
                | (Paused, Inactive)
                | (Paused, Error)
                | (Error, Initializing)
                | (Error, Inactive)
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Inactive => write!(f, "inactive"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Paused => write!(f, "paused"),
            AgentStatus::Initializing => write!(f, "initializing"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inactive" => Ok(AgentStatus::Inactive),
            "active" => Ok(AgentStatus::Active),
            "error" => Ok(AgentStatus::Error),
            "paused" => Ok(AgentStatus::Paused),
            "initializing" => Ok(AgentStatus::Initializing),
            other => Err(format!("Unknown agent status: {}", other)),
        }
    }
}

/// Recent performance figures for an agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub uptime_secs: i64,
}

impl AgentMetrics {
    /// Fraction of finished tasks that succeeded, 1.0 when nothing ran yet
    pub fn success_rate(&self) -> f64 {
        let total = self.tasks_completed + self.tasks_failed;
        if total == 0 {
            return 1.0;
        }
        self.tasks_completed as f64 / total as f64
    }
}

/// Public view of a live agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub last_heartbeat: DateTime<Utc>,
    pub metrics: AgentMetrics,
}

impl AgentInfo {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}
