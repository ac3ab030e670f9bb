use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the coordination core
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent {agent_id} failed to initialize: {reason}")]
    Initialization { agent_id: String, reason: String },

    #[error("Tool '{tool}' is not registered on agent {agent_id}")]
    ToolNotFound { agent_id: String, tool: String },

    #[error("Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Plan {plan_id} deadlocked with {} blocked step(s)", blocked_steps.len())]
    Deadlock {
        plan_id: Uuid,
        blocked_steps: Vec<Uuid>,
    },

    #[error("Plan {plan_id} did not finish within {waited_ms}ms")]
    PlanTimeout { plan_id: Uuid, waited_ms: u64 },

    #[error("Plan not found: {0}")]
    PlanNotFound(Uuid),

    #[error("Plan {0} was cancelled")]
    PlanCancelled(Uuid),

    #[error("Step {step_id} failed: {message}")]
    Execution { step_id: Uuid, message: String },

    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Task was cancelled")]
    TaskCancelled,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// Wraps a failure that happened while a plan step was running
    pub fn execution(step_id: Uuid, source: &AgentError) -> Self {
        AgentError::Execution {
            step_id,
            message: source.to_string(),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_message_counts_blocked_steps() {
        let err = AgentError::Deadlock {
            plan_id: Uuid::nil(),
            blocked_steps: vec![Uuid::new_v4(), Uuid::new_v4()],
        };

        assert!(err.to_string().contains("2 blocked step(s)"));
    }

    #[test]
    fn execution_wraps_source_message() {
        let step_id = Uuid::new_v4();
        let source = AgentError::AgentNotAvailable("worker-1".to_string());

        match AgentError::execution(step_id, &source) {
            AgentError::Execution { step_id: id, message } => {
                assert_eq!(id, step_id);
                assert!(message.contains("worker-1"));
            }
            other => panic!("Expected Execution error, got {other:?}"),
        }
    }
}
