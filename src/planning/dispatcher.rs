use async_trait::async_trait;

use crate::agents::errors::AgentResult;
use crate::agents::messages::AgentMessage;
use crate::agents::types::AgentInfo;

/// What the plan executor needs from the agent registry
///
/// Implemented by the orchestrator; tests substitute their own.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    /// Deliver a message to one live agent and return its output
    async fn dispatch(&self, agent_id: &str, message: AgentMessage) -> AgentResult<serde_json::Value>;

    /// Live agents in a stable order
    async fn available_agents(&self) -> Vec<AgentInfo>;
}
