// Agent event system
//
// Fire-and-forget observer channel used by agents, the orchestrator and the
// coordinator. Publishing never blocks: slow subscribers lag, absent
// subscribers simply miss events.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::types::AgentStatus;
use crate::domain::plan::{PlanStatus, StepStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StatusChanged {
        agent_id: String,
        from: AgentStatus,
        to: AgentStatus,
    },
    ToolInvoked {
        agent_id: String,
        tool: String,
        success: bool,
    },
    /// Outbound message for UI/log consumers
    Message {
        agent_id: String,
        conversation_id: Option<String>,
        content: String,
        metadata: serde_json::Value,
    },
    AgentRestarted {
        agent_id: String,
        reason: String,
    },
    PlanCreated {
        plan_id: Uuid,
        step_count: usize,
    },
    StepStatusChanged {
        plan_id: Uuid,
        step_id: Uuid,
        status: StepStatus,
    },
    PlanFinished {
        plan_id: Uuid,
        status: PlanStatus,
    },
}

impl AgentEvent {
    /// Returns the agent this event concerns, if any
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentEvent::StatusChanged { agent_id, .. }
            | AgentEvent::ToolInvoked { agent_id, .. }
            | AgentEvent::Message { agent_id, .. }
            | AgentEvent::AgentRestarted { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// Returns the plan this event concerns, if any
    pub fn plan_id(&self) -> Option<Uuid> {
        match self {
            AgentEvent::PlanCreated { plan_id, .. }
            | AgentEvent::StepStatusChanged { plan_id, .. }
            | AgentEvent::PlanFinished { plan_id, .. } => Some(*plan_id),
            _ => None,
        }
    }
}

/// Broadcast-based event bus shared by every component
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AgentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: AgentEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
