// Agent message passing
//
// `AgentMessage` is the input to `Agent::process`; `ControlMessage` is what
// external actors push onto the orchestrator's control channel.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TASK: &str = "task";
pub const CANCEL_TASK: &str = "cancel_task";
pub const EXECUTE_TOOL: &str = "execute_tool";
pub const LIST_TOOLS: &str = "list_tools";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
}

impl AgentMessage {
    pub fn new(message_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            content: content.into(),
            metadata: serde_json::Value::Null,
            conversation_id: None,
            task_id: None,
        }
    }

    /// A plan step handed to an agent
    pub fn task(task_id: Uuid, description: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            metadata: input,
            task_id: Some(task_id),
            ..Self::new(TASK, description)
        }
    }

    /// Advisory request to abandon an in-flight task
    pub fn cancel(task_id: Uuid) -> Self {
        Self {
            task_id: Some(task_id),
            ..Self::new(CANCEL_TASK, "")
        }
    }

    pub fn tool(name: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            metadata: serde_json::json!({ "tool": name.into(), "params": params }),
            ..Self::new(EXECUTE_TOOL, "")
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Looks up a key in the metadata object
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Update,
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlAction::Start => write!(f, "start"),
            ControlAction::Stop => write!(f, "stop"),
            ControlAction::Restart => write!(f, "restart"),
            ControlAction::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    pub action: ControlAction,
    pub agent_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl ControlMessage {
    pub fn new(action: ControlAction, agent_id: impl Into<String>) -> Self {
        Self {
            action,
            agent_id: agent_id.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
