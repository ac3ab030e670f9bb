use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::types::{AgentStatus, AgentType};

/// Persisted state of an agent
///
/// Loaded when the orchestrator starts an agent and flushed back on shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    #[serde(default = "default_status")]
    pub status: AgentStatus,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub config: serde_json::Value,
    #[serde(default)]
    pub memory: HashMap<String, serde_json::Value>,
}

fn default_status() -> AgentStatus {
    AgentStatus::Inactive
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type,
            status: AgentStatus::Inactive,
            capabilities: Vec::new(),
            config: serde_json::Value::Null,
            memory: HashMap::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Name of the registered custom behavior, read from `config.behavior`
    pub fn behavior(&self) -> Option<&str> {
        self.config.get("behavior").and_then(|v| v.as_str())
    }
}

/// Repository trait for agent records
///
/// Used only at init/shutdown/heartbeat boundaries, never on the dispatch path.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Load the persisted record for an agent
    async fn load_agent_record(&self, id: &str) -> Result<Option<AgentRecord>, String>;

    /// Save a record (insert or update)
    async fn save_agent_record(&self, record: &AgentRecord) -> Result<(), String>;

    /// Upsert one memory entry
    async fn save_memory_entry(
        &self,
        agent_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), String>;

    /// Remove one memory entry
    async fn delete_memory_entry(&self, agent_id: &str, key: &str) -> Result<(), String>;

    /// Update only the status column
    async fn update_agent_status(&self, id: &str, status: AgentStatus) -> Result<(), String>;

    /// List every known record
    async fn list_agent_records(&self) -> Result<Vec<AgentRecord>, String>;
}
