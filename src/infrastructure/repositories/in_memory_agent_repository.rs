use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agents::types::AgentStatus;
use crate::domain::repositories::{AgentRecord, AgentRepository};

/// Process-local implementation of AgentRepository
///
/// Default store when no database is configured, and the store used by tests.
#[derive(Debug, Default)]
pub struct InMemoryAgentRepository {
    records: RwLock<HashMap<String, AgentRecord>>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a repository pre-populated with records
    pub fn with_records(records: impl IntoIterator<Item = AgentRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn load_agent_record(&self, id: &str) -> Result<Option<AgentRecord>, String> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save_agent_record(&self, record: &AgentRecord) -> Result<(), String> {
        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn save_memory_entry(
        &self,
        agent_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), String> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(agent_id)
            .ok_or_else(|| format!("Agent not found: {}", agent_id))?;
        record.memory.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete_memory_entry(&self, agent_id: &str, key: &str) -> Result<(), String> {
        if let Some(record) = self.records.write().await.get_mut(agent_id) {
            record.memory.remove(key);
        }
        Ok(())
    }

    async fn update_agent_status(&self, id: &str, status: AgentStatus) -> Result<(), String> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| format!("Agent not found: {}", id))?;
        record.status = status;
        Ok(())
    }

    async fn list_agent_records(&self) -> Result<Vec<AgentRecord>, String> {
        let mut records: Vec<AgentRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}
