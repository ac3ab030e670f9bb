use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::agents::types::AgentStatus;
use crate::domain::repositories::{AgentRecord, AgentRepository};

/// PostgreSQL implementation of AgentRepository
///
/// Agent rows live in `agents`; memory entries in `agent_memory`
/// keyed by `(agent_id, key)`.
pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    /// Creates a new PostgresAgentRepository
    ///
    /// # Arguments
    /// * `pool` - SQLx connection pool for PostgreSQL
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_memory(&self, agent_id: &str) -> Result<HashMap<String, serde_json::Value>, String> {
        let rows = sqlx::query(
            r#"
            SELECT key, value
            FROM agent_memory
            WHERE agent_id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load agent memory: {}", e))?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get("key").map_err(|e| e.to_string())?;
                let value: serde_json::Value = row.try_get("value").map_err(|e| e.to_string())?;
                Ok((key, value))
            })
            .collect()
    }
}

fn record_from_row(row: &PgRow) -> Result<AgentRecord, String> {
    let agent_type: String = row.try_get("agent_type").map_err(|e| e.to_string())?;
    let status: String = row.try_get("status").map_err(|e| e.to_string())?;
    let capabilities: Json<Vec<String>> = row.try_get("capabilities").map_err(|e| e.to_string())?;

    Ok(AgentRecord {
        id: row.try_get("id").map_err(|e| e.to_string())?,
        name: row.try_get("name").map_err(|e| e.to_string())?,
        agent_type: agent_type.parse()?,
        status: status.parse()?,
        capabilities: capabilities.0,
        config: row.try_get("config").map_err(|e| e.to_string())?,
        memory: HashMap::new(),
    })
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn load_agent_record(&self, id: &str) -> Result<Option<AgentRecord>, String> {
        let row = sqlx::query(
            r#"
            SELECT id, name, agent_type, status, capabilities, config
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to find agent by id: {}", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = record_from_row(&row)?;
        record.memory = self.load_memory(id).await?;
        Ok(Some(record))
    }

    async fn save_agent_record(&self, record: &AgentRecord) -> Result<(), String> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| format!("Failed to open transaction: {}", e))?;

        sqlx::query(
            r#"
            INSERT INTO agents (id, name, agent_type, status, capabilities, config, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                agent_type = EXCLUDED.agent_type,
                status = EXCLUDED.status,
                capabilities = EXCLUDED.capabilities,
                config = EXCLUDED.config,
                updated_at = NOW()
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.agent_type.to_string())
        .bind(record.status.to_string())
        .bind(Json(&record.capabilities))
        .bind(&record.config)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("Failed to save agent: {}", e))?;

        sqlx::query("DELETE FROM agent_memory WHERE agent_id = $1")
            .bind(&record.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| format!("Failed to reset agent memory: {}", e))?;

        for (key, value) in &record.memory {
            sqlx::query("INSERT INTO agent_memory (agent_id, key, value) VALUES ($1, $2, $3)")
                .bind(&record.id)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(|e| format!("Failed to save agent memory: {}", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| format!("Failed to commit agent: {}", e))
    }

    async fn save_memory_entry(
        &self,
        agent_id: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO agent_memory (agent_id, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (agent_id, key) DO UPDATE SET value = EXCLUDED.value
            "#,
        )
        .bind(agent_id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save memory entry: {}", e))?;

        Ok(())
    }

    async fn delete_memory_entry(&self, agent_id: &str, key: &str) -> Result<(), String> {
        sqlx::query("DELETE FROM agent_memory WHERE agent_id = $1 AND key = $2")
            .bind(agent_id)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to delete memory entry: {}", e))?;

        Ok(())
    }

    async fn update_agent_status(&self, id: &str, status: AgentStatus) -> Result<(), String> {
        let result = sqlx::query("UPDATE agents SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.to_string())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to update agent status: {}", e))?;

        if result.rows_affected() == 0 {
            return Err(format!("Agent not found: {}", id));
        }

        Ok(())
    }

    async fn list_agent_records(&self) -> Result<Vec<AgentRecord>, String> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, agent_type, status, capabilities, config
            FROM agents
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to list agents: {}", e))?;

        rows.iter().map(record_from_row).collect()
    }
}
