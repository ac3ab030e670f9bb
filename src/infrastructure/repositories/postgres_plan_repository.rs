use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::plan::TaskPlan;
use crate::domain::repositories::PlanRepository;

/// PostgreSQL implementation of PlanRepository
///
/// Plans are stored as a JSONB snapshot alongside their status so terminal
/// plans stay queryable after the coordinator evicts them.
pub struct PostgresPlanRepository {
    pool: PgPool,
}

impl PostgresPlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PlanRepository for PostgresPlanRepository {
    async fn save_plan(&self, plan: &TaskPlan) -> Result<(), String> {
        let snapshot =
            serde_json::to_value(plan).map_err(|e| format!("Failed to serialize plan: {}", e))?;

        sqlx::query(
            r#"
            INSERT INTO task_plans (id, task_id, status, snapshot, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                snapshot = EXCLUDED.snapshot,
                updated_at = NOW()
            "#,
        )
        .bind(plan.id())
        .bind(plan.task_id())
        .bind(plan.status().to_string())
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save plan: {}", e))?;

        Ok(())
    }

    async fn find_plan(&self, id: Uuid) -> Result<Option<TaskPlan>, String> {
        let row = sqlx::query("SELECT snapshot FROM task_plans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find plan by id: {}", e))?;

        row.map(|r| {
            let snapshot: serde_json::Value = r.try_get("snapshot").map_err(|e| e.to_string())?;
            serde_json::from_value(snapshot).map_err(|e| format!("Corrupt plan snapshot: {}", e))
        })
        .transpose()
    }
}
