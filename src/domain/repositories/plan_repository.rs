use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::plan::TaskPlan;

/// Repository trait for plan checkpoints
///
/// Live plans are held in memory by the coordinator; this store keeps
/// checkpoints for crash recovery and terminal state for later queries.
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Save a plan snapshot (insert or update)
    async fn save_plan(&self, plan: &TaskPlan) -> Result<(), String>;

    /// Find a plan snapshot by its ID
    async fn find_plan(&self, id: Uuid) -> Result<Option<TaskPlan>, String>;
}
