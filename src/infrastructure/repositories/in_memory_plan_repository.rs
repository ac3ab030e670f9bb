use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::plan::TaskPlan;
use crate::domain::repositories::PlanRepository;

/// Process-local plan checkpoint store
#[derive(Debug, Default)]
pub struct InMemoryPlanRepository {
    plans: RwLock<HashMap<Uuid, TaskPlan>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.plans.read().await.len()
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn save_plan(&self, plan: &TaskPlan) -> Result<(), String> {
        self.plans.write().await.insert(plan.id(), plan.clone());
        Ok(())
    }

    async fn find_plan(&self, id: Uuid) -> Result<Option<TaskPlan>, String> {
        Ok(self.plans.read().await.get(&id).cloned())
    }
}
