use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::agent::AgentBehavior;
use super::errors::{AgentError, AgentResult};
use super::messages::{self, AgentMessage};
use super::state::AgentCore;
use crate::domain::plan::Task;
use crate::planning::PlanExecutor;

/// Agent that coordinates tasks across other agents
///
/// Owns its own `PlanExecutor`. `coordinate` and `task` messages are parsed
/// into a `Task` (from the metadata, falling back to the content as the
/// description) and run to completion; the plan summary is the output.
/// Cancelling the in-flight message cancels the plan.
pub struct CoordinatorAgent {
    executor: Arc<PlanExecutor>,
}

impl CoordinatorAgent {
    pub fn new(executor: Arc<PlanExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<PlanExecutor> {
        &self.executor
    }

    fn parse_task(message: &AgentMessage) -> Task {
        let mut task = serde_json::from_value::<Task>(message.metadata.clone())
            .unwrap_or_else(|_| Task::new("general", ""));
        if task.description.is_empty() {
            task.description = message.content.clone();
        }
        task
    }

    async fn coordinate(&self, core: &AgentCore, message: AgentMessage, cancel: &CancellationToken) -> AgentResult<serde_json::Value> {
        let task = Self::parse_task(&message);
        let plan_id = self.executor.create_plan(&task).await?;
        info!(agent_id = %core.id(), plan_id = %plan_id, task_id = %task.id, "Coordinating task");

        let summary = tokio::select! {
            result = self.executor.execute_plan(plan_id) => result?,
            _ = cancel.cancelled() => {
                self.executor.cancel_plan(plan_id).await?;
                return Err(AgentError::TaskCancelled);
            }
        };

        core.remember("last_plan", json!(plan_id));
        Ok(serde_json::to_value(summary)?)
    }

    fn plan_id(message: &AgentMessage) -> AgentResult<Uuid> {
        message
            .param("planId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| AgentError::InvalidMessage("planId is required".to_string()))
    }
}

#[async_trait]
impl AgentBehavior for CoordinatorAgent {
    fn default_capabilities(&self) -> Vec<String> {
        vec!["task-coordination".to_string(), "planning".to_string()]
    }

    async fn teardown(&self, _core: &Arc<AgentCore>) -> AgentResult<()> {
        self.executor.cancel_all().await;
        Ok(())
    }

    async fn handle(
        &self,
        core: &Arc<AgentCore>,
        message: AgentMessage,
        cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        match message.message_type.as_str() {
            "coordinate" | messages::TASK => self.coordinate(core, message, &cancel).await,
            "plan_status" => {
                let plan_id = Self::plan_id(&message)?;
                match self.executor.get_plan(plan_id).await? {
                    Some(plan) => Ok(serde_json::to_value(plan.summary())?),
                    None => Err(AgentError::PlanNotFound(plan_id)),
                }
            }
            "cancel_plan" => {
                let plan_id = Self::plan_id(&message)?;
                Ok(serde_json::to_value(self.executor.cancel_plan(plan_id).await?)?)
            }
            other => Err(AgentError::InvalidMessage(format!(
                "Coordinator agent cannot handle '{}' messages",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::agent::Agent;
    use crate::agents::events::EventBus;
    use crate::agents::types::{AgentInfo, AgentMetrics, AgentStatus, AgentType};
    use crate::config::ExecutorConfig;
    use crate::domain::plan::PlanStatus;
    use crate::infrastructure::repositories::{InMemoryAgentRepository, InMemoryPlanRepository};
    use crate::planning::AgentDispatcher;
    use chrono::Utc;
    use std::time::Duration;

    struct Storage;

    #[async_trait]
    impl AgentDispatcher for Storage {
        async fn dispatch(&self, agent_id: &str, message: AgentMessage) -> AgentResult<serde_json::Value> {
            Ok(json!({ "agent": agent_id, "did": message.content }))
        }

        async fn available_agents(&self) -> Vec<AgentInfo> {
            vec![AgentInfo {
                id: "store-1".to_string(),
                name: "Store".to_string(),
                agent_type: AgentType::Custom,
                status: AgentStatus::Active,
                capabilities: vec![
                    "data-retrieval".to_string(),
                    "data-processing".to_string(),
                    "data-storage".to_string(),
                ],
                last_heartbeat: Utc::now(),
                metrics: AgentMetrics::default(),
            }]
        }
    }

    async fn coordinator() -> Agent {
        let executor = PlanExecutor::new(
            Arc::new(Storage),
            Arc::new(InMemoryPlanRepository::new()),
            EventBus::new(64),
            ExecutorConfig::default(),
        );
        let core = AgentCore::new(
            "coordinator",
            "Coordinator",
            AgentType::Coordinator,
            Arc::new(InMemoryAgentRepository::new()),
            EventBus::new(64),
        );
        let agent = Agent::new(
            core,
            Box::new(CoordinatorAgent::new(Arc::new(executor))),
            Duration::from_secs(30),
        );
        agent.initialize().await.unwrap();
        agent
    }

    #[test]
    fn content_becomes_description_when_metadata_is_not_a_task() {
        let task = CoordinatorAgent::parse_task(&AgentMessage::new("coordinate", "tidy up"));

        assert_eq!(task.task_type, "general");
        assert_eq!(task.description, "tidy up");
    }

    #[tokio::test]
    async fn coordinate_runs_plan_and_returns_summary() {
        let agent = coordinator().await;
        let message = AgentMessage::new("coordinate", "").with_metadata(json!({
            "type": "data_processing",
            "dataSource": "X",
            "destination": "Y"
        }));

        let out = agent.process(message).await.unwrap();

        assert_eq!(out["status"], json!(PlanStatus::Completed));
        assert_eq!(out["results"].as_array().unwrap().len(), 3);
        assert!(agent.core().recall("last_plan").is_some());
    }

    #[tokio::test]
    async fn plan_status_requires_plan_id() {
        let agent = coordinator().await;
        let result = agent.process(AgentMessage::new("plan_status", "")).await;

        assert!(matches!(result, Err(AgentError::InvalidMessage(_))));
    }
}
