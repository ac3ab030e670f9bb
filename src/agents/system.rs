use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::agent::AgentBehavior;
use super::errors::{AgentError, AgentResult};
use super::messages::{self, AgentMessage};
use super::state::AgentCore;
use super::tools::Tool;

/// System-monitoring agent
///
/// Reports on its own liveness and the state it can observe locally.
/// Handles `health_check`, `system_status` and `task` messages.
#[derive(Debug, Default)]
pub struct SystemAgent;

impl SystemAgent {
    pub fn new() -> Self {
        Self
    }

    fn status_report(core: &AgentCore) -> serde_json::Value {
        let metrics = core.metrics();
        json!({
            "agentId": core.id(),
            "status": core.status(),
            "uptimeSecs": metrics.uptime_secs,
            "tasksCompleted": metrics.tasks_completed,
            "tasksFailed": metrics.tasks_failed,
            "inflightTasks": core.inflight_tasks(),
            "memoryEntries": core.memory_len(),
            "tools": core.tool_descriptors().into_iter().map(|t| t.name).collect::<Vec<_>>(),
        })
    }
}

#[async_trait]
impl AgentBehavior for SystemAgent {
    fn default_capabilities(&self) -> Vec<String> {
        vec![
            "system-monitoring".to_string(),
            "health-check".to_string(),
        ]
    }

    async fn setup(&self, core: &Arc<AgentCore>) -> AgentResult<()> {
        let weak: Weak<AgentCore> = Arc::downgrade(core);
        core.register_tool(Tool::from_fn(
            "get_uptime",
            "Seconds since this agent was last initialized",
            json!({ "type": "object", "properties": {} }),
            move |_params| {
                let weak = weak.clone();
                async move {
                    match weak.upgrade() {
                        Some(core) => Ok(json!({ "uptimeSecs": core.metrics().uptime_secs })),
                        None => Err(AgentError::TaskExecutionFailed("agent is gone".to_string())),
                    }
                }
            },
        ));
        Ok(())
    }

    async fn handle(
        &self,
        core: &Arc<AgentCore>,
        message: AgentMessage,
        _cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value> {
        match message.message_type.as_str() {
            "health_check" => Ok(json!({
                "agentId": core.id(),
                "healthy": true,
                "lastHeartbeat": core.last_heartbeat(),
            })),
            "system_status" => Ok(Self::status_report(core)),
            messages::TASK => {
                let report = json!({
                    "check": message.content,
                    "checkedAt": Utc::now(),
                    "report": Self::status_report(core),
                });
                core.remember("last_report", report.clone());
                Ok(report)
            }
            other => Err(AgentError::InvalidMessage(format!(
                "System agent cannot handle '{}' messages",
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
    use crate::agents::types::AgentType;
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use std::time::Duration;
    use uuid::Uuid;

    async fn system_agent() -> Agent {
        let core = AgentCore::new(
            "system",
            "System Monitor",
            AgentType::System,
            Arc::new(InMemoryAgentRepository::new()),
            EventBus::new(16),
        );
        let agent = Agent::new(core, Box::new(SystemAgent::new()), Duration::from_secs(30));
        agent.initialize().await.unwrap();
        agent
    }

    #[tokio::test]
    async fn has_monitoring_capabilities() {
        let agent = system_agent().await;

        assert!(agent.has_capability("system-monitoring"));
        assert!(agent.has_capability("health-check"));
    }

    #[tokio::test]
    async fn health_check_reports_healthy() {
        let agent = system_agent().await;
        let out = agent.process(AgentMessage::new("health_check", "")).await.unwrap();

        assert_eq!(out["healthy"], json!(true));
        assert_eq!(out["agentId"], json!("system"));
    }

    #[tokio::test]
    async fn uptime_tool_is_registered() {
        let agent = system_agent().await;
        let out = agent.execute_tool("get_uptime", json!({})).await.unwrap();

        assert!(out["uptimeSecs"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn task_stores_last_report() {
        let agent = system_agent().await;
        let out = agent
            .process(AgentMessage::task(Uuid::new_v4(), "Check disk", json!({})))
            .await
            .unwrap();

        assert_eq!(out["check"], json!("Check disk"));
        assert!(agent.core().recall("last_report").is_some());
    }

    #[tokio::test]
    async fn rejects_unknown_message_type() {
        let agent = system_agent().await;
        let result = agent.process(AgentMessage::new("dance", "")).await;

        assert!(matches!(result, Err(AgentError::InvalidMessage(_))));
    }
}
