//! Control channel consumer
//!
//! Commands are applied one at a time in arrival order. They are not ordered
//! relative to direct calls on the orchestrator.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Orchestrator;
use crate::agents::errors::{AgentError, AgentResult};
use crate::agents::messages::{ControlAction, ControlMessage};
use crate::domain::repositories::AgentRecord;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ControlOutcome {
    Started { agent_id: String },
    Stopped { agent_id: String },
    Restarted { agent_id: String },
    Updated { record: AgentRecord },
}

impl Orchestrator {
    /// Applies one control command
    ///
    /// `start` with a payload registers the payload as the agent's record first.
    pub async fn handle_control(&self, message: ControlMessage) -> AgentResult<ControlOutcome> {
        let agent_id = message.agent_id;
        match message.action {
            ControlAction::Start => {
                if let Some(payload) = message.payload {
                    let mut record: AgentRecord = serde_json::from_value(payload)
                        .map_err(|e| AgentError::InvalidMessage(format!("invalid agent record: {}", e)))?;
                    record.id = agent_id.clone();
                    self.register_agent(record).await?;
                }
                self.start_agent(&agent_id).await?;
                Ok(ControlOutcome::Started { agent_id })
            }
            ControlAction::Stop => {
                self.stop_agent(&agent_id).await?;
                Ok(ControlOutcome::Stopped { agent_id })
            }
            ControlAction::Restart => {
                self.restart_agent(&agent_id).await?;
                Ok(ControlOutcome::Restarted { agent_id })
            }
            ControlAction::Update => {
                let payload = message
                    .payload
                    .ok_or_else(|| AgentError::InvalidMessage("update requires a payload".to_string()))?;
                let record = self.update_agent(&agent_id, payload).await?;
                Ok(ControlOutcome::Updated { record })
            }
        }
    }
}

/// Consumes `commands` serially until the channel closes or `shutdown` is cancelled
pub fn spawn_control_listener(
    orchestrator: Arc<Orchestrator>,
    mut commands: mpsc::Receiver<ControlMessage>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Control listener started");
        loop {
            let command = tokio::select! {
                command = commands.recv() => command,
                _ = shutdown.cancelled() => None,
            };
            let Some(command) = command else {
                break;
            };

            let action = command.action;
            let agent_id = command.agent_id.clone();
            match orchestrator.handle_control(command).await {
                Ok(_) => info!(agent_id = %agent_id, action = %action, "Control command applied"),
                Err(e) => warn!(agent_id = %agent_id, action = %action, error = %e, "Control command failed"),
            }
        }
        info!("Control listener stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::events::EventBus;
    use crate::agents::factory::AgentFactory;
    use crate::agents::types::AgentType;
    use crate::config::{ExecutorConfig, OrchestratorConfig};
    use crate::infrastructure::repositories::{InMemoryAgentRepository, InMemoryPlanRepository};
    use serde_json::json;
    use std::time::Duration;

    fn orchestrator() -> Arc<Orchestrator> {
        let plans = Arc::new(InMemoryPlanRepository::new());
        Orchestrator::new(
            Arc::new(InMemoryAgentRepository::new()),
            plans.clone(),
            AgentFactory::new(plans, ExecutorConfig::default()),
            EventBus::new(64),
            OrchestratorConfig::default(),
            ExecutorConfig::default(),
        )
    }

    #[tokio::test]
    async fn start_with_payload_registers_and_starts() {
        let orchestrator = orchestrator();
        let command = ControlMessage::new(ControlAction::Start, "helper")
            .with_payload(json!({ "id": "ignored", "name": "Helper", "type": "assistant" }));

        let outcome = orchestrator.handle_control(command).await.unwrap();

        assert_eq!(outcome, ControlOutcome::Started { agent_id: "helper".to_string() });
        let info = orchestrator.get_agent_info("helper").await.unwrap();
        assert_eq!(info.agent_type, AgentType::Assistant);
    }

    #[tokio::test]
    async fn update_without_payload_is_rejected() {
        let orchestrator = orchestrator();
        let result = orchestrator
            .handle_control(ControlMessage::new(ControlAction::Update, "helper"))
            .await;

        assert!(matches!(result, Err(AgentError::InvalidMessage(_))));
    }

    #[tokio::test]
    async fn listener_applies_commands_in_order() {
        let orchestrator = orchestrator();
        let (tx, rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();
        let handle = spawn_control_listener(orchestrator.clone(), rx, shutdown.clone());

        tx.send(
            ControlMessage::new(ControlAction::Start, "sys")
                .with_payload(json!({ "id": "sys", "name": "System", "type": "system" })),
        )
        .await
        .unwrap();
        tx.send(ControlMessage::new(ControlAction::Stop, "sys")).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!orchestrator.is_running("sys").await);
        let record = orchestrator.store().load_agent_record("sys").await.unwrap().unwrap();
        assert_eq!(record.name, "System");
    }
}
