use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::{AgentError, AgentResult};
use super::messages::{self, AgentMessage};
use super::state::AgentCore;
use super::tools::Tool;
use super::types::{AgentInfo, AgentStatus};

/// Variant-specific behavior plugged into the shared agent lifecycle
#[async_trait]
pub trait AgentBehavior: Send + Sync {
    /// Capabilities every instance of this variant starts with
    fn default_capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether `handle` may run concurrently with itself
    fn concurrent(&self) -> bool {
        true
    }

    async fn setup(&self, _core: &Arc<AgentCore>) -> AgentResult<()> {
        Ok(())
    }

    async fn teardown(&self, _core: &Arc<AgentCore>) -> AgentResult<()> {
        Ok(())
    }

    /// Handles a domain message; `cancel` fires on shutdown or `cancel_task`
    async fn handle(
        &self,
        core: &Arc<AgentCore>,
        message: AgentMessage,
        cancel: CancellationToken,
    ) -> AgentResult<serde_json::Value>;
}

/// A live agent: shared state plus its variant behavior
pub struct Agent {
    core: Arc<AgentCore>,
    behavior: Box<dyn AgentBehavior>,
    heartbeat_interval: Duration,
    lifecycle_lock: tokio::sync::Mutex<()>,
    exclusive: tokio::sync::Mutex<()>,
}

impl Agent {
    pub fn new(core: AgentCore, behavior: Box<dyn AgentBehavior>, heartbeat_interval: Duration) -> Self {
        Self {
            core: Arc::new(core),
            behavior,
            heartbeat_interval,
            lifecycle_lock: tokio::sync::Mutex::new(()),
            exclusive: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        self.core.id()
    }

    pub fn core(&self) -> &Arc<AgentCore> {
        &self.core
    }

    pub fn status(&self) -> AgentStatus {
        self.core.status()
    }

    pub fn info(&self) -> AgentInfo {
        self.core.info()
    }

    /// Loads persisted state, runs variant setup, starts the heartbeat and goes `Active`
    ///
    /// On failure the agent is left in `Error` and `AgentError::Initialization` is returned.
    pub async fn initialize(&self) -> AgentResult<()> {
        let _guard = self.lifecycle_lock.lock().await;
        let id = self.core.id().to_string();

        self.core.set_status(AgentStatus::Initializing)?;
        self.core.renew_lifecycle();

        if let Err(e) = self.prepare().await {
            if let Err(status_err) = self.core.set_status(AgentStatus::Error) {
                warn!(agent_id = %id, error = %status_err, "Could not mark agent as errored");
            }
            if let Err(store_err) = self.core.store().update_agent_status(&id, AgentStatus::Error).await {
                debug!(agent_id = %id, error = %store_err, "Could not persist error status");
            }
            error!(agent_id = %id, error = %e, "Agent initialization failed");
            return Err(match e {
                AgentError::Initialization { .. } => e,
                other => AgentError::Initialization {
                    agent_id: id,
                    reason: other.to_string(),
                },
            });
        }

        self.core.touch_heartbeat();
        self.core.mark_started();
        self.spawn_heartbeat();
        self.core.set_status(AgentStatus::Active)?;
        if let Err(e) = self.core.store().update_agent_status(&id, AgentStatus::Active).await {
            debug!(agent_id = %id, error = %e, "Could not persist active status");
        }

        info!(agent_id = %id, agent_type = %self.core.agent_type(), "Agent initialized");
        Ok(())
    }

    async fn prepare(&self) -> AgentResult<()> {
        let record = self
            .core
            .store()
            .load_agent_record(self.core.id())
            .await
            .map_err(AgentError::Store)?;
        if let Some(record) = record {
            self.core.apply_record(&record);
        }
        for capability in self.behavior.default_capabilities() {
            self.core.add_capability(capability);
        }
        self.behavior.setup(&self.core).await
    }

    fn spawn_heartbeat(&self) {
        let core = Arc::clone(&self.core);
        let token = core.lifecycle_token();
        let period = self.heartbeat_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        core.touch_heartbeat();
                        if let Err(e) = core.flush_memory().await {
                            warn!(agent_id = %core.id(), error = %e, "Heartbeat memory flush failed");
                        }
                        if let Err(e) = core.store().update_agent_status(core.id(), core.status()).await {
                            debug!(agent_id = %core.id(), error = %e, "Heartbeat status write failed");
                        }
                    }
                }
            }
            debug!(agent_id = %core.id(), "Heartbeat stopped");
        });
    }

    /// Signals shutdown, stops the heartbeat, flushes state, runs variant teardown, goes `Inactive`
    ///
    /// Every step runs even if an earlier one failed; the first error is returned.
    pub async fn shutdown(&self) -> AgentResult<()> {
        let _guard = self.lifecycle_lock.lock().await;
        let id = self.core.id().to_string();
        self.core.begin_shutdown();

        let mut first_error: Option<AgentError> = None;

        if let Err(e) = self.core.flush_memory().await {
            first_error.get_or_insert(e);
        }
        let mut record = self.core.to_record();
        record.status = AgentStatus::Inactive;
        if let Err(e) = self.core.store().save_agent_record(&record).await {
            first_error.get_or_insert(AgentError::Store(e));
        }
        if let Err(e) = self.behavior.teardown(&self.core).await {
            first_error.get_or_insert(e);
        }
        if self.core.status().can_transition_to(AgentStatus::Inactive) {
            self.core.set_status(AgentStatus::Inactive)?;
        }

        info!(agent_id = %id, "Agent shut down");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Shutdown then initialize; not atomic
    pub async fn restart(&self) -> AgentResult<()> {
        if let Err(e) = self.shutdown().await {
            warn!(agent_id = %self.id(), error = %e, "Shutdown during restart failed");
        }
        self.initialize().await
    }

    pub fn pause(&self) -> AgentResult<()> {
        self.core.set_status(AgentStatus::Paused)
    }

    pub fn resume(&self) -> AgentResult<()> {
        self.core.set_status(AgentStatus::Active)
    }

    /// Single entry point for work sent to the agent
    pub async fn process(&self, message: AgentMessage) -> AgentResult<serde_json::Value> {
        if self.core.status() != AgentStatus::Active || self.core.is_shutting_down() {
            return Err(AgentError::AgentNotAvailable(self.id().to_string()));
        }

        match message.message_type.as_str() {
            messages::CANCEL_TASK => {
                let task_id = message
                    .task_id
                    .ok_or_else(|| AgentError::InvalidMessage("cancel_task requires task_id".to_string()))?;
                let cancelled = self.core.cancel_task(task_id);
                Ok(json!({ "taskId": task_id, "cancelled": cancelled }))
            }
            messages::EXECUTE_TOOL => {
                let name = message
                    .param("tool")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| AgentError::InvalidMessage("execute_tool requires a tool name".to_string()))?
                    .to_string();
                let params = message.param("params").cloned().unwrap_or(json!({}));
                self.core.execute_tool(&name, params).await
            }
            messages::LIST_TOOLS => Ok(serde_json::to_value(self.core.tool_descriptors())?),
            _ => self.dispatch(message).await,
        }
    }

    async fn dispatch(&self, message: AgentMessage) -> AgentResult<serde_json::Value> {
        let _exclusive = if self.behavior.concurrent() {
            None
        } else {
            Some(self.exclusive.lock().await)
        };

        let inflight = self.core.begin_task(message.task_id);
        let result = self.behavior.handle(&self.core, message, inflight.token()).await;
        drop(inflight);

        self.core.record_outcome(result.is_ok());
        self.core.touch_heartbeat();
        result
    }

    pub fn register_tool(&self, tool: Tool) {
        self.core.register_tool(tool);
    }

    pub async fn execute_tool(&self, name: &str, params: serde_json::Value) -> AgentResult<serde_json::Value> {
        self.core.execute_tool(name, params).await
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.core.has_capability(capability)
    }

    pub fn add_capability(&self, capability: impl Into<String>) -> bool {
        self.core.add_capability(capability)
    }

    pub fn remove_capability(&self, capability: &str) -> bool {
        self.core.remove_capability(capability)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("core", &self.core).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::events::EventBus;
    use crate::agents::types::AgentType;
    use crate::domain::repositories::{AgentRecord, AgentRepository};
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use uuid::Uuid;

    struct Echo;

    #[async_trait]
    impl AgentBehavior for Echo {
        fn default_capabilities(&self) -> Vec<String> {
            vec!["echo".to_string()]
        }

        async fn handle(
            &self,
            _core: &Arc<AgentCore>,
            message: AgentMessage,
            _cancel: CancellationToken,
        ) -> AgentResult<serde_json::Value> {
            Ok(json!({ "echo": message.content }))
        }
    }

    struct Broken;

    #[async_trait]
    impl AgentBehavior for Broken {
        async fn setup(&self, _core: &Arc<AgentCore>) -> AgentResult<()> {
            Err(AgentError::TaskExecutionFailed("no backend".to_string()))
        }

        async fn handle(
            &self,
            _core: &Arc<AgentCore>,
            _message: AgentMessage,
            _cancel: CancellationToken,
        ) -> AgentResult<serde_json::Value> {
            Ok(json!(null))
        }
    }

    /// Waits until cancelled, then reports it
    struct Patient;

    #[async_trait]
    impl AgentBehavior for Patient {
        async fn handle(
            &self,
            _core: &Arc<AgentCore>,
            _message: AgentMessage,
            cancel: CancellationToken,
        ) -> AgentResult<serde_json::Value> {
            cancel.cancelled().await;
            Err(AgentError::TaskCancelled)
        }
    }

    fn agent(behavior: Box<dyn AgentBehavior>, store: Arc<InMemoryAgentRepository>) -> Agent {
        let core = AgentCore::new("a", "Agent A", AgentType::Custom, store, EventBus::new(16));
        Agent::new(core, behavior, Duration::from_secs(30))
    }

    fn store() -> Arc<InMemoryAgentRepository> {
        Arc::new(InMemoryAgentRepository::with_records([AgentRecord::new(
            "a",
            "Agent A",
            AgentType::Custom,
        )
        .with_capabilities(["persisted"])]))
    }

    #[tokio::test]
    async fn initialize_loads_record_and_activates() {
        let agent = agent(Box::new(Echo), store());
        agent.initialize().await.unwrap();

        assert_eq!(agent.status(), AgentStatus::Active);
        assert!(agent.has_capability("persisted"));
        assert!(agent.has_capability("echo"));
    }

    #[tokio::test]
    async fn failed_setup_leaves_agent_in_error() {
        let agent = agent(Box::new(Broken), store());
        let result = agent.initialize().await;

        assert!(matches!(result, Err(AgentError::Initialization { .. })));
        assert_eq!(agent.status(), AgentStatus::Error);
    }

    #[tokio::test]
    async fn process_requires_active_status() {
        let agent = agent(Box::new(Echo), store());
        let result = agent.process(AgentMessage::new("chat", "hi")).await;

        assert!(matches!(result, Err(AgentError::AgentNotAvailable(_))));
    }

    #[tokio::test]
    async fn process_dispatches_to_behavior() {
        let agent = agent(Box::new(Echo), store());
        agent.initialize().await.unwrap();

        let out = agent.process(AgentMessage::new("chat", "hi")).await.unwrap();
        assert_eq!(out, json!({"echo": "hi"}));
        assert_eq!(agent.info().metrics.tasks_completed, 1);
    }

    #[tokio::test]
    async fn shutdown_persists_state_and_deactivates() {
        let store = store();
        let agent = agent(Box::new(Echo), Arc::clone(&store));
        agent.initialize().await.unwrap();
        agent.core().remember("note", json!("keep me"));

        agent.shutdown().await.unwrap();

        assert_eq!(agent.status(), AgentStatus::Inactive);
        let record = store.load_agent_record("a").await.unwrap().unwrap();
        assert_eq!(record.status, AgentStatus::Inactive);
        assert_eq!(record.memory.get("note"), Some(&json!("keep me")));
        assert!(record.capabilities.contains(&"echo".to_string()));
    }

    #[tokio::test]
    async fn restart_returns_to_active() {
        let agent = agent(Box::new(Echo), store());
        agent.initialize().await.unwrap();
        agent.restart().await.unwrap();

        assert_eq!(agent.status(), AgentStatus::Active);
        assert!(!agent.core().is_shutting_down());
    }

    #[tokio::test]
    async fn pause_blocks_processing_until_resumed() {
        let agent = agent(Box::new(Echo), store());
        agent.initialize().await.unwrap();

        agent.pause().unwrap();
        assert!(agent.process(AgentMessage::new("chat", "hi")).await.is_err());

        agent.resume().unwrap();
        assert!(agent.process(AgentMessage::new("chat", "hi")).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_tool_is_reported() {
        let agent = agent(Box::new(Echo), store());
        agent.initialize().await.unwrap();

        let result = agent.process(AgentMessage::tool("nope", json!({}))).await;
        assert!(matches!(result, Err(AgentError::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn cancel_task_message_reaches_running_task() {
        let agent = Arc::new(agent(Box::new(Patient), store()));
        agent.initialize().await.unwrap();
        let task_id = Uuid::new_v4();

        let running = {
            let agent = Arc::clone(&agent);
            tokio::spawn(async move {
                agent
                    .process(AgentMessage::task(task_id, "wait", json!({})))
                    .await
            })
        };

        while agent.core().inflight_tasks() == 0 {
            tokio::task::yield_now().await;
        }
        let ack = agent.process(AgentMessage::cancel(task_id)).await.unwrap();
        assert_eq!(ack["cancelled"], json!(true));

        let result = running.await.unwrap();
        assert!(matches!(result, Err(AgentError::TaskCancelled)));
        assert_eq!(agent.info().metrics.tasks_failed, 1);
    }
}
