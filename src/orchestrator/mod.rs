// Agent orchestration
//
// The orchestrator is the single owner of the live agent map. It is
// constructed explicitly and shared as `Arc<Orchestrator>`; plan executors
// reach it through a weak handle so agents and orchestrator never form a cycle.

pub mod control;
pub mod health;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::agents::agent::Agent;
use crate::agents::errors::{AgentError, AgentResult};
use crate::agents::events::EventBus;
use crate::agents::factory::AgentFactory;
use crate::agents::messages::AgentMessage;
use crate::agents::types::{AgentInfo, AgentStatus};
use crate::config::{ExecutorConfig, OrchestratorConfig};
use crate::domain::plan::{PlanSummary, Task};
use crate::domain::repositories::{AgentRecord, AgentRepository, PlanRepository};
use crate::planning::{AgentDispatcher, PlanExecutor};

pub use control::{spawn_control_listener, ControlOutcome};
pub use health::{spawn_health_monitor, AgentHealth, Liveness};

/// Outcome of a best-effort broadcast
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    pub delivered: Vec<String>,
    pub failed: Vec<BroadcastFailure>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastFailure {
    pub agent_id: String,
    pub error: String,
}

pub struct Orchestrator {
    agents: RwLock<BTreeMap<String, Arc<Agent>>>,
    start_gates: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    health: std::sync::RwLock<HashMap<String, AgentHealth>>,
    store: Arc<dyn AgentRepository>,
    factory: AgentFactory,
    events: EventBus,
    config: OrchestratorConfig,
    executor: Arc<PlanExecutor>,
    handle: Weak<Orchestrator>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn AgentRepository>,
        plans: Arc<dyn PlanRepository>,
        factory: AgentFactory,
        events: EventBus,
        config: OrchestratorConfig,
        executor_config: ExecutorConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|handle: &Weak<Orchestrator>| {
            let dispatcher: Arc<dyn AgentDispatcher> = Arc::new(OrchestratorHandle(handle.clone()));
            let executor = PlanExecutor::new(dispatcher, plans, events.clone(), executor_config);
            Self {
                agents: RwLock::new(BTreeMap::new()),
                start_gates: std::sync::Mutex::new(HashMap::new()),
                health: std::sync::RwLock::new(HashMap::new()),
                store,
                factory,
                events,
                config,
                executor: Arc::new(executor),
                handle: handle.clone(),
            }
        })
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<PlanExecutor> {
        &self.executor
    }

    pub fn store(&self) -> &Arc<dyn AgentRepository> {
        &self.store
    }

    fn dispatcher(&self) -> Arc<dyn AgentDispatcher> {
        Arc::new(OrchestratorHandle(self.handle.clone()))
    }

    fn start_gate(&self, agent_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.start_gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(agent_id.to_string()).or_default())
    }

    async fn live(&self, agent_id: &str) -> Option<Arc<Agent>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Loads the record, builds the agent for its type and initializes it
    ///
    /// Already running is a no-op. Concurrent starts for one id are serialized.
    /// A failed initialization leaves the agent out of the live map.
    pub async fn start_agent(&self, agent_id: &str) -> AgentResult<()> {
        let gate = self.start_gate(agent_id);
        let _guard = gate.lock().await;

        if self.agents.read().await.contains_key(agent_id) {
            info!(agent_id, "Agent already running");
            return Ok(());
        }

        let record = self
            .store
            .load_agent_record(agent_id)
            .await
            .map_err(AgentError::Store)?
            .ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))?;

        let agent = match self.factory.build(
            &record,
            Arc::clone(&self.store),
            self.events.clone(),
            self.dispatcher(),
            self.config.heartbeat_interval,
        ) {
            Ok(agent) => agent,
            Err(e) => {
                if let Err(store_err) = self.store.update_agent_status(agent_id, AgentStatus::Error).await {
                    debug!(agent_id, error = %store_err, "Could not persist error status");
                }
                error!(agent_id, error = %e, "Could not construct agent");
                return Err(e);
            }
        };

        agent.initialize().await?;
        self.agents
            .write()
            .await
            .insert(agent_id.to_string(), Arc::new(agent));
        info!(agent_id, agent_type = %record.agent_type, "Agent started");
        Ok(())
    }

    /// Removes the agent from the live map and shuts it down
    ///
    /// Not running is a no-op. Shutdown errors are logged, never returned.
    pub async fn stop_agent(&self, agent_id: &str) -> AgentResult<()> {
        let removed = self.agents.write().await.remove(agent_id);
        let Some(agent) = removed else {
            warn!(agent_id, "Stop requested for agent that is not running");
            return Ok(());
        };

        self.health
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent_id);
        if let Err(e) = agent.shutdown().await {
            warn!(agent_id, error = %e, "Agent shutdown failed; removed anyway");
        }
        info!(agent_id, "Agent stopped");
        Ok(())
    }

    /// Stop then start; on start failure the agent stays absent
    pub async fn restart_agent(&self, agent_id: &str) -> AgentResult<()> {
        self.stop_agent(agent_id).await?;
        self.start_agent(agent_id).await
    }

    pub async fn send_message_to_agent(
        &self,
        agent_id: &str,
        message: AgentMessage,
    ) -> AgentResult<serde_json::Value> {
        let agent = self
            .live(agent_id)
            .await
            .ok_or_else(|| AgentError::AgentNotAvailable(agent_id.to_string()))?;
        agent.process(message).await
    }

    /// Delivers `message` to every live agent matching `filter`
    ///
    /// Per-agent failures are logged and reported, never returned as an error.
    pub async fn broadcast_message(
        &self,
        message: AgentMessage,
        filter: Option<&(dyn Fn(&AgentInfo) -> bool + Send + Sync)>,
    ) -> BroadcastReport {
        let targets: Vec<Arc<Agent>> = self
            .agents
            .read()
            .await
            .values()
            .filter(|agent| filter.map_or(true, |f| f(&agent.info())))
            .cloned()
            .collect();

        let deliveries = targets.iter().map(|agent| {
            let message = message.clone();
            async move { (agent.id().to_string(), agent.process(message).await) }
        });

        let mut report = BroadcastReport::default();
        for (agent_id, result) in join_all(deliveries).await {
            match result {
                Ok(_) => report.delivered.push(agent_id),
                Err(e) => {
                    warn!(agent_id = %agent_id, error = %e, "Broadcast delivery failed");
                    report.failed.push(BroadcastFailure {
                        agent_id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Live agents ordered by id
    pub async fn get_available_agents(&self) -> Vec<AgentInfo> {
        self.agents.read().await.values().map(|agent| agent.info()).collect()
    }

    pub async fn get_agent_info(&self, agent_id: &str) -> Option<AgentInfo> {
        self.live(agent_id).await.map(|agent| agent.info())
    }

    pub async fn is_running(&self, agent_id: &str) -> bool {
        self.agents.read().await.contains_key(agent_id)
    }

    pub async fn coordinate_task(&self, task: &Task) -> AgentResult<PlanSummary> {
        self.executor.coordinate_task(task).await
    }

    /// Every persisted record, running or not
    pub async fn registered_agents(&self) -> AgentResult<Vec<AgentRecord>> {
        self.store.list_agent_records().await.map_err(AgentError::Store)
    }

    /// Persists a new or replaced agent record
    pub async fn register_agent(&self, record: AgentRecord) -> AgentResult<()> {
        self.store
            .save_agent_record(&record)
            .await
            .map_err(AgentError::Store)?;
        info!(agent_id = %record.id, agent_type = %record.agent_type, "Agent registered");
        Ok(())
    }

    /// Applies `{ name?, capabilities?, config? }` to the record and, if running, the live agent
    ///
    /// `capabilities` replaces the set; `config` is merged.
    pub async fn update_agent(&self, agent_id: &str, payload: serde_json::Value) -> AgentResult<AgentRecord> {
        let capabilities: Option<Vec<String>> = payload
            .get("capabilities")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?;
        let config = payload.get("config").filter(|c| c.is_object()).cloned();

        let record = match self.live(agent_id).await {
            Some(agent) => {
                let core = agent.core();
                if let Some(capabilities) = &capabilities {
                    for existing in core.capabilities() {
                        if !capabilities.contains(&existing) {
                            core.remove_capability(&existing);
                        }
                    }
                    for capability in capabilities {
                        core.add_capability(capability.clone());
                    }
                }
                if let Some(config) = config {
                    core.merge_config(config);
                }
                core.to_record()
            }
            None => {
                let mut record = self
                    .store
                    .load_agent_record(agent_id)
                    .await
                    .map_err(AgentError::Store)?
                    .ok_or_else(|| AgentError::AgentNotFound(agent_id.to_string()))?;
                if let Some(capabilities) = capabilities {
                    record.capabilities = capabilities;
                }
                if let Some(serde_json::Value::Object(patch)) = config {
                    match record.config.as_object_mut() {
                        Some(current) => current.extend(patch),
                        None => record.config = serde_json::Value::Object(patch),
                    }
                }
                record
            }
        };

        let mut record = record;
        if let Some(name) = payload.get("name").and_then(|v| v.as_str()) {
            record.name = name.to_string();
        }
        self.store
            .save_agent_record(&record)
            .await
            .map_err(AgentError::Store)?;
        info!(agent_id, "Agent updated");
        Ok(record)
    }

    /// Starts each id, logging failures; returns the ids that are running afterwards
    pub async fn autostart(&self, agent_ids: &[String]) -> Vec<String> {
        let mut started = Vec::new();
        for agent_id in agent_ids {
            match self.start_agent(agent_id).await {
                Ok(()) => started.push(agent_id.clone()),
                Err(e) => error!(agent_id = %agent_id, error = %e, "Autostart failed"),
            }
        }
        started
    }

    /// Cancels live plans and shuts every agent down
    pub async fn stop_all(&self) {
        self.executor.cancel_all().await;

        let agents: Vec<(String, Arc<Agent>)> = std::mem::take(&mut *self.agents.write().await)
            .into_iter()
            .collect();
        let shutdowns = agents.iter().map(|(agent_id, agent)| async move {
            if let Err(e) = agent.shutdown().await {
                warn!(agent_id = %agent_id, error = %e, "Agent shutdown failed");
            }
        });
        join_all(shutdowns).await;

        self.health.write().unwrap_or_else(PoisonError::into_inner).clear();
        info!(count = agents.len(), "All agents stopped");
    }
}

#[async_trait]
impl AgentDispatcher for Orchestrator {
    async fn dispatch(&self, agent_id: &str, message: AgentMessage) -> AgentResult<serde_json::Value> {
        self.send_message_to_agent(agent_id, message).await
    }

    async fn available_agents(&self) -> Vec<AgentInfo> {
        self.get_available_agents().await
    }
}

/// Weak dispatcher handed to plan executors
struct OrchestratorHandle(Weak<Orchestrator>);

#[async_trait]
impl AgentDispatcher for OrchestratorHandle {
    async fn dispatch(&self, agent_id: &str, message: AgentMessage) -> AgentResult<serde_json::Value> {
        match self.0.upgrade() {
            Some(orchestrator) => orchestrator.send_message_to_agent(agent_id, message).await,
            None => Err(AgentError::AgentNotAvailable(agent_id.to_string())),
        }
    }

    async fn available_agents(&self) -> Vec<AgentInfo> {
        match self.0.upgrade() {
            Some(orchestrator) => orchestrator.get_available_agents().await,
            None => Vec::new(),
        }
    }
}
