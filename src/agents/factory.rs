use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::agent::{Agent, AgentBehavior};
use super::assistant::AssistantAgent;
use super::coordinator::CoordinatorAgent;
use super::errors::{AgentError, AgentResult};
use super::events::EventBus;
use super::inference::{EchoInferenceClient, InferenceClient};
use super::state::AgentCore;
use super::system::SystemAgent;
use super::types::AgentType;
use crate::config::ExecutorConfig;
use crate::domain::repositories::{AgentRecord, AgentRepository, PlanRepository};
use crate::planning::{AgentDispatcher, PlanExecutor};

/// Builds the behavior for a `custom` agent from its record
pub type AgentConstructor =
    Arc<dyn Fn(&AgentRecord) -> AgentResult<Box<dyn AgentBehavior>> + Send + Sync>;

/// Turns persisted agent records into runnable agents
///
/// Custom agents pick their constructor through `config.behavior`.
#[derive(Clone)]
pub struct AgentFactory {
    inference: Arc<dyn InferenceClient>,
    plans: Arc<dyn PlanRepository>,
    executor_config: ExecutorConfig,
    constructors: HashMap<String, AgentConstructor>,
}

impl AgentFactory {
    pub fn new(plans: Arc<dyn PlanRepository>, executor_config: ExecutorConfig) -> Self {
        Self {
            inference: Arc::new(EchoInferenceClient),
            plans,
            executor_config,
            constructors: HashMap::new(),
        }
    }

    pub fn with_inference(mut self, inference: Arc<dyn InferenceClient>) -> Self {
        self.inference = inference;
        self
    }

    pub fn register<F>(&mut self, behavior: impl Into<String>, constructor: F)
    where
        F: Fn(&AgentRecord) -> AgentResult<Box<dyn AgentBehavior>> + Send + Sync + 'static,
    {
        self.constructors.insert(behavior.into(), Arc::new(constructor));
    }

    fn behavior(
        &self,
        record: &AgentRecord,
        dispatcher: Arc<dyn AgentDispatcher>,
        events: &EventBus,
    ) -> AgentResult<Box<dyn AgentBehavior>> {
        match record.agent_type {
            AgentType::System => Ok(Box::new(SystemAgent::new())),
            AgentType::Assistant => Ok(Box::new(AssistantAgent::new(Arc::clone(&self.inference)))),
            AgentType::Coordinator => {
                let executor = PlanExecutor::new(
                    dispatcher,
                    Arc::clone(&self.plans),
                    events.clone(),
                    self.executor_config.clone(),
                );
                Ok(Box::new(CoordinatorAgent::new(Arc::new(executor))))
            }
            AgentType::Custom => {
                let name = record.behavior().ok_or_else(|| AgentError::Initialization {
                    agent_id: record.id.clone(),
                    reason: "custom agent has no config.behavior".to_string(),
                })?;
                let constructor = self.constructors.get(name).ok_or_else(|| AgentError::Initialization {
                    agent_id: record.id.clone(),
                    reason: format!("no constructor registered for behavior '{}'", name),
                })?;
                constructor(record)
            }
        }
    }

    /// Creates an uninitialized agent for `record`
    pub fn build(
        &self,
        record: &AgentRecord,
        store: Arc<dyn AgentRepository>,
        events: EventBus,
        dispatcher: Arc<dyn AgentDispatcher>,
        heartbeat_interval: Duration,
    ) -> AgentResult<Agent> {
        let behavior = self.behavior(record, dispatcher, &events)?;
        let core = AgentCore::new(&record.id, &record.name, record.agent_type, store, events);
        Ok(Agent::new(core, behavior, heartbeat_interval))
    }
}
