// Agent state management
//
// `AgentCore` is the shared, lock-protected state every agent variant works
// against: identity, status, capabilities, config, memory, tools, heartbeat
// and the cancellation tokens of in-flight work. Locks are never held across
// an await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::errors::{AgentError, AgentResult};
use super::events::{AgentEvent, EventBus};
use super::tools::{Tool, ToolDescriptor, ToolRegistry};
use super::types::{AgentInfo, AgentMetrics, AgentStatus, AgentType};
use crate::domain::repositories::{AgentRecord, AgentRepository};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AgentCore {
    id: String,
    name: String,
    agent_type: AgentType,
    status: Mutex<AgentStatus>,
    capabilities: RwLock<Vec<String>>,
    config: RwLock<serde_json::Value>,
    memory: RwLock<HashMap<String, serde_json::Value>>,
    /// Memory changes not yet written to the store (`None` = deleted)
    dirty_memory: Mutex<HashMap<String, Option<serde_json::Value>>>,
    tools: RwLock<ToolRegistry>,
    last_heartbeat: RwLock<DateTime<Utc>>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    lifecycle: Mutex<CancellationToken>,
    inflight: Mutex<HashMap<Uuid, CancellationToken>>,
    inflight_count: AtomicUsize,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    store: Arc<dyn AgentRepository>,
    events: EventBus,
}

impl AgentCore {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        agent_type: AgentType,
        store: Arc<dyn AgentRepository>,
        events: EventBus,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_type,
            status: Mutex::new(AgentStatus::Inactive),
            capabilities: RwLock::new(Vec::new()),
            config: RwLock::new(serde_json::Value::Null),
            memory: RwLock::new(HashMap::new()),
            dirty_memory: Mutex::new(HashMap::new()),
            tools: RwLock::new(ToolRegistry::default()),
            last_heartbeat: RwLock::new(Utc::now()),
            started_at: RwLock::new(None),
            lifecycle: Mutex::new(CancellationToken::new()),
            inflight: Mutex::new(HashMap::new()),
            inflight_count: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            store,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    pub fn store(&self) -> &Arc<dyn AgentRepository> {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // ===== Status =====

    pub fn status(&self) -> AgentStatus {
        *lock(&self.status)
    }

    /// Moves to `next` if the lifecycle allows it and publishes the change
    pub(crate) fn set_status(&self, next: AgentStatus) -> AgentResult<()> {
        let previous = {
            let mut status = lock(&self.status);
            if !status.can_transition_to(next) {
                return Err(AgentError::InvalidStateTransition {
                    from: status.to_string(),
                    to: next.to_string(),
                });
            }
            std::mem::replace(&mut *status, next)
        };

        self.events.publish(AgentEvent::StatusChanged {
            agent_id: self.id.clone(),
            from: previous,
            to: next,
        });
        Ok(())
    }

    // ===== Capabilities =====

    pub fn capabilities(&self) -> Vec<String> {
        read(&self.capabilities).clone()
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        read(&self.capabilities).iter().any(|c| c == capability)
    }

    /// Adds a capability; adding an existing one is a no-op
    pub fn add_capability(&self, capability: impl Into<String>) -> bool {
        let capability = capability.into();
        let mut capabilities = write(&self.capabilities);
        if capabilities.contains(&capability) {
            return false;
        }
        capabilities.push(capability);
        true
    }

    pub fn remove_capability(&self, capability: &str) -> bool {
        let mut capabilities = write(&self.capabilities);
        let before = capabilities.len();
        capabilities.retain(|c| c != capability);
        capabilities.len() != before
    }

    // ===== Config =====

    pub fn config(&self) -> serde_json::Value {
        read(&self.config).clone()
    }

    pub fn config_value(&self, key: &str) -> Option<serde_json::Value> {
        read(&self.config).get(key).cloned()
    }

    /// Shallow-merges an object into the config; a non-object replaces it
    pub fn merge_config(&self, patch: serde_json::Value) {
        let mut config = write(&self.config);
        match (&mut *config, patch) {
            (serde_json::Value::Object(current), serde_json::Value::Object(patch)) => {
                current.extend(patch);
            }
            (current, patch) => *current = patch,
        }
    }

    // ===== Memory =====

    pub fn recall(&self, key: &str) -> Option<serde_json::Value> {
        read(&self.memory).get(key).cloned()
    }

    /// Stores a memory entry; persisted at the next heartbeat or shutdown
    pub fn remember(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        write(&self.memory).insert(key.clone(), value.clone());
        lock(&self.dirty_memory).insert(key, Some(value));
    }

    pub fn forget(&self, key: &str) {
        write(&self.memory).remove(key);
        lock(&self.dirty_memory).insert(key.to_string(), None);
    }

    pub fn memory_len(&self) -> usize {
        read(&self.memory).len()
    }

    /// Writes buffered memory changes to the store
    ///
    /// Entries that fail to persist are put back so the next flush retries them.
    pub async fn flush_memory(&self) -> AgentResult<()> {
        let pending: Vec<(String, Option<serde_json::Value>)> =
            lock(&self.dirty_memory).drain().collect();
        if pending.is_empty() {
            return Ok(());
        }

        let mut first_error = None;
        for (key, value) in pending {
            let result = match &value {
                Some(v) => self.store.save_memory_entry(&self.id, &key, v).await,
                None => self.store.delete_memory_entry(&self.id, &key).await,
            };
            if let Err(e) = result {
                lock(&self.dirty_memory).entry(key).or_insert(value);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(AgentError::Store(e)),
            None => Ok(()),
        }
    }

    // ===== Tools =====

    pub fn register_tool(&self, tool: Tool) {
        debug!(agent_id = %self.id, tool = %tool.name, "Registering tool");
        write(&self.tools).register(tool);
    }

    pub fn has_tool(&self, name: &str) -> bool {
        read(&self.tools).contains(name)
    }

    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        read(&self.tools).descriptors()
    }

    pub async fn execute_tool(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> AgentResult<serde_json::Value> {
        let tool = read(&self.tools)
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound {
                agent_id: self.id.clone(),
                tool: name.to_string(),
            })?;

        let result = tool.invoke(params).await;
        self.events.publish(AgentEvent::ToolInvoked {
            agent_id: self.id.clone(),
            tool: name.to_string(),
            success: result.is_ok(),
        });
        result
    }

    // ===== Heartbeat =====

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        *read(&self.last_heartbeat)
    }

    pub fn touch_heartbeat(&self) {
        *write(&self.last_heartbeat) = Utc::now();
    }

    #[doc(hidden)]
    pub fn set_last_heartbeat(&self, at: DateTime<Utc>) {
        *write(&self.last_heartbeat) = at;
    }

    pub(crate) fn mark_started(&self) {
        *write(&self.started_at) = Some(Utc::now());
    }

    // ===== Cancellation =====

    /// Replaces the lifecycle token with a fresh one and returns it
    pub(crate) fn renew_lifecycle(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock(&self.lifecycle) = token.clone();
        token
    }

    pub fn lifecycle_token(&self) -> CancellationToken {
        lock(&self.lifecycle).clone()
    }

    /// Cancels the lifecycle token; in-flight work observes this through its child token
    pub(crate) fn begin_shutdown(&self) {
        lock(&self.lifecycle).cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        lock(&self.lifecycle).is_cancelled()
    }

    /// Registers an in-flight task and hands out its cancellation token
    pub(crate) fn begin_task(self: &Arc<Self>, task_id: Option<Uuid>) -> InflightTask {
        let token = self.lifecycle_token().child_token();
        if let Some(id) = task_id {
            lock(&self.inflight).insert(id, token.clone());
        }
        self.inflight_count.fetch_add(1, Ordering::SeqCst);
        InflightTask {
            core: Arc::clone(self),
            task_id,
            token,
        }
    }

    /// Advisory cancel of one in-flight task; returns whether it was found
    pub fn cancel_task(&self, task_id: Uuid) -> bool {
        match lock(&self.inflight).get(&task_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn inflight_tasks(&self) -> usize {
        self.inflight_count.load(Ordering::SeqCst)
    }

    // ===== Records and views =====

    pub(crate) fn record_outcome(&self, success: bool) {
        let counter = if success {
            &self.tasks_completed
        } else {
            &self.tasks_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> AgentMetrics {
        let uptime_secs = read(&self.started_at)
            .map(|started| (Utc::now() - started).num_seconds())
            .unwrap_or(0);
        AgentMetrics {
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            uptime_secs,
        }
    }

    pub fn info(&self) -> AgentInfo {
        AgentInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            agent_type: self.agent_type,
            status: self.status(),
            capabilities: self.capabilities(),
            last_heartbeat: self.last_heartbeat(),
            metrics: self.metrics(),
        }
    }

    /// Loads persisted capabilities, config and memory
    pub(crate) fn apply_record(&self, record: &AgentRecord) {
        for capability in &record.capabilities {
            self.add_capability(capability.clone());
        }
        if !record.config.is_null() {
            self.merge_config(record.config.clone());
        }
        write(&self.memory).extend(record.memory.clone());
    }

    /// Snapshot of the persistable state
    pub fn to_record(&self) -> AgentRecord {
        AgentRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            agent_type: self.agent_type,
            status: self.status(),
            capabilities: self.capabilities(),
            config: self.config(),
            memory: read(&self.memory).clone(),
        }
    }
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("id", &self.id)
            .field("agent_type", &self.agent_type)
            .field("status", &self.status())
            .finish()
    }
}

/// Guard for one `process` call; unregisters the task when dropped
pub struct InflightTask {
    core: Arc<AgentCore>,
    task_id: Option<Uuid>,
    token: CancellationToken,
}

impl InflightTask {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for InflightTask {
    fn drop(&mut self) {
        if let Some(id) = self.task_id {
            lock(&self.core.inflight).remove(&id);
        }
        self.core.inflight_count.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryAgentRepository;
    use serde_json::json;

    fn core() -> Arc<AgentCore> {
        let store = Arc::new(InMemoryAgentRepository::with_records([AgentRecord::new(
            "a",
            "Agent A",
            AgentType::Assistant,
        )]));
        Arc::new(AgentCore::new("a", "Agent A", AgentType::Assistant, store, EventBus::new(16)))
    }

    #[test]
    fn add_capability_is_idempotent() {
        let core = core();

        assert!(core.add_capability("analysis"));
        assert!(!core.add_capability("analysis"));
        assert_eq!(core.capabilities(), vec!["analysis"]);

        assert!(core.remove_capability("analysis"));
        assert!(!core.remove_capability("analysis"));
        assert!(!core.has_capability("analysis"));
    }

    #[test]
    fn invalid_status_transition_is_rejected() {
        let core = core();
        let result = core.set_status(AgentStatus::Active);

        assert!(matches!(result, Err(AgentError::InvalidStateTransition { .. })));
        assert_eq!(core.status(), AgentStatus::Inactive);
    }

    #[test]
    fn merge_config_extends_objects() {
        let core = core();
        core.merge_config(json!({"model": "a"}));
        core.merge_config(json!({"temperature": 0.2}));

        assert_eq!(core.config(), json!({"model": "a", "temperature": 0.2}));
    }

    #[tokio::test]
    async fn memory_is_buffered_until_flush() {
        let core = core();
        core.remember("topic", json!("rust"));

        let stored = core.store().load_agent_record("a").await.unwrap().unwrap();
        assert!(stored.memory.is_empty());

        core.flush_memory().await.unwrap();
        let stored = core.store().load_agent_record("a").await.unwrap().unwrap();
        assert_eq!(stored.memory.get("topic"), Some(&json!("rust")));

        core.forget("topic");
        core.flush_memory().await.unwrap();
        let stored = core.store().load_agent_record("a").await.unwrap().unwrap();
        assert!(stored.memory.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_fails() {
        let core = core();
        let result = core.execute_tool("missing", json!({})).await;

        assert!(matches!(result, Err(AgentError::ToolNotFound { .. })));
    }

    #[test]
    fn cancel_task_reaches_inflight_token() {
        let core = core();
        let task_id = Uuid::new_v4();
        let inflight = core.begin_task(Some(task_id));

        assert_eq!(core.inflight_tasks(), 1);
        assert!(core.cancel_task(task_id));
        assert!(inflight.token().is_cancelled());

        drop(inflight);
        assert_eq!(core.inflight_tasks(), 0);
        assert!(!core.cancel_task(task_id));
    }

    #[test]
    fn shutdown_cancels_child_tokens() {
        let core = core();
        let inflight = core.begin_task(None);

        core.begin_shutdown();
        assert!(core.is_shutting_down());
        assert!(inflight.token().is_cancelled());

        core.renew_lifecycle();
        assert!(!core.is_shutting_down());
    }
}
