//! Dependency-aware plan execution
//!
//! Rounds are strictly sequential: each round dispatches every ready step
//! concurrently and waits for the round before computing the next ready set.
//! Steps are spawned as their own tasks, so an aborted or cancelled round never
//! forcibly stops agent work; late results are simply ignored.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use futures::future::{join_all, try_join_all};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agents::errors::{AgentError, AgentResult};
use crate::agents::events::{AgentEvent, EventBus};
use crate::agents::messages::AgentMessage;
use crate::agents::types::{AgentInfo, AgentType};
use crate::config::{DispatchPolicy, ExecutorConfig};
use crate::domain::plan::{PlanFailure, PlanStatus, PlanSummary, StepStatus, Task, TaskPlan};
use crate::domain::repositories::PlanRepository;

use super::builder::PlanBuilder;
use super::conflict::{resolver_for, ConflictResolver, Contender};
use super::dispatcher::AgentDispatcher;
use super::leases::AgentLeases;

struct LivePlan {
    plan: Mutex<TaskPlan>,
    cancel: CancellationToken,
    priority: i32,
}

impl LivePlan {
    fn lock(&self) -> MutexGuard<'_, TaskPlan> {
        self.plan.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the live plan table and drives plans to completion
pub struct PlanExecutor {
    dispatcher: Arc<dyn AgentDispatcher>,
    builder: PlanBuilder,
    resolver: Arc<dyn ConflictResolver>,
    leases: Arc<AgentLeases>,
    repository: Arc<dyn PlanRepository>,
    events: EventBus,
    config: ExecutorConfig,
    plans: RwLock<HashMap<Uuid, Arc<LivePlan>>>,
}

impl PlanExecutor {
    pub fn new(
        dispatcher: Arc<dyn AgentDispatcher>,
        repository: Arc<dyn PlanRepository>,
        events: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        let resolver = resolver_for(config.conflict_policy);
        Self {
            dispatcher,
            builder: PlanBuilder::default(),
            leases: AgentLeases::new(Arc::clone(&resolver)),
            resolver,
            repository,
            events,
            config,
            plans: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builder(mut self, builder: PlanBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn builder(&self) -> &PlanBuilder {
        &self.builder
    }

    /// Decompose, run and summarize a task
    pub async fn coordinate_task(self: &Arc<Self>, task: &Task) -> AgentResult<PlanSummary> {
        let plan_id = self.create_plan(task).await?;
        self.execute_plan(plan_id).await
    }

    /// Create a plan and run it in the background; poll with `wait_for_completion`
    pub async fn submit_task(self: &Arc<Self>, task: &Task) -> AgentResult<Uuid> {
        let plan_id = self.create_plan(task).await?;
        let executor = Arc::clone(self);
        tokio::spawn(async move {
            match executor.execute_plan(plan_id).await {
                Ok(summary) => info!(plan_id = %plan_id, status = %summary.status, "Background plan finished"),
                Err(e) => warn!(plan_id = %plan_id, error = %e, "Background plan failed"),
            }
        });
        Ok(plan_id)
    }

    /// Builds the steps, assigns agents and registers the plan as live
    ///
    /// Steps no agent can serve stay `Pending`; execution will report them as deadlocked.
    /// Coordinator agents never receive plan steps: they would plan the step again.
    pub async fn create_plan(&self, task: &Task) -> AgentResult<Uuid> {
        let steps = self.builder.decompose_task(task);
        let mut plan =
            TaskPlan::new(task.id, task.summary(), steps).map_err(AgentError::TaskExecutionFailed)?;

        let mut candidates = self.dispatcher.available_agents().await;
        candidates.retain(|agent| agent.agent_type != AgentType::Coordinator);
        for step in plan.steps_mut() {
            let chosen = self.builder.select_best_agent_with(
                &step.required_capabilities,
                &candidates,
                self.resolver.as_ref(),
                task.priority,
            );
            match chosen {
                Some(agent) => step
                    .assign(agent.id.clone())
                    .map_err(AgentError::TaskExecutionFailed)?,
                None => warn!(
                    step_id = %step.id,
                    capabilities = ?step.required_capabilities,
                    "No agent matches step; it stays pending"
                ),
            }
        }

        let plan_id = plan.id();
        let step_count = plan.steps().len();
        self.checkpoint(&plan).await;
        self.plans.write().unwrap_or_else(PoisonError::into_inner).insert(
            plan_id,
            Arc::new(LivePlan {
                plan: Mutex::new(plan),
                cancel: CancellationToken::new(),
                priority: task.priority,
            }),
        );

        self.events.publish(AgentEvent::PlanCreated { plan_id, step_count });
        info!(plan_id = %plan_id, task_id = %task.id, step_count, "Plan created");
        Ok(plan_id)
    }

    /// Runs a live plan until every step is terminal
    ///
    /// Returns the summary for `completed` plans and plans whose steps failed.
    /// Deadlock, fail-fast aborts and cancellation are returned as errors; the
    /// terminal plan is checkpointed and remains queryable through `get_plan`.
    pub async fn execute_plan(self: &Arc<Self>, plan_id: Uuid) -> AgentResult<PlanSummary> {
        let live = self.live(plan_id)?;
        let snapshot = {
            let mut plan = live.lock();
            plan.start().map_err(AgentError::TaskExecutionFailed)?;
            plan.clone()
        };
        self.checkpoint(&snapshot).await;
        info!(plan_id = %plan_id, "Executing plan");

        let outcome = self.drive(plan_id, &live).await;
        self.conclude(plan_id, &live, outcome).await
    }

    async fn conclude(&self, plan_id: Uuid, live: &LivePlan, outcome: AgentResult<()>) -> AgentResult<PlanSummary> {
        let snapshot = live.lock().clone();
        if live.cancel.is_cancelled() {
            if snapshot.failure() == Some(&PlanFailure::Cancelled) {
                return Err(AgentError::PlanCancelled(plan_id));
            }
            // settled before the cancel landed; cancel_plan already checkpointed and evicted it
            return outcome.map(|_| snapshot.summary());
        }

        self.finalize(&snapshot).await;
        outcome.map(|_| snapshot.summary())
    }

    async fn drive(self: &Arc<Self>, plan_id: Uuid, live: &Arc<LivePlan>) -> AgentResult<()> {
        let mut round = 0usize;
        loop {
            if live.cancel.is_cancelled() {
                return Err(AgentError::PlanCancelled(plan_id));
            }

            let dispatches = {
                let mut plan = live.lock();
                let unfinished = plan.unfinished_steps();
                if unfinished.is_empty() {
                    plan.finish().map_err(AgentError::TaskExecutionFailed)?;
                    return Ok(());
                }

                let ready = plan.ready_steps();
                if ready.is_empty() {
                    let blocked: Vec<Uuid> = unfinished
                        .into_iter()
                        .filter(|id| plan.step(*id).map(|s| s.status) != Some(StepStatus::Executing))
                        .collect();
                    let failed = plan.failed_steps();
                    let starved = blocked.iter().any(|id| waits_on_unassigned(&plan, *id));
                    if !failed.is_empty() && !starved {
                        // everything left waits on a failed step: a step error, not a deadlock
                        plan.fail(PlanFailure::StepFailed { steps: failed })
                            .map_err(AgentError::TaskExecutionFailed)?;
                        return Ok(());
                    }
                    plan.fail(PlanFailure::Deadlock {
                        blocked_steps: blocked.clone(),
                    })
                    .map_err(AgentError::TaskExecutionFailed)?;
                    warn!(plan_id = %plan_id, blocked = blocked.len(), "Plan deadlocked");
                    return Err(AgentError::Deadlock {
                        plan_id,
                        blocked_steps: blocked,
                    });
                }

                let mut dispatches = Vec::with_capacity(ready.len());
                for step_id in ready {
                    let Some(step) = plan.step_mut(step_id) else {
                        continue;
                    };
                    step.start().map_err(AgentError::TaskExecutionFailed)?;
                    let Some(agent_id) = step.agent_id.clone() else {
                        continue;
                    };
                    let message =
                        AgentMessage::task(step.id, step.description.clone(), step.input.clone());
                    dispatches.push((step_id, agent_id, message));
                }
                dispatches
            };

            let agents: HashMap<String, AgentInfo> = self
                .dispatcher
                .available_agents()
                .await
                .into_iter()
                .map(|agent| (agent.id.clone(), agent))
                .collect();

            round += 1;
            debug!(plan_id = %plan_id, round, steps = dispatches.len(), "Dispatching round");
            for (step_id, _, _) in &dispatches {
                self.publish_step(plan_id, *step_id, StepStatus::Executing);
            }
            self.checkpoint_step(live).await;

            let handles: Vec<_> = dispatches
                .into_iter()
                .map(|(step_id, agent_id, message)| {
                    let executor = Arc::clone(self);
                    let live = Arc::clone(live);
                    let contender = agents
                        .get(&agent_id)
                        .map(|agent| Contender::new(agent.clone(), live.priority));
                    tokio::spawn(async move {
                        executor
                            .run_step(plan_id, &live, step_id, &agent_id, contender, message)
                            .await
                    })
                })
                .collect();
            let rounds = handles.into_iter().map(|handle| async move {
                handle
                    .await
                    .map_err(|e| AgentError::TaskExecutionFailed(format!("step task panicked: {}", e)))?
            });

            match self.config.dispatch_policy {
                DispatchPolicy::FailFast => {
                    let result = tokio::select! {
                        result = try_join_all(rounds) => result,
                        _ = live.cancel.cancelled() => return Err(AgentError::PlanCancelled(plan_id)),
                    };
                    if let Err(e) = result {
                        self.abort(plan_id, live, &e);
                        return Err(e);
                    }
                }
                DispatchPolicy::CompleteRound => {
                    let results = tokio::select! {
                        results = join_all(rounds) => results,
                        _ = live.cancel.cancelled() => return Err(AgentError::PlanCancelled(plan_id)),
                    };
                    for e in results.into_iter().filter_map(Result::err) {
                        debug!(plan_id = %plan_id, error = %e, "Step failed; round continues");
                    }
                }
            }
        }
    }

    async fn run_step(
        &self,
        plan_id: Uuid,
        live: &LivePlan,
        step_id: Uuid,
        agent_id: &str,
        contender: Option<Contender>,
        message: AgentMessage,
    ) -> AgentResult<()> {
        // an agent that left the registry gets no lease; dispatch reports it unavailable
        let lease = match contender {
            Some(contender) => Some(self.leases.acquire(contender).await),
            None => None,
        };
        if live.lock().step(step_id).map(|s| s.status) != Some(StepStatus::Executing) {
            debug!(plan_id = %plan_id, step_id = %step_id, "Step settled while waiting for its agent");
            return Ok(());
        }

        let outcome = self.dispatcher.dispatch(agent_id, message).await;
        drop(lease);

        let status = {
            let mut plan = live.lock();
            let Some(step) = plan.step_mut(step_id) else {
                return Ok(());
            };
            if step.status != StepStatus::Executing {
                debug!(plan_id = %plan_id, step_id = %step_id, "Ignoring late step result");
                return Ok(());
            }
            let recorded = match &outcome {
                Ok(output) => step.complete(output.clone()),
                Err(e) => step.fail(e.to_string()),
            };
            recorded.map_err(AgentError::TaskExecutionFailed)?;
            step.status
        };

        self.publish_step(plan_id, step_id, status);
        self.checkpoint_step(live).await;

        match outcome {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(plan_id = %plan_id, step_id = %step_id, agent_id, error = %e, "Step failed");
                Err(AgentError::execution(step_id, &e))
            }
        }
    }

    /// Fail-fast: the round is abandoned, the plan fails with the first error
    fn abort(&self, plan_id: Uuid, live: &LivePlan, error: &AgentError) {
        let step_id = match error {
            AgentError::Execution { step_id, .. } => *step_id,
            _ => Uuid::nil(),
        };
        let abandoned = {
            let mut plan = live.lock();
            let executing = plan.steps_with_status(StepStatus::Executing);
            for id in &executing {
                if let Some(step) = plan.step_mut(*id) {
                    if let Err(e) = step.fail("dispatch round aborted") {
                        debug!(plan_id = %plan_id, step_id = %id, error = %e, "Step not marked aborted");
                    }
                }
            }
            if let Err(e) = plan.fail(PlanFailure::Aborted {
                step_id,
                message: error.to_string(),
            }) {
                warn!(plan_id = %plan_id, error = %e, "Could not mark plan aborted");
            }
            executing
        };
        for id in abandoned {
            self.publish_step(plan_id, id, StepStatus::Failed);
        }
        warn!(plan_id = %plan_id, error = %error, "Dispatch round aborted");
    }

    /// Polls until the plan is terminal or `timeout` elapses
    ///
    /// A timeout leaves the plan running.
    pub async fn wait_for_completion(&self, plan_id: Uuid, timeout: Duration) -> AgentResult<PlanSummary> {
        let started = Instant::now();
        loop {
            match self.get_plan(plan_id).await? {
                Some(plan) if plan.status().is_terminal() => return Ok(plan.summary()),
                Some(_) => {}
                None => return Err(AgentError::PlanNotFound(plan_id)),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(AgentError::PlanTimeout {
                    plan_id,
                    waited_ms: elapsed.as_millis() as u64,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(timeout - elapsed)).await;
        }
    }

    /// Sends advisory `cancel_task` messages for executing steps, fails and evicts the plan
    pub async fn cancel_plan(&self, plan_id: Uuid) -> AgentResult<PlanSummary> {
        let live = self
            .plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&plan_id)
            .ok_or(AgentError::PlanNotFound(plan_id))?;
        live.cancel.cancel();

        let (targets, snapshot) = {
            let mut plan = live.lock();
            let mut targets = Vec::new();
            for step in plan.steps_mut() {
                if step.status == StepStatus::Executing {
                    if let Some(agent_id) = step.agent_id.clone() {
                        targets.push((step.id, agent_id));
                    }
                    if let Err(e) = step.fail("cancelled") {
                        debug!(plan_id = %plan_id, step_id = %step.id, error = %e, "Step not marked cancelled");
                    }
                }
            }
            if !plan.status().is_terminal() {
                plan.fail(PlanFailure::Cancelled)
                    .map_err(AgentError::TaskExecutionFailed)?;
            }
            (targets, plan.clone())
        };

        self.checkpoint(&snapshot).await;
        self.events.publish(AgentEvent::PlanFinished {
            plan_id,
            status: snapshot.status(),
        });

        for (step_id, agent_id) in targets {
            if let Err(e) = self.dispatcher.dispatch(&agent_id, AgentMessage::cancel(step_id)).await {
                warn!(plan_id = %plan_id, step_id = %step_id, agent_id = %agent_id, error = %e, "Cancel not delivered");
            }
        }

        info!(plan_id = %plan_id, "Plan cancelled");
        Ok(snapshot.summary())
    }

    /// Cancels every live plan
    pub async fn cancel_all(&self) {
        for plan_id in self.active_plans() {
            if let Err(e) = self.cancel_plan(plan_id).await {
                debug!(plan_id = %plan_id, error = %e, "Plan finished before cancel");
            }
        }
    }

    /// Live snapshot, falling back to the last checkpoint
    pub async fn get_plan(&self, plan_id: Uuid) -> AgentResult<Option<TaskPlan>> {
        if let Ok(live) = self.live(plan_id) {
            return Ok(Some(live.lock().clone()));
        }
        self.repository.find_plan(plan_id).await.map_err(AgentError::Store)
    }

    pub fn active_plans(&self) -> Vec<Uuid> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn plan_status(&self, plan_id: Uuid) -> Option<PlanStatus> {
        self.live(plan_id).ok().map(|live| live.lock().status())
    }

    fn live(&self, plan_id: Uuid) -> AgentResult<Arc<LivePlan>> {
        self.plans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&plan_id)
            .cloned()
            .ok_or(AgentError::PlanNotFound(plan_id))
    }

    /// Persists the terminal state, then evicts the plan
    async fn finalize(&self, plan: &TaskPlan) {
        self.checkpoint(plan).await;
        self.plans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&plan.id());
        self.events.publish(AgentEvent::PlanFinished {
            plan_id: plan.id(),
            status: plan.status(),
        });
        info!(plan_id = %plan.id(), status = %plan.status(), "Plan finished");
    }

    async fn checkpoint(&self, plan: &TaskPlan) {
        if let Err(e) = self.repository.save_plan(plan).await {
            warn!(plan_id = %plan.id(), error = %e, "Plan checkpoint failed");
        }
    }

    async fn checkpoint_step(&self, live: &LivePlan) {
        if self.config.checkpoint_steps {
            let snapshot = live.lock().clone();
            self.checkpoint(&snapshot).await;
        }
    }

    fn publish_step(&self, plan_id: Uuid, step_id: Uuid, status: StepStatus) {
        self.events.publish(AgentEvent::StepStatusChanged {
            plan_id,
            step_id,
            status,
        });
    }
}

/// True when `step_id` can never run because it, or a step it waits on, has no agent
fn waits_on_unassigned(plan: &TaskPlan, step_id: Uuid) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![step_id];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(step) = plan.step(id) else {
            continue;
        };
        if step.status == StepStatus::Pending {
            return true;
        }
        if step.status != StepStatus::Completed {
            stack.extend(step.dependencies.iter().copied());
        }
    }
    false
}
