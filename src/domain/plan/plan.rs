use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::TaskStep;
use super::value_objects::{PlanFailure, PlanStatus, StepStatus};

/// Task plan aggregate root
///
/// A directed acyclic graph of steps built from one task.
///
/// # Invariants
/// - Every dependency id refers to a step of the same plan
/// - The dependency graph has no cycles
/// - A step is ready only when it is `Assigned` and all its dependencies are `Completed`
///
/// # Example
/// ```
/// use ghostpirates_coordinator::domain::plan::{TaskPlan, TaskStep};
/// use uuid::Uuid;
///
/// let fetch = TaskStep::new("Fetch", ["data-retrieval"], serde_json::json!({}));
/// let store = TaskStep::new("Store", ["data-storage"], serde_json::json!({})).depends_on(fetch.id);
///
/// let plan = TaskPlan::new(Uuid::new_v4(), "Move data", vec![fetch, store]).expect("valid plan");
/// assert_eq!(plan.steps().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    id: Uuid,
    task_id: Uuid,
    description: String,
    steps: Vec<TaskStep>,
    status: PlanStatus,
    failure: Option<PlanFailure>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskPlan {
    /// Creates a new plan in `Planning` status
    ///
    /// # Returns
    /// * `Err(String)` - if the plan has no steps, a dependency is unknown or the graph has a cycle
    pub fn new(task_id: Uuid, description: impl Into<String>, steps: Vec<TaskStep>) -> Result<Self, String> {
        if steps.is_empty() {
            return Err("Plan must contain at least one step".to_string());
        }

        let ids: HashSet<Uuid> = steps.iter().map(|s| s.id).collect();
        for step in &steps {
            if let Some(missing) = step.dependencies.iter().find(|d| !ids.contains(d)) {
                return Err(format!("Step {} depends on unknown step {}", step.id, missing));
            }
        }

        let plan = Self {
            id: Uuid::new_v4(),
            task_id,
            description: description.into(),
            steps,
            status: PlanStatus::Planning,
            failure: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        if plan.topological_order().is_none() {
            return Err("Plan dependencies contain a cycle".to_string());
        }

        Ok(plan)
    }

    /// Step id -> prerequisite step ids, derived from the steps themselves
    pub fn dependency_graph(&self) -> HashMap<Uuid, Vec<Uuid>> {
        self.steps
            .iter()
            .map(|s| (s.id, s.dependencies.clone()))
            .collect()
    }

    /// Kahn ordering of the steps, `None` when the graph has a cycle
    pub fn topological_order(&self) -> Option<Vec<Uuid>> {
        let mut indegree: HashMap<Uuid, usize> =
            self.steps.iter().map(|s| (s.id, s.dependencies.len())).collect();
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for step in &self.steps {
            for dep in &step.dependencies {
                dependents.entry(*dep).or_default().push(step.id);
            }
        }

        let mut queue: VecDeque<Uuid> = self
            .steps
            .iter()
            .filter(|s| s.dependencies.is_empty())
            .map(|s| s.id)
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for next in dependents.get(&id).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(*next);
                    }
                }
            }
        }

        (order.len() == self.steps.len()).then_some(order)
    }

    /// Steps that may start now
    pub fn ready_steps(&self) -> Vec<Uuid> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Assigned)
            .filter(|s| {
                s.dependencies
                    .iter()
                    .all(|dep| self.step(*dep).map(|d| d.status) == Some(StepStatus::Completed))
            })
            .map(|s| s.id)
            .collect()
    }

    pub fn unfinished_steps(&self) -> Vec<Uuid> {
        self.steps
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.id)
            .collect()
    }

    pub fn failed_steps(&self) -> Vec<Uuid> {
        self.steps_with_status(StepStatus::Failed)
    }

    pub fn steps_with_status(&self, status: StepStatus) -> Vec<Uuid> {
        self.steps
            .iter()
            .filter(|s| s.status == status)
            .map(|s| s.id)
            .collect()
    }

    pub fn all_steps_terminal(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_terminal())
    }

    /// Planning -> Executing
    pub fn start(&mut self) -> Result<(), String> {
        self.transition(PlanStatus::Executing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Moves to `Completed`, or `Failed` when any step failed
    pub fn finish(&mut self) -> Result<PlanStatus, String> {
        let failed = self.failed_steps();
        if failed.is_empty() {
            self.transition(PlanStatus::Completed)?;
        } else {
            self.transition(PlanStatus::Failed)?;
            self.failure = Some(PlanFailure::StepFailed { steps: failed });
        }
        self.completed_at = Some(Utc::now());
        Ok(self.status)
    }

    pub fn fail(&mut self, failure: PlanFailure) -> Result<(), String> {
        self.transition(PlanStatus::Failed)?;
        self.failure = Some(failure);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: PlanStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!("Cannot move plan {} from {} to {}", self.id, self.status, next));
        }
        self.status = next;
        Ok(())
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&PlanFailure> {
        self.failure.as_ref()
    }

    pub fn steps(&self) -> &[TaskStep] {
        &self.steps
    }

    pub fn step(&self, id: Uuid) -> Option<&TaskStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: Uuid) -> Option<&mut TaskStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn steps_mut(&mut self) -> impl Iterator<Item = &mut TaskStep> {
        self.steps.iter_mut()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Caller-facing view: overall status, per-step results and a one-line summary
    pub fn summary(&self) -> PlanSummary {
        let results: Vec<StepResult> = self
            .steps
            .iter()
            .map(|s| StepResult {
                step_id: s.id,
                description: s.description.clone(),
                agent_id: s.agent_id.clone(),
                status: s.status,
                output: s.output.clone(),
                error: s.error.clone(),
            })
            .collect();

        let completed = results.iter().filter(|r| r.status == StepStatus::Completed).count();
        let failed = results.iter().filter(|r| r.status == StepStatus::Failed).count();
        let mut summary = format!(
            "Plan {}: {}/{} steps completed",
            self.status,
            completed,
            results.len()
        );
        if failed > 0 {
            summary.push_str(&format!(", {} failed", failed));
        }
        if let Some(PlanFailure::Deadlock { blocked_steps }) = &self.failure {
            summary.push_str(&format!(", {} blocked by deadlock", blocked_steps.len()));
        }

        PlanSummary {
            plan_id: self.id,
            task_id: self.task_id,
            status: self.status,
            failure: self.failure.clone(),
            results,
            summary,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: Uuid,
    pub description: String,
    pub agent_id: Option<String>,
    pub status: StepStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub plan_id: Uuid,
    pub task_id: Uuid,
    pub status: PlanStatus,
    pub failure: Option<PlanFailure>,
    pub results: Vec<StepResult>,
    pub summary: String,
}
