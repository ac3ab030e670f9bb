//! Task decomposition
//!
//! A rule table keyed by task type, not a planner: new task types need new
//! rules, and dependencies are declared by the rule rather than inferred.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::agents::types::{AgentInfo, AgentStatus};
use crate::domain::plan::{Task, TaskStep};

use super::conflict::{Contender, ConflictResolver};

/// Builds the steps for one task type
pub type DecompositionRule = Arc<dyn Fn(&Task) -> Vec<TaskStep> + Send + Sync>;

/// Complexity signals needed before a task without a rule is split
pub const COMPLEX_SIGNAL_THRESHOLD: usize = 2;

#[derive(Clone)]
pub struct PlanBuilder {
    rules: HashMap<String, DecompositionRule>,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        let mut builder = Self::empty();
        builder.register_rule("data_processing", Arc::new(data_processing_rule));
        builder.register_rule("research", Arc::new(research_rule));
        builder.register_rule("system_maintenance", Arc::new(system_maintenance_rule));
        builder
    }
}

impl PlanBuilder {
    /// Builder without any type-specific rules
    pub fn empty() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    pub fn register_rule(&mut self, task_type: impl Into<String>, rule: DecompositionRule) {
        self.rules.insert(task_type.into(), rule);
    }

    pub fn has_rule(&self, task_type: &str) -> bool {
        self.rules.contains_key(task_type)
    }

    /// A task is complex when a rule exists for its type or it shows enough signals
    pub fn is_complex(&self, task: &Task) -> bool {
        self.has_rule(&task.task_type) || task.complexity_signals() >= COMPLEX_SIGNAL_THRESHOLD
    }

    /// Turns a task into ordered steps with their dependencies
    pub fn decompose_task(&self, task: &Task) -> Vec<TaskStep> {
        if let Some(rule) = self.rules.get(&task.task_type) {
            debug!(task_id = %task.id, task_type = %task.task_type, "Decomposing with type rule");
            return rule(task);
        }

        if task.complexity_signals() >= COMPLEX_SIGNAL_THRESHOLD && task.required_capabilities.len() > 1 {
            debug!(task_id = %task.id, "Decomposing by capability");
            return split_by_capability(task);
        }

        vec![single_step(task)]
    }

    /// Highest `|required ∩ capabilities| / |required|` wins, first candidate on ties
    ///
    /// Only active agents are considered and a score of zero never wins. An empty
    /// requirement scores every active agent 1.0.
    pub fn select_best_agent<'a>(
        &self,
        required: &[String],
        candidates: &'a [AgentInfo],
    ) -> Option<&'a AgentInfo> {
        let mut best: Option<(&AgentInfo, f64)> = None;
        for candidate in candidates.iter().filter(|c| c.status == AgentStatus::Active) {
            let score = capability_score(required, candidate);
            if score <= 0.0 {
                continue;
            }
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate, score));
            }
        }
        best.map(|(agent, _)| agent)
    }

    /// Like `select_best_agent`, but equal scores go to `resolver`
    pub fn select_best_agent_with<'a>(
        &self,
        required: &[String],
        candidates: &'a [AgentInfo],
        resolver: &dyn ConflictResolver,
        priority: i32,
    ) -> Option<&'a AgentInfo> {
        let best = self.select_best_agent(required, candidates)?;
        let top = capability_score(required, best);

        let tied: Vec<Contender> = candidates
            .iter()
            .filter(|c| c.status == AgentStatus::Active)
            .filter(|c| (capability_score(required, c) - top).abs() < f64::EPSILON)
            .map(|c| Contender::new(c.clone(), priority))
            .collect();

        let winner = resolver.resolve(&tied)?.agent.id.clone();
        candidates.iter().find(|c| c.id == winner)
    }
}

pub fn capability_score(required: &[String], agent: &AgentInfo) -> f64 {
    if required.is_empty() {
        return 1.0;
    }
    let matched = required.iter().filter(|r| agent.has_capability(r)).count();
    matched as f64 / required.len() as f64
}

fn single_step(task: &Task) -> TaskStep {
    TaskStep::new(
        task.summary(),
        task.required_capabilities.clone(),
        json!(task.params),
    )
}

fn split_by_capability(task: &Task) -> Vec<TaskStep> {
    let mut steps: Vec<TaskStep> = Vec::with_capacity(task.required_capabilities.len());
    for capability in &task.required_capabilities {
        let mut step = TaskStep::new(
            format!("{} ({})", task.summary(), capability),
            [capability.clone()],
            json!(task.params),
        );
        if !task.parallel {
            if let Some(previous) = steps.last() {
                step = step.depends_on(previous.id);
            }
        }
        steps.push(step);
    }
    steps
}

/// fetch -> process -> store
fn data_processing_rule(task: &Task) -> Vec<TaskStep> {
    let source = task.params.get("dataSource").cloned().unwrap_or_default();
    let destination = task.params.get("destination").cloned().unwrap_or_default();

    let fetch = TaskStep::new(
        "Fetch data from source",
        ["data-retrieval"],
        json!({ "source": source }),
    );
    let process = TaskStep::new(
        "Process retrieved data",
        ["data-processing"],
        json!({ "operation": task.params.get("operation").cloned().unwrap_or(json!("transform")) }),
    )
    .depends_on(fetch.id);
    let store = TaskStep::new(
        "Store processed data",
        ["data-storage"],
        json!({ "destination": destination }),
    )
    .depends_on(process.id);

    vec![fetch, process, store]
}

/// gather -> analyze -> report
fn research_rule(task: &Task) -> Vec<TaskStep> {
    let topic = task.param_str("topic").map(String::from).unwrap_or_else(|| task.summary());

    let gather = TaskStep::new(
        format!("Gather information on {}", topic),
        ["information-retrieval"],
        json!({ "topic": topic }),
    );
    let analyze = TaskStep::new("Analyze gathered information", ["analysis"], json!({}))
        .depends_on(gather.id);
    let report = TaskStep::new("Write findings report", ["text-generation"], json!({}))
        .depends_on(analyze.id);

    vec![gather, analyze, report]
}

/// Health check and status snapshot run in parallel, then a summary
fn system_maintenance_rule(task: &Task) -> Vec<TaskStep> {
    let check = TaskStep::new("Run health check", ["health-check"], json!(task.params));
    let status = TaskStep::new("Collect system status", ["system-monitoring"], json!({}));
    let summary = TaskStep::new("Summarize maintenance findings", ["text-generation"], json!({}))
        .depends_on(check.id)
        .depends_on(status.id);

    vec![check, status, summary]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::types::{AgentMetrics, AgentType};
    use crate::planning::conflict::PerformanceResolver;
    use chrono::Utc;

    fn agent(id: &str, capabilities: &[&str]) -> AgentInfo {
        AgentInfo {
            id: id.to_string(),
            name: id.to_string(),
            agent_type: AgentType::Custom,
            status: AgentStatus::Active,
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            last_heartbeat: Utc::now(),
            metrics: AgentMetrics::default(),
        }
    }

    fn caps(list: &[&str]) -> Vec<String> {
        list.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn simple_task_yields_one_step() {
        let builder = PlanBuilder::default();
        let task = Task::new("general", "Answer a question").with_capabilities(["conversation"]);
        let steps = builder.decompose_task(&task);

        assert!(!builder.is_complex(&task));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].required_capabilities, vec!["conversation"]);
        assert!(steps[0].dependencies.is_empty());
    }

    #[test]
    fn data_processing_yields_linear_chain() {
        let builder = PlanBuilder::default();
        let task = Task::new("data_processing", "")
            .with_param("dataSource", json!("X"))
            .with_param("destination", json!("Y"));
        let steps = builder.decompose_task(&task);

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].required_capabilities, vec!["data-retrieval"]);
        assert_eq!(steps[1].required_capabilities, vec!["data-processing"]);
        assert_eq!(steps[2].required_capabilities, vec!["data-storage"]);
        assert!(steps[0].dependencies.is_empty());
        assert_eq!(steps[1].dependencies, vec![steps[0].id]);
        assert_eq!(steps[2].dependencies, vec![steps[1].id]);
        assert_eq!(steps[0].input["source"], json!("X"));
        assert_eq!(steps[2].input["destination"], json!("Y"));
    }

    #[test]
    fn complex_task_without_rule_splits_by_capability() {
        let builder = PlanBuilder::empty();
        let mut task = Task::new("general", "Big job").with_capabilities(["a", "b", "c"]);
        task.multi_step = true;
        let steps = builder.decompose_task(&task);

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[2].dependencies, vec![steps[1].id]);
    }

    #[test]
    fn parallel_split_has_no_dependencies() {
        let builder = PlanBuilder::empty();
        let mut task = Task::new("general", "Fan out").with_capabilities(["a", "b", "c"]);
        task.parallel = true;
        let steps = builder.decompose_task(&task);

        assert_eq!(steps.len(), 3);
        assert!(steps.iter().all(|s| s.dependencies.is_empty()));
    }

    #[test]
    fn select_prefers_higher_score() {
        let builder = PlanBuilder::default();
        let candidates = vec![agent("partial", &["a"]), agent("full", &["a", "b"])];

        let best = builder.select_best_agent(&caps(&["a", "b"]), &candidates).unwrap();
        assert_eq!(best.id, "full");
    }

    #[test]
    fn select_breaks_ties_by_list_order() {
        let builder = PlanBuilder::default();
        let candidates = vec![agent("first", &["a"]), agent("second", &["a"])];

        for _ in 0..10 {
            let best = builder.select_best_agent(&caps(&["a"]), &candidates).unwrap();
            assert_eq!(best.id, "first");
        }
    }

    #[test]
    fn select_ignores_zero_scores_and_inactive_agents() {
        let builder = PlanBuilder::default();
        let mut paused = agent("paused", &["a"]);
        paused.status = AgentStatus::Paused;
        let candidates = vec![paused, agent("other", &["z"])];

        assert!(builder.select_best_agent(&caps(&["a"]), &candidates).is_none());
    }

    #[test]
    fn empty_requirement_matches_first_active_agent() {
        let builder = PlanBuilder::default();
        let candidates = vec![agent("only", &[])];

        assert_eq!(builder.select_best_agent(&[], &candidates).unwrap().id, "only");
    }

    #[test]
    fn tie_can_be_resolved_by_performance() {
        let builder = PlanBuilder::default();
        let mut flaky = agent("flaky", &["a"]);
        flaky.metrics.tasks_failed = 5;
        let mut steady = agent("steady", &["a"]);
        steady.metrics.tasks_completed = 5;
        let candidates = vec![flaky, steady];

        let best = builder
            .select_best_agent_with(&caps(&["a"]), &candidates, &PerformanceResolver, 0)
            .unwrap();
        assert_eq!(best.id, "steady");
    }
}
