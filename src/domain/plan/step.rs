use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::StepStatus;

/// One unit of plan work, executed by exactly one agent
///
/// # Invariants
/// - Status only moves along `Pending -> Assigned -> Executing -> Completed | Failed`
/// - `output` is set on completion, `error` on failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub id: Uuid,
    pub description: String,
    pub required_capabilities: Vec<String>,
    pub input: serde_json::Value,
    pub agent_id: Option<String>,
    pub status: StepStatus,
    pub dependencies: Vec<Uuid>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskStep {
    pub fn new<I, S>(description: impl Into<String>, required_capabilities: I, input: serde_json::Value) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            required_capabilities: required_capabilities.into_iter().map(Into::into).collect(),
            input,
            agent_id: None,
            status: StepStatus::Pending,
            dependencies: Vec::new(),
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Adds a prerequisite step
    pub fn depends_on(mut self, step_id: Uuid) -> Self {
        if !self.dependencies.contains(&step_id) {
            self.dependencies.push(step_id);
        }
        self
    }

    pub fn assign(&mut self, agent_id: impl Into<String>) -> Result<(), String> {
        self.transition(StepStatus::Assigned)?;
        self.agent_id = Some(agent_id.into());
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), String> {
        self.transition(StepStatus::Executing)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn complete(&mut self, output: serde_json::Value) -> Result<(), String> {
        self.transition(StepStatus::Completed)?;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), String> {
        self.transition(StepStatus::Failed)?;
        let error = error.into();
        self.output = Some(serde_json::json!({ "error": error }));
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    fn transition(&mut self, next: StepStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "Step {} cannot move from {} to {}",
                self.id, self.status, next
            ));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step() -> TaskStep {
        TaskStep::new("Fetch", ["data-retrieval"], json!({}))
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut step = step();
        step.assign("agent-1").unwrap();
        step.start().unwrap();
        step.complete(json!({"rows": 3})).unwrap();

        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(step.output, Some(json!({"rows": 3})));
        assert!(step.started_at.is_some());
        assert!(step.completed_at.is_some());
    }

    #[test]
    fn failure_records_error_in_output() {
        let mut step = step();
        step.assign("agent-1").unwrap();
        step.start().unwrap();
        step.fail("boom").unwrap();

        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("boom"));
        assert_eq!(step.output, Some(json!({"error": "boom"})));
    }

    #[test]
    fn cannot_start_unassigned_step() {
        let mut step = step();
        let result = step.start();

        assert!(result.is_err());
        assert_eq!(step.status, StepStatus::Pending);
    }

    #[test]
    fn duplicate_dependency_is_ignored() {
        let upstream = Uuid::new_v4();
        let step = step().depends_on(upstream).depends_on(upstream);

        assert_eq!(step.dependencies, vec![upstream]);
    }
}
