use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a single plan step
///
/// # Status Transitions
/// ```text
/// Pending -> Assigned -> Executing -> Completed
///                            └-----> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Assigned,
    Executing,
    Completed,
    Failed,
}

impl StepStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Example
    /// ```
    /// use ghostpirates_coordinator::domain::plan::StepStatus;
    ///
    /// assert!(StepStatus::Assigned.can_transition_to(StepStatus::Executing));
    /// assert!(!StepStatus::Pending.can_transition_to(StepStatus::Executing));
    /// ```
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned) | (Assigned, Executing) | (Executing, Completed) | (Executing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Assigned => write!(f, "assigned"),
            StepStatus::Executing => write!(f, "executing"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle status of a plan
///
/// # Status Transitions
/// ```text
/// Planning -> Executing -> Completed
///     |           └-----> Failed
///     └-------------------^
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        matches!(
            (self, next),
            (Planning, Executing) | (Planning, Failed) | (Executing, Completed) | (Executing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanStatus::Planning => write!(f, "planning"),
            PlanStatus::Executing => write!(f, "executing"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a plan ended in `failed`
///
/// `StepFailed` means a step's own work broke; the other reasons are
/// infrastructure outcomes of the plan as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PlanFailure {
    StepFailed { steps: Vec<Uuid> },
    Deadlock { blocked_steps: Vec<Uuid> },
    Cancelled,
    Aborted { step_id: Uuid, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_follows_linear_lifecycle() {
        assert!(StepStatus::Pending.can_transition_to(StepStatus::Assigned));
        assert!(StepStatus::Assigned.can_transition_to(StepStatus::Executing));
        assert!(StepStatus::Executing.can_transition_to(StepStatus::Completed));
        assert!(StepStatus::Executing.can_transition_to(StepStatus::Failed));
    }

    #[test]
    fn step_cannot_skip_states() {
        assert!(!StepStatus::Pending.can_transition_to(StepStatus::Executing));
        assert!(!StepStatus::Assigned.can_transition_to(StepStatus::Completed));
        assert!(!StepStatus::Completed.can_transition_to(StepStatus::Failed));
        assert!(!StepStatus::Failed.can_transition_to(StepStatus::Executing));
    }

    #[test]
    fn terminal_states() {
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(!StepStatus::Executing.is_terminal());
        assert!(PlanStatus::Failed.is_terminal());
        assert!(!PlanStatus::Planning.is_terminal());
    }

    #[test]
    fn plan_transitions() {
        assert!(PlanStatus::Planning.can_transition_to(PlanStatus::Executing));
        assert!(PlanStatus::Executing.can_transition_to(PlanStatus::Completed));
        assert!(PlanStatus::Planning.can_transition_to(PlanStatus::Failed));
        assert!(!PlanStatus::Completed.can_transition_to(PlanStatus::Failed));
        assert!(!PlanStatus::Planning.can_transition_to(PlanStatus::Completed));
    }

    #[test]
    fn failure_reason_serializes_with_tag() {
        let json = serde_json::to_value(PlanFailure::Cancelled).unwrap();
        assert_eq!(json["reason"], "cancelled");
    }
}
