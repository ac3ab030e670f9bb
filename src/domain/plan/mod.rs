// Plan domain module
// Contains the task plan aggregate root, its steps, value objects and the task input

#![allow(clippy::module_inception)]

pub mod plan;
pub mod step;
pub mod task;
pub mod value_objects;

// Re-export main types for convenience
pub use plan::{PlanSummary, StepResult, TaskPlan};
pub use step::TaskStep;
pub use task::Task;
pub use value_objects::{PlanFailure, PlanStatus, StepStatus};
