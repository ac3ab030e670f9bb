use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work submitted by a caller, before decomposition
///
/// Unknown fields (e.g. `dataSource`, `destination`) are kept in `params`
/// and handed to the decomposition rules.
///
/// # Example
/// ```
/// use ghostpirates_coordinator::domain::plan::Task;
///
/// let task: Task = serde_json::from_value(serde_json::json!({
///     "type": "data_processing",
///     "dataSource": "X",
///     "destination": "Y"
/// })).unwrap();
///
/// assert_eq!(task.task_type, "data_processing");
/// assert_eq!(task.param_str("dataSource"), Some("X"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "type", default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub multi_step: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default)]
    pub priority: i32,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

fn default_task_type() -> String {
    "general".to_string()
}

impl Task {
    pub fn new(task_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            description: description.into(),
            required_capabilities: Vec::new(),
            multi_step: false,
            dependencies: Vec::new(),
            parallel: false,
            priority: 0,
            params: serde_json::Map::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Number of complexity signals present: explicit multi-step flag,
    /// more than two required capabilities, explicit dependencies, parallel flag
    pub fn complexity_signals(&self) -> usize {
        [
            self.multi_step,
            self.required_capabilities.len() > 2,
            !self.dependencies.is_empty(),
            self.parallel,
        ]
        .iter()
        .filter(|signal| **signal)
        .count()
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Description to show on steps, falling back to the task type
    pub fn summary(&self) -> String {
        if self.description.is_empty() {
            self.task_type.replace('_', " ")
        } else {
            self.description.clone()
        }
    }
}
