// Agent system modules
//
// Agents share one runtime (`Agent` + `AgentCore`) and differ only in their
// `AgentBehavior`: system monitoring, assistant, coordinator or custom.

pub mod agent;
pub mod assistant;
pub mod coordinator;
pub mod errors;
pub mod events;
pub mod factory;
pub mod inference;
pub mod messages;
pub mod prompts;
pub mod state;
pub mod system;
pub mod tools;
pub mod types;

// Re-export main types
pub use agent::{Agent, AgentBehavior};
pub use assistant::AssistantAgent;
pub use coordinator::CoordinatorAgent;
pub use errors::{AgentError, AgentResult};
pub use events::{AgentEvent, EventBus};
pub use factory::{AgentConstructor, AgentFactory};
pub use messages::{AgentMessage, ControlAction, ControlMessage};
pub use state::AgentCore;
pub use system::SystemAgent;
pub use types::{AgentInfo, AgentMetrics, AgentStatus, AgentType};
