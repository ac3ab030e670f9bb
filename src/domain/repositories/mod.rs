// Repository contracts (ports) consumed by the coordination core
// Implementations live in the infrastructure layer

pub mod agent_repository;
pub mod plan_repository;

pub use agent_repository::{AgentRecord, AgentRepository};
pub use plan_repository::PlanRepository;
