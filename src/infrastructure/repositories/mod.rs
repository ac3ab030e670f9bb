// Repository implementations (data access layer)
// Adapters that implement domain repository interfaces

pub mod in_memory_agent_repository;
pub mod in_memory_plan_repository;
pub mod postgres_agent_repository;
pub mod postgres_plan_repository;

pub use in_memory_agent_repository::InMemoryAgentRepository;
pub use in_memory_plan_repository::InMemoryPlanRepository;
pub use postgres_agent_repository::PostgresAgentRepository;
pub use postgres_plan_repository::PostgresPlanRepository;
