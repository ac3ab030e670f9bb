// Task planning and plan execution
//
// The builder turns a task into steps and picks agents for them; the executor
// owns live plans and dispatches their steps through an `AgentDispatcher`,
// one step per agent at a time.

pub mod builder;
pub mod conflict;
pub mod dispatcher;
pub mod executor;
mod leases;

pub use builder::{capability_score, DecompositionRule, PlanBuilder};
pub use conflict::{
    resolver_for, ConflictResolver, Contender, FirstComeResolver, PerformanceResolver, PriorityResolver,
};
pub use dispatcher::AgentDispatcher;
pub use executor::PlanExecutor;
