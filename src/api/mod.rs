// API layer module (adapters for controllers)
// Follows Hexagonal Architecture - API is an adapter over the orchestrator

pub mod errors;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};

pub use state::AppState;

use handlers::{agents, tasks};

/// Routes without middleware; `main` adds tracing and CORS
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Agent routes
        .route("/api/agents", get(agents::list_agents).post(agents::register_agent))
        .route("/api/agents/registered", get(agents::list_registered))
        .route("/api/agents/:id/start", post(agents::start_agent))
        .route("/api/agents/:id/stop", post(agents::stop_agent))
        .route("/api/agents/:id/restart", post(agents::restart_agent))
        .route("/api/agents/:id/messages", post(agents::send_message))
        .route("/api/broadcast", post(agents::broadcast))
        .route("/api/control", post(agents::control))
        // Task and plan routes
        .route("/api/tasks", post(tasks::coordinate_task))
        .route("/api/plans", post(tasks::submit_plan))
        .route("/api/plans/:id", get(tasks::get_plan).delete(tasks::cancel_plan))
        .with_state(state)
}
