use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ghostpirates_coordinator::agents::{AgentFactory, EventBus};
use ghostpirates_coordinator::api::{self, AppState};
use ghostpirates_coordinator::config::CoordinatorConfig;
use ghostpirates_coordinator::domain::repositories::{AgentRepository, PlanRepository};
use ghostpirates_coordinator::infrastructure::repositories::{
    InMemoryAgentRepository, InMemoryPlanRepository, PostgresAgentRepository, PostgresPlanRepository,
};
use ghostpirates_coordinator::orchestrator::{spawn_control_listener, spawn_health_monitor, Orchestrator};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load environment variables
    dotenv::dotenv().ok();

    let config = CoordinatorConfig::from_env().expect("Invalid configuration");

    // Repositories: Postgres when configured, in-memory otherwise
    let (agents, plans): (Arc<dyn AgentRepository>, Arc<dyn PlanRepository>) = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connected successfully");
            (
                Arc::new(PostgresAgentRepository::new(pool.clone())),
                Arc::new(PostgresPlanRepository::new(pool)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, agent and plan state is kept in memory");
            (
                Arc::new(InMemoryAgentRepository::new()),
                Arc::new(InMemoryPlanRepository::new()),
            )
        }
    };

    let events = EventBus::new(config.event_capacity);
    let factory = AgentFactory::new(Arc::clone(&plans), config.executor.clone());
    let orchestrator = Orchestrator::new(
        agents,
        plans,
        factory,
        events,
        config.orchestrator.clone(),
        config.executor.clone(),
    );

    // Background loops
    let shutdown = CancellationToken::new();
    let (control_tx, control_rx) = mpsc::channel(config.control_capacity);
    let health = spawn_health_monitor(Arc::clone(&orchestrator), shutdown.child_token());
    let control = spawn_control_listener(Arc::clone(&orchestrator), control_rx, shutdown.child_token());

    let started = orchestrator.autostart(&config.autostart).await;
    tracing::info!(count = started.len(), "Autostarted agents");

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = api::router(AppState::new(Arc::clone(&orchestrator), control_tx))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    tracing::info!("Server listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .expect("Server failed");

    shutdown.cancel();
    let _ = tokio::join!(health, control);
    orchestrator.stop_all().await;
    tracing::info!("Coordinator stopped");
}
