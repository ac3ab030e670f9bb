//! Integration tests for the Postgres repository layer
//!
//! These tests verify that repository implementations correctly round-trip
//! agent records, memory entries and plan checkpoints through PostgreSQL.
//! They need a database: run with `DATABASE_URL=... cargo test -- --ignored`.

use ghostpirates_coordinator::agents::{AgentStatus, AgentType};
use ghostpirates_coordinator::domain::plan::{PlanStatus, TaskPlan, TaskStep};
use ghostpirates_coordinator::domain::repositories::{AgentRecord, AgentRepository, PlanRepository};
use ghostpirates_coordinator::infrastructure::repositories::{
    PostgresAgentRepository, PostgresPlanRepository,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Set up test database connection pool with the schema applied
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to apply migrations");
    pool
}

/// Unique agent id so tests can share one database
fn agent_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Clean up test data after each test
async fn cleanup_agent(pool: &PgPool, id: &str) {
    // CASCADE DELETE removes the memory rows
    sqlx::query("DELETE FROM agents WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .expect("Failed to cleanup test agent");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_agent_record_round_trip() {
    let pool = setup_test_db().await;
    let repo = PostgresAgentRepository::new(pool.clone());
    let id = agent_id("roundtrip");

    let mut record = AgentRecord::new(&id, "Round Trip", AgentType::Assistant)
        .with_capabilities(["conversation", "analysis"])
        .with_config(json!({ "model": "small" }));
    record.memory.insert("greeting".to_string(), json!("hello"));

    repo.save_agent_record(&record).await.expect("save record");
    let loaded = repo
        .load_agent_record(&id)
        .await
        .expect("load record")
        .expect("record exists");

    assert_eq!(loaded, record);

    cleanup_agent(&pool, &id).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_memory_entries_and_status_updates() {
    let pool = setup_test_db().await;
    let repo = PostgresAgentRepository::new(pool.clone());
    let id = agent_id("memory");

    repo.save_agent_record(&AgentRecord::new(&id, "Memory", AgentType::System))
        .await
        .expect("save record");
    repo.save_memory_entry(&id, "a", &json!(1)).await.expect("save a");
    repo.save_memory_entry(&id, "b", &json!({ "nested": true }))
        .await
        .expect("save b");
    repo.save_memory_entry(&id, "a", &json!(2)).await.expect("overwrite a");
    repo.delete_memory_entry(&id, "b").await.expect("delete b");
    repo.update_agent_status(&id, AgentStatus::Active)
        .await
        .expect("update status");

    let loaded = repo.load_agent_record(&id).await.unwrap().unwrap();
    assert_eq!(loaded.memory.len(), 1);
    assert_eq!(loaded.memory["a"], json!(2));
    assert_eq!(loaded.status, AgentStatus::Active);

    cleanup_agent(&pool, &id).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_status_update_for_missing_agent_fails() {
    let pool = setup_test_db().await;
    let repo = PostgresAgentRepository::new(pool);

    let result = repo
        .update_agent_status(&agent_id("missing"), AgentStatus::Active)
        .await;

    assert!(result.is_err());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_plan_checkpoint_round_trip() {
    let pool = setup_test_db().await;
    let repo = PostgresPlanRepository::new(pool.clone());

    let first = TaskStep::new("Fetch", ["data-retrieval"], json!({ "source": "X" }));
    let second = TaskStep::new("Store", ["data-storage"], json!({})).depends_on(first.id);
    let mut plan = TaskPlan::new(Uuid::new_v4(), "checkpoint", vec![first, second]).unwrap();
    repo.save_plan(&plan).await.expect("save planning plan");

    plan.start().unwrap();
    repo.save_plan(&plan).await.expect("save executing plan");

    let loaded = repo
        .find_plan(plan.id())
        .await
        .expect("find plan")
        .expect("plan exists");
    assert_eq!(loaded.status(), PlanStatus::Executing);
    assert_eq!(loaded.steps().len(), 2);
    assert_eq!(loaded.steps()[1].dependencies, vec![loaded.steps()[0].id]);

    assert!(repo.find_plan(Uuid::new_v4()).await.unwrap().is_none());

    sqlx::query("DELETE FROM task_plans WHERE id = $1")
        .bind(plan.id())
        .execute(&pool)
        .await
        .expect("Failed to cleanup test plan");
}
