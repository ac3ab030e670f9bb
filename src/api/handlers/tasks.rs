use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::domain::plan::{PlanSummary, Task};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedPlan {
    pub plan_id: Uuid,
    pub task_id: Uuid,
}

/// Coordinate a task to completion and return the plan summary
///
/// POST /api/tasks
pub async fn coordinate_task(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<Json<PlanSummary>, ApiError> {
    let summary = state.orchestrator.coordinate_task(&task).await?;
    Ok(Json(summary))
}

/// Submit a task for background execution
///
/// POST /api/plans
pub async fn submit_plan(
    State(state): State<AppState>,
    Json(task): Json<Task>,
) -> Result<(StatusCode, Json<SubmittedPlan>), ApiError> {
    let plan_id = state.orchestrator.executor().submit_task(&task).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmittedPlan {
            plan_id,
            task_id: task.id,
        }),
    ))
}

/// Live or checkpointed plan state
///
/// GET /api/plans/:id
pub async fn get_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<PlanSummary>, ApiError> {
    let plan = state
        .orchestrator
        .executor()
        .get_plan(plan_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Plan not found: {}", plan_id)))?;
    Ok(Json(plan.summary()))
}

/// Cancel a live plan
///
/// DELETE /api/plans/:id
pub async fn cancel_plan(
    State(state): State<AppState>,
    Path(plan_id): Path<Uuid>,
) -> Result<Json<PlanSummary>, ApiError> {
    let summary = state.orchestrator.executor().cancel_plan(plan_id).await?;
    Ok(Json(summary))
}
