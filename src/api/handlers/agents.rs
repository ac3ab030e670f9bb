use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::agents::messages::{AgentMessage, ControlMessage};
use crate::agents::types::{AgentInfo, AgentType};
use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::domain::repositories::AgentRecord;
use crate::orchestrator::BroadcastReport;

/// Response for lifecycle commands
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStateResponse {
    pub agent_id: String,
    pub running: bool,
    pub agent: Option<AgentInfo>,
}

async fn agent_state(state: &AppState, agent_id: String) -> AgentStateResponse {
    let agent = state.orchestrator.get_agent_info(&agent_id).await;
    AgentStateResponse {
        running: agent.is_some(),
        agent,
        agent_id,
    }
}

/// Optional broadcast filter: every given field must match
#[derive(Debug, Default, Deserialize)]
pub struct BroadcastFilter {
    #[serde(rename = "type")]
    pub agent_type: Option<AgentType>,
    pub capability: Option<String>,
}

impl BroadcastFilter {
    fn matches(&self, info: &AgentInfo) -> bool {
        self.agent_type.map_or(true, |t| t == info.agent_type)
            && self.capability.as_deref().map_or(true, |c| info.has_capability(c))
    }
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: AgentMessage,
    #[serde(default)]
    pub filter: Option<BroadcastFilter>,
}

/// List live agents
///
/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentInfo>> {
    Json(state.orchestrator.get_available_agents().await)
}

/// List persisted agent records
///
/// GET /api/agents/registered
pub async fn list_registered(State(state): State<AppState>) -> Result<Json<Vec<AgentRecord>>, ApiError> {
    Ok(Json(state.orchestrator.registered_agents().await?))
}

/// Persist an agent record without starting it
///
/// POST /api/agents
pub async fn register_agent(
    State(state): State<AppState>,
    Json(record): Json<AgentRecord>,
) -> Result<(StatusCode, Json<AgentRecord>), ApiError> {
    if record.id.trim().is_empty() {
        return Err(ApiError::bad_request("Agent id must not be empty"));
    }
    state.orchestrator.register_agent(record.clone()).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/agents/:id/start
pub async fn start_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStateResponse>, ApiError> {
    state.orchestrator.start_agent(&agent_id).await?;
    Ok(Json(agent_state(&state, agent_id).await))
}

/// POST /api/agents/:id/stop
pub async fn stop_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStateResponse>, ApiError> {
    state.orchestrator.stop_agent(&agent_id).await?;
    Ok(Json(agent_state(&state, agent_id).await))
}

/// POST /api/agents/:id/restart
pub async fn restart_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentStateResponse>, ApiError> {
    state.orchestrator.restart_agent(&agent_id).await?;
    Ok(Json(agent_state(&state, agent_id).await))
}

/// Send a message to one agent and return its output
///
/// POST /api/agents/:id/messages
pub async fn send_message(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(message): Json<AgentMessage>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let output = state
        .orchestrator
        .send_message_to_agent(&agent_id, message)
        .await?;
    Ok(Json(output))
}

/// Best-effort fan-out; per-agent failures are part of the report
///
/// POST /api/broadcast
pub async fn broadcast(
    State(state): State<AppState>,
    Json(req): Json<BroadcastRequest>,
) -> Json<BroadcastReport> {
    let report = match req.filter {
        Some(filter) => {
            let matches = move |info: &AgentInfo| filter.matches(info);
            state.orchestrator.broadcast_message(req.message, Some(&matches)).await
        }
        None => state.orchestrator.broadcast_message(req.message, None).await,
    };
    Json(report)
}

/// Queue a control command; applied asynchronously in arrival order
///
/// POST /api/control
pub async fn control(
    State(state): State<AppState>,
    Json(command): Json<ControlMessage>,
) -> Result<StatusCode, ApiError> {
    state
        .control
        .send(command)
        .await
        .map_err(|_| ApiError::unavailable("Control channel is closed"))?;
    Ok(StatusCode::ACCEPTED)
}
