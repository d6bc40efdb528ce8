//! Node handlers. Called by node daemons and operators.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gamegrid_scheduler::{NodeStats, NodeUpdate, RegistryStats};
use gamegrid_state::Node;
use serde::Deserialize;

use crate::ApiState;
use crate::response::{ApiError, ApiResponse, ApiResult};
use crate::servers::MaintenanceRequest;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterNodeRequest {
    pub node_id: String,
    pub hostname: String,
    pub ip_address: String,
    pub max_servers: u32,
}

/// GET /api/v1/nodes
pub async fn list_nodes(State(state): State<ApiState>) -> ApiResult<Vec<Node>> {
    Ok(ApiResponse::ok(state.orchestrator.registry().list_nodes()?))
}

/// GET /api/v1/nodes/stats
pub async fn fleet_stats(State(state): State<ApiState>) -> ApiResult<RegistryStats> {
    Ok(ApiResponse::ok(state.orchestrator.registry().stats()?))
}

/// POST /api/v1/nodes
pub async fn register_node(
    State(state): State<ApiState>,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<Response, ApiError> {
    let node = state.orchestrator.registry().register_node(
        &req.node_id,
        &req.hostname,
        &req.ip_address,
        req.max_servers,
    )?;
    Ok((StatusCode::CREATED, ApiResponse::ok(node)).into_response())
}

/// GET /api/v1/nodes/{id}
pub async fn get_node(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Node> {
    Ok(ApiResponse::ok(state.orchestrator.registry().get_node(&id)?))
}

/// PUT /api/v1/nodes/{id}
pub async fn update_node(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(update): Json<NodeUpdate>,
) -> ApiResult<Node> {
    Ok(ApiResponse::ok(
        state.orchestrator.registry().update_node(&id, update)?,
    ))
}

/// POST /api/v1/nodes/{id}/stats
pub async fn node_heartbeat(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(stats): Json<NodeStats>,
) -> ApiResult<Node> {
    Ok(ApiResponse::ok(
        state.orchestrator.registry().update_node_stats(&id, stats)?,
    ))
}

/// POST /api/v1/nodes/{id}/offline
pub async fn mark_node_offline(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Node> {
    Ok(ApiResponse::ok(
        state.orchestrator.registry().mark_node_offline(&id)?,
    ))
}

/// POST /api/v1/nodes/{id}/maintenance
pub async fn node_maintenance(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<MaintenanceRequest>,
) -> ApiResult<Node> {
    Ok(ApiResponse::ok(
        state
            .orchestrator
            .registry()
            .set_node_maintenance(&id, req.enabled)?,
    ))
}
