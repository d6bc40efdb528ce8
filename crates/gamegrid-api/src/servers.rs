//! Game server handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gamegrid_agent::AgentState;
use gamegrid_lifecycle::{ProvisionRequest, ProvisionResponse, ServerStatusView};
use gamegrid_state::GameServer;
use serde::Deserialize;

use crate::ApiState;
use crate::auth::AuthUser;
use crate::response::{ApiError, ApiResponse, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct MaintenanceRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatusReport {
    pub state: AgentState,
}

/// Load a server and check the caller may act on it.
fn owned_server(state: &ApiState, user: &AuthUser, id: &str) -> Result<GameServer, ApiError> {
    let server = state.orchestrator.get_server(id)?;
    user.require_access(&server.user_id)?;
    Ok(server)
}

/// POST /api/v1/servers
pub async fn provision_server(
    State(state): State<ApiState>,
    user: AuthUser,
    Json(req): Json<ProvisionRequest>,
) -> Result<Response, ApiError> {
    user.require_service_account()?;
    let resp: ProvisionResponse = state.orchestrator.provision(req).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(resp)).into_response())
}

/// GET /api/v1/servers
pub async fn list_own_servers(
    State(state): State<ApiState>,
    user: AuthUser,
) -> ApiResult<Vec<GameServer>> {
    Ok(ApiResponse::ok(
        state.orchestrator.list_servers_for_user(user.user_id())?,
    ))
}

/// GET /api/v1/servers/user/{user_id}
pub async fn list_user_servers(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(user_id): Path<String>,
) -> ApiResult<Vec<GameServer>> {
    user.require_access(&user_id)?;
    Ok(ApiResponse::ok(
        state.orchestrator.list_servers_for_user(&user_id)?,
    ))
}

/// GET /api/v1/servers/{id}
pub async fn get_server(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<GameServer> {
    Ok(ApiResponse::ok(owned_server(&state, &user, &id)?))
}

/// GET /api/v1/servers/{id}/status
pub async fn server_status(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<ServerStatusView> {
    owned_server(&state, &user, &id)?;
    Ok(ApiResponse::ok(state.orchestrator.server_status(&id).await?))
}

/// POST /api/v1/servers/{id}/start
pub async fn start_server(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<GameServer> {
    owned_server(&state, &user, &id)?;
    Ok(ApiResponse::ok(state.orchestrator.start(&id).await?))
}

/// POST /api/v1/servers/{id}/stop
pub async fn stop_server(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<GameServer> {
    owned_server(&state, &user, &id)?;
    Ok(ApiResponse::ok(state.orchestrator.stop(&id).await?))
}

/// POST /api/v1/servers/{id}/restart
pub async fn restart_server(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<GameServer> {
    owned_server(&state, &user, &id)?;
    Ok(ApiResponse::ok(state.orchestrator.restart(&id).await?))
}

/// DELETE /api/v1/servers/{id}?force=
pub async fn delete_server(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<&'static str> {
    owned_server(&state, &user, &id)?;
    state.orchestrator.delete(&id, params.force).await?;
    Ok(ApiResponse::ok("deleted"))
}

/// POST /api/v1/servers/{id}/maintenance
pub async fn server_maintenance(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<MaintenanceRequest>,
) -> ApiResult<GameServer> {
    user.require_admin()?;
    Ok(ApiResponse::ok(
        state.orchestrator.set_maintenance(&id, req.enabled)?,
    ))
}

/// POST /api/v1/servers/{id}/report
pub async fn report_server_status(
    State(state): State<ApiState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(report): Json<StatusReport>,
) -> ApiResult<GameServer> {
    user.require_privileged()?;
    Ok(ApiResponse::ok(
        state.orchestrator.report_status(&id, report.state)?,
    ))
}
