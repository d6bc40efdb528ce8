//! gamegrid-api — REST and WebSocket surface of the orchestrator.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/servers` | Provision a server (service accounts) |
//! | GET | `/api/v1/servers` | Caller's servers |
//! | GET | `/api/v1/servers/user/{user_id}` | A user's servers |
//! | GET | `/api/v1/servers/{id}` | Server details |
//! | DELETE | `/api/v1/servers/{id}?force=` | Delete a server |
//! | GET | `/api/v1/servers/{id}/status` | Stored state plus live agent stats |
//! | POST | `/api/v1/servers/{id}/start` | Start |
//! | POST | `/api/v1/servers/{id}/stop` | Stop |
//! | POST | `/api/v1/servers/{id}/restart` | Restart |
//! | POST | `/api/v1/servers/{id}/maintenance` | Maintenance override (admins) |
//! | POST | `/api/v1/servers/{id}/report` | Container state report from an agent |
//! | GET | `/api/v1/nodes` | List nodes |
//! | POST | `/api/v1/nodes` | Register a node |
//! | GET | `/api/v1/nodes/stats` | Fleet summary |
//! | GET | `/api/v1/nodes/{id}` | Node details |
//! | PUT | `/api/v1/nodes/{id}` | Edit a node |
//! | POST | `/api/v1/nodes/{id}/stats` | Heartbeat |
//! | POST | `/api/v1/nodes/{id}/offline` | Mark offline |
//! | POST | `/api/v1/nodes/{id}/maintenance` | Node maintenance |
//! | GET | `/ws` | Event stream |
//! | GET | `/healthz` | Liveness |
//!
//! Server routes need a bearer token; node routes are called by node
//! daemons on the private network and are open.

pub mod auth;
pub mod nodes;
pub mod response;
pub mod servers;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use gamegrid_agent::IdentityProvider;
use gamegrid_lifecycle::LifecycleOrchestrator;
use tower_http::trace::TraceLayer;

pub use auth::{AuthError, AuthUser};
pub use response::{ApiError, ApiResponse};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub identity: Arc<dyn IdentityProvider>,
}

impl ApiState {
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            orchestrator,
            identity,
        }
    }
}

/// Build the complete router (REST + event stream + liveness).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/servers",
            get(servers::list_own_servers).post(servers::provision_server),
        )
        .route("/servers/user/{user_id}", get(servers::list_user_servers))
        .route(
            "/servers/{id}",
            get(servers::get_server).delete(servers::delete_server),
        )
        .route("/servers/{id}/status", get(servers::server_status))
        .route("/servers/{id}/start", post(servers::start_server))
        .route("/servers/{id}/stop", post(servers::stop_server))
        .route("/servers/{id}/restart", post(servers::restart_server))
        .route("/servers/{id}/maintenance", post(servers::server_maintenance))
        .route("/servers/{id}/report", post(servers::report_server_status))
        .route("/nodes", get(nodes::list_nodes).post(nodes::register_node))
        .route("/nodes/stats", get(nodes::fleet_stats))
        .route("/nodes/{id}", get(nodes::get_node).put(nodes::update_node))
        .route("/nodes/{id}/stats", post(nodes::node_heartbeat))
        .route("/nodes/{id}/offline", post(nodes::mark_node_offline))
        .route("/nodes/{id}/maintenance", post(nodes::node_maintenance));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /healthz
async fn healthz() -> axum::Json<ApiResponse<&'static str>> {
    ApiResponse::ok("ok")
}
