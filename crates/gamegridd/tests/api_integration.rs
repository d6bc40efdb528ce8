//! End-to-end API tests.
//!
//! Drives the full router (auth, handlers, orchestrator, store) with stub
//! host agents and identities.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use gamegrid_agent::{
    Behavior, ROLE_ADMIN, ROLE_SERVICE_ACCOUNT, StubHostAgent, StubIdentityProvider,
    StubTunnelManager,
};
use gamegrid_api::{ApiState, build_router};
use gamegrid_events::EventNotifier;
use gamegrid_lifecycle::{LifecycleOrchestrator, OrchestratorConfig};
use gamegrid_state::StateStore;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

const SERVICE: &str = "svc-token";
const ADMIN: &str = "admin-token";
const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";

struct TestApp {
    router: Router,
    agent: Arc<StubHostAgent>,
    tunnels: Arc<StubTunnelManager>,
}

fn app_with_store(store: StateStore) -> TestApp {
    let agent = Arc::new(StubHostAgent::new());
    let tunnels = Arc::new(StubTunnelManager::new());
    let orchestrator = LifecycleOrchestrator::new(
        store,
        agent.clone(),
        Arc::new(EventNotifier::new()),
        OrchestratorConfig {
            public_address: "play.example.net".to_string(),
            ..OrchestratorConfig::default()
        },
    )
    .with_tunnels(tunnels.clone());
    let identity = StubIdentityProvider::new()
        .with_token(SERVICE, "matchmaker", &[ROLE_SERVICE_ACCOUNT])
        .with_token(ADMIN, "root", &[ROLE_ADMIN])
        .with_token(ALICE, "alice", &[])
        .with_token(BOB, "bob", &[]);

    TestApp {
        router: build_router(ApiState::new(Arc::new(orchestrator), Arc::new(identity))),
        agent,
        tunnels,
    }
}

fn test_app() -> TestApp {
    app_with_store(StateStore::open_in_memory().unwrap())
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };

    let resp = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register_node(router: &Router, id: &str, max_servers: u32) {
    let (status, _) = call(
        router,
        "POST",
        "/api/v1/nodes",
        None,
        Some(json!({
            "nodeId": id,
            "hostname": format!("{id}.internal"),
            "ipAddress": "10.0.0.9",
            "maxServers": max_servers,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

fn provision_body(user: &str) -> Value {
    json!({
        "userId": user,
        "serverName": "friday night",
        "ramAllocation": 8,
        "cpuAllocation": 4,
        "maxPlayers": 16,
    })
}

async fn provision(router: &Router, user: &str) -> Value {
    let (status, body) = call(
        router,
        "POST",
        "/api/v1/servers",
        Some(SERVICE),
        Some(provision_body(user)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"].clone()
}

#[tokio::test]
async fn healthz_is_open() {
    let app = test_app();
    let (status, body) = call(&app.router, "GET", "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], "ok");
}

#[tokio::test]
async fn provision_and_inspect() {
    let app = test_app();
    register_node(&app.router, "node-1", 4).await;

    let server = provision(&app.router, "alice").await;
    let id = server["serverId"].as_str().unwrap().to_string();
    assert!(id.starts_with("srv_alice_"));
    assert_eq!(server["status"], "STARTING");
    assert_eq!(server["gamePort"], 30000);
    assert_eq!(server["beaconPort"], 30001);
    assert_eq!(server["joinAddress"], "play.example.net");
    assert_eq!(server["message"], "Server provisioning initiated successfully");
    assert!(app.tunnels.has_instance(&id));

    let (status, body) = call(&app.router, "GET", "/api/v1/servers", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/v1/servers/{id}/status"),
        Some(ALICE),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["agent"]["state"], "RUNNING");

    let (_, body) = call(&app.router, "GET", "/api/v1/nodes/node-1", None, None).await;
    assert_eq!(body["data"]["currentServers"], 1);
}

#[tokio::test]
async fn authentication_and_authorization() {
    let app = test_app();
    register_node(&app.router, "node-1", 4).await;
    let id = provision(&app.router, "alice").await["serverId"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/v1/servers/{id}");

    let (status, body) = call(&app.router, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app.router, "GET", &uri, Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app.router, "GET", &uri, Some(BOB), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&app.router, "GET", &uri, Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);

    // Users cannot provision for themselves.
    let (status, _) = call(
        &app.router,
        "POST",
        "/api/v1/servers",
        Some(ALICE),
        Some(provision_body("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn validation_errors_are_reported_together() {
    let app = test_app();
    register_node(&app.router, "node-1", 4).await;

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/servers",
        Some(SERVICE),
        Some(json!({
            "userId": "alice",
            "serverName": "x",
            "ramAllocation": 128,
            "cpuAllocation": 0,
            "maxPlayers": 16,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("ramAllocation"));
    assert!(error.contains("cpuAllocation"));
}

#[tokio::test]
async fn no_nodes_means_service_unavailable() {
    let app = test_app();
    let (status, _) = call(
        &app.router,
        "POST",
        "/api/v1/servers",
        Some(SERVICE),
        Some(provision_body("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn spawn_failure_is_bad_gateway_and_recoverable() {
    let app = test_app();
    register_node(&app.router, "node-1", 4).await;
    app.agent.set_spawn(Behavior::Reject("image pull failed".into()));

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/servers",
        Some(SERVICE),
        Some(provision_body("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("image pull failed"));

    let (_, body) = call(&app.router, "GET", "/api/v1/servers", Some(ALICE), None).await;
    let server = &body["data"][0];
    assert_eq!(server["status"], "ERROR");
    assert_eq!(server["gamePort"], 0);
    let id = server["serverId"].as_str().unwrap().to_string();

    app.agent.set_spawn(Behavior::Accept);
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/servers/{id}/start"),
        Some(ALICE),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "STARTING");
    assert_eq!(body["data"]["gamePort"], 30000);
}

#[tokio::test]
async fn full_lifecycle_over_http() {
    let app = test_app();
    register_node(&app.router, "node-1", 4).await;
    let id = provision(&app.router, "alice").await["serverId"]
        .as_str()
        .unwrap()
        .to_string();
    let base = format!("/api/v1/servers/{id}");

    // Deleting while STARTING needs force.
    let (status, _) = call(&app.router, "DELETE", &base, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("{base}/report"),
        Some(SERVICE),
        Some(json!({"state": "RUNNING"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "RUNNING");

    let (status, body) = call(&app.router, "POST", &format!("{base}/restart"), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "RUNNING");

    let (status, body) = call(&app.router, "POST", &format!("{base}/stop"), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "STOPPED");

    let (status, _) = call(&app.router, "POST", &format!("{base}/stop"), Some(ALICE), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("{base}/maintenance"),
        Some(ADMIN),
        Some(json!({"enabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "MAINTENANCE");

    let (status, _) = call(&app.router, "DELETE", &base, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&app.router, "GET", &base, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The freed pair is handed out again.
    let server = provision(&app.router, "bob").await;
    assert_eq!(server["gamePort"], 30000);
}

#[tokio::test]
async fn node_endpoints() {
    let app = test_app();
    register_node(&app.router, "node-1", 4).await;

    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/nodes/node-1/stats",
        None,
        Some(json!({"cpuUsage": 35.0, "memoryUsage": 60.0, "diskUsage": 12.5})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cpuUsage"], 35.0);

    let (status, _) = call(
        &app.router,
        "POST",
        "/api/v1/nodes/ghost/stats",
        None,
        Some(json!({"cpuUsage": 1.0, "memoryUsage": 1.0, "diskUsage": 1.0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app.router,
        "PUT",
        "/api/v1/nodes/node-1",
        None,
        Some(json!({"maxServers": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["maxServers"], 10);

    let (status, body) = call(&app.router, "POST", "/api/v1/nodes/node-1/offline", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "OFFLINE");

    let (_, body) = call(&app.router, "GET", "/api/v1/nodes/stats", None, None).await;
    assert_eq!(body["data"]["offline"], 1);
    assert_eq!(body["data"]["totalCapacity"], 10);

    // Offline nodes take no new servers.
    let (status, _) = call(
        &app.router,
        "POST",
        "/api/v1/servers",
        Some(SERVICE),
        Some(provision_body("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gamegrid.redb");

    let id = {
        let app = app_with_store(StateStore::open(&path).unwrap());
        register_node(&app.router, "node-1", 4).await;
        provision(&app.router, "alice").await["serverId"]
            .as_str()
            .unwrap()
            .to_string()
    };

    let app = app_with_store(StateStore::open(&path).unwrap());
    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/v1/servers/{id}"),
        Some(ALICE),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["gamePort"], 30000);

    // Ports held before the restart are still taken.
    let server = provision(&app.router, "bob").await;
    assert_eq!(server["gamePort"], 30002);
}
