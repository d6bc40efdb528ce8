//! HTTP client for the per-node container agent.
//!
//! The agent listens on the node's IP at a fleet-wide port:
//!
//! | call | request |
//! |---|---|
//! | spawn | `POST /api/containers/spawn` with a [`SpawnRequest`] |
//! | start/stop/restart | `POST /api/containers/{op}` with `{"serverId"}` |
//! | delete | `DELETE /api/containers/{server_id}` |
//! | status | `GET /api/containers/{server_id}/status` |

use std::time::Duration;

use async_trait::async_trait;
use gamegrid_state::Node;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::{ContainerStatus, HostAgent, SpawnOutcome, SpawnRequest};
use crate::error::AgentResult;
use crate::http_client::JsonClient;

pub const DEFAULT_AGENT_PORT: u16 = 8081;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerRef<'a> {
    server_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnReply {
    #[serde(default = "default_true")]
    success: bool,
    #[serde(default)]
    container_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone)]
pub struct HttpHostAgent {
    client: JsonClient,
    port: u16,
}

impl HttpHostAgent {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self {
            client: JsonClient::new(timeout),
            port,
        }
    }

    fn address(&self, node: &Node) -> String {
        format!("{}:{}", node.ip_address, self.port)
    }

    async fn control(&self, node: &Node, op: &str, server_id: &str) -> AgentResult<()> {
        let path = format!("/api/containers/{op}");
        self.client
            .post_json(&self.address(node), &path, &ServerRef { server_id })
            .await?
            .error_for_status(&path)?;
        debug!(node_id = %node.node_id, %server_id, %op, "agent acknowledged");
        Ok(())
    }
}

#[async_trait]
impl HostAgent for HttpHostAgent {
    async fn spawn(&self, node: &Node, request: &SpawnRequest) -> AgentResult<SpawnOutcome> {
        let response = self
            .client
            .post_json(&self.address(node), "/api/containers/spawn", request)
            .await?;

        if !response.is_success() {
            let reason = format!("HTTP {}: {}", response.status.as_u16(), response.text());
            warn!(node_id = %node.node_id, server_id = %request.server_id, %reason, "spawn rejected");
            return Ok(SpawnOutcome::Rejected { reason });
        }

        // Agents may answer with an empty body.
        let reply = if response.body.is_empty() {
            SpawnReply {
                success: true,
                container_id: None,
                message: None,
            }
        } else {
            response.json::<SpawnReply>()?
        };

        if reply.success {
            Ok(SpawnOutcome::Accepted {
                container_id: reply.container_id,
            })
        } else {
            Ok(SpawnOutcome::Rejected {
                reason: reply.message.unwrap_or_else(|| "spawn refused".to_string()),
            })
        }
    }

    async fn start(&self, node: &Node, server_id: &str) -> AgentResult<()> {
        self.control(node, "start", server_id).await
    }

    async fn stop(&self, node: &Node, server_id: &str) -> AgentResult<()> {
        self.control(node, "stop", server_id).await
    }

    async fn restart(&self, node: &Node, server_id: &str) -> AgentResult<()> {
        self.control(node, "restart", server_id).await
    }

    async fn delete(&self, node: &Node, server_id: &str) -> AgentResult<()> {
        let path = format!("/api/containers/{server_id}");
        self.client
            .delete(&self.address(node), &path)
            .await?
            .error_for_status(&path)?;
        Ok(())
    }

    async fn status(&self, node: &Node, server_id: &str) -> AgentResult<ContainerStatus> {
        let path = format!("/api/containers/{server_id}/status");
        self.client
            .get(&self.address(node), &path, None)
            .await?
            .error_for_status(&path)?
            .json()
    }
}

#[cfg(test)]
mod tests {
    use axum::Json;
    use axum::Router;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{delete, get, post};
    use serde_json::{Value, json};

    use super::*;
    use crate::contract::AgentState;
    use crate::error::AgentError;

    /// Serve a fake agent on an ephemeral port and return a node pointing at it.
    async fn fake_agent(router: Router) -> (Node, u16) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (Node::new("node-1", "h", "127.0.0.1", 4, 0), port)
    }

    fn sample_request() -> SpawnRequest {
        SpawnRequest {
            server_id: "srv_u1_deadbeef".to_string(),
            server_name: "arena".to_string(),
            game_port: 30000,
            beacon_port: 30001,
            ram: 4,
            cpu: 2,
            max_players: 10,
            password: None,
            environment: Default::default(),
        }
    }

    #[tokio::test]
    async fn spawn_accepted() {
        let router = Router::new().route(
            "/api/containers/spawn",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["gamePort"], 30000);
                Json(json!({"success": true, "containerId": "c-123"}))
            }),
        );
        let (node, port) = fake_agent(router).await;
        let agent = HttpHostAgent::new(port, Duration::from_secs(2));

        let outcome = agent.spawn(&node, &sample_request()).await.unwrap();
        assert_eq!(
            outcome,
            SpawnOutcome::Accepted {
                container_id: Some("c-123".to_string())
            }
        );
    }

    #[tokio::test]
    async fn spawn_rejected_by_status() {
        let router = Router::new().route(
            "/api/containers/spawn",
            post(|| async { (StatusCode::CONFLICT, "image missing") }),
        );
        let (node, port) = fake_agent(router).await;
        let agent = HttpHostAgent::new(port, Duration::from_secs(2));

        match agent.spawn(&node, &sample_request()).await.unwrap() {
            SpawnOutcome::Rejected { reason } => assert!(reason.contains("image missing")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn control_and_status_calls() {
        let router = Router::new()
            .route(
                "/api/containers/stop",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["serverId"], "srv-1");
                    StatusCode::OK
                }),
            )
            .route(
                "/api/containers/restart",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/api/containers/{id}/status",
                get(|Path(id): Path<String>| async move {
                    assert_eq!(id, "srv-1");
                    Json(json!({"state": "RUNNING", "players": 3}))
                }),
            )
            .route("/api/containers/{id}", delete(|| async { StatusCode::NO_CONTENT }));
        let (node, port) = fake_agent(router).await;
        let agent = HttpHostAgent::new(port, Duration::from_secs(2));

        agent.stop(&node, "srv-1").await.unwrap();
        agent.delete(&node, "srv-1").await.unwrap();

        let err = agent.restart(&node, "srv-1").await.unwrap_err();
        assert!(matches!(err, AgentError::Status { status: 500, .. }));

        let status = agent.status(&node, "srv-1").await.unwrap();
        assert_eq!(status.state, AgentState::Running);
        assert_eq!(status.players, Some(3));
    }
}
