//! HTTP client for the tunnel manager.
//!
//! `POST {base}/api/instances` creates a tunnel for a server's port pair;
//! `DELETE {base}/api/instances/{server_id}?token=` removes it. Both calls
//! carry the shared service token.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::contract::{TunnelInstance, TunnelManager};
use crate::error::AgentResult;
use crate::http_client::{Endpoint, JsonClient};

#[derive(Serialize)]
struct CreateInstance<'a> {
    server_id: &'a str,
    game_port: u16,
    beacon_port: u16,
    token: &'a str,
}

#[derive(Debug, Clone)]
pub struct HttpTunnelManager {
    client: JsonClient,
    endpoint: Endpoint,
    token: String,
}

impl HttpTunnelManager {
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> AgentResult<Self> {
        Ok(Self {
            client: JsonClient::new(timeout),
            endpoint: Endpoint::parse(base_url)?,
            token: token.into(),
        })
    }
}

#[async_trait]
impl TunnelManager for HttpTunnelManager {
    async fn create_instance(
        &self,
        server_id: &str,
        game_port: u16,
        beacon_port: u16,
    ) -> AgentResult<TunnelInstance> {
        let path = self.endpoint.path("/api/instances");
        let body = CreateInstance {
            server_id,
            game_port,
            beacon_port,
            token: &self.token,
        };
        let response = self
            .client
            .post_json(&self.endpoint.authority, &path, &body)
            .await?
            .error_for_status(&path)?;

        let instance = if response.body.is_empty() {
            TunnelInstance {
                server_id: server_id.to_string(),
                public_address: None,
                game_port,
                beacon_port,
            }
        } else {
            response.json()?
        };
        info!(%server_id, game_port, "tunnel created");
        Ok(instance)
    }

    async fn delete_instance(&self, server_id: &str) -> AgentResult<()> {
        let path = self
            .endpoint
            .path(&format!("/api/instances/{server_id}?token={}", self.token));
        self.client
            .delete(&self.endpoint.authority, &path)
            .await?
            .error_for_status(&format!("DELETE /api/instances/{server_id}"))?;
        info!(%server_id, "tunnel removed");
        Ok(())
    }
}
