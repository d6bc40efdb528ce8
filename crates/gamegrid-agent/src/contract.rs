//! Contracts and payloads shared by every implementation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gamegrid_state::{GameServer, Node};
use serde::{Deserialize, Serialize};

use crate::error::AgentResult;

pub const ROLE_ADMIN: &str = "ADMIN";
pub const ROLE_SERVICE_ACCOUNT: &str = "SERVICE_ACCOUNT";

// ── Host agent ─────────────────────────────────────────────────────

/// Container launch parameters sent to a node's agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpawnRequest {
    pub server_id: String,
    pub server_name: String,
    pub game_port: u16,
    pub beacon_port: u16,
    /// GiB.
    pub ram: u32,
    pub cpu: u32,
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub environment: BTreeMap<String, String>,
}

impl SpawnRequest {
    pub fn for_server(server: &GameServer) -> Self {
        let environment = BTreeMap::from([
            ("SERVERGAMEPORT".to_string(), server.game_port.to_string()),
            ("SERVERMESSAGINGPORT".to_string(), server.beacon_port.to_string()),
            ("MAXPLAYERS".to_string(), server.max_players.to_string()),
            ("PGID".to_string(), "1000".to_string()),
            ("PUID".to_string(), "1000".to_string()),
            ("STEAMBETA".to_string(), "false".to_string()),
        ]);
        Self {
            server_id: server.server_id.clone(),
            server_name: server.server_name.clone(),
            game_port: server.game_port,
            beacon_port: server.beacon_port,
            ram: server.ram_allocation,
            cpu: server.cpu_allocation,
            max_players: server.max_players,
            password: server.password.clone(),
            environment,
        }
    }
}

/// Agent's answer to a spawn request.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnOutcome {
    Accepted { container_id: Option<String> },
    Rejected { reason: String },
}

/// Container state as reported by the agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Starting,
    Running,
    Stopped,
    Failed,
    Unknown,
}

/// Live container statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub state: AgentState,
    #[serde(default)]
    pub cpu_percent: Option<f64>,
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub players: Option<u32>,
    #[serde(default)]
    pub uptime_secs: Option<u64>,
}

impl ContainerStatus {
    pub fn in_state(state: AgentState) -> Self {
        Self {
            state,
            cpu_percent: None,
            memory_mb: None,
            players: None,
            uptime_secs: None,
        }
    }
}

/// The container agent running on every worker node.
#[async_trait]
pub trait HostAgent: Send + Sync {
    async fn spawn(&self, node: &Node, request: &SpawnRequest) -> AgentResult<SpawnOutcome>;
    async fn start(&self, node: &Node, server_id: &str) -> AgentResult<()>;
    async fn stop(&self, node: &Node, server_id: &str) -> AgentResult<()>;
    async fn restart(&self, node: &Node, server_id: &str) -> AgentResult<()>;
    /// Remove the container and its data.
    async fn delete(&self, node: &Node, server_id: &str) -> AgentResult<()>;
    async fn status(&self, node: &Node, server_id: &str) -> AgentResult<ContainerStatus>;
}

// ── Tunnel manager ─────────────────────────────────────────────────

/// A public tunnel in front of a server's ports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunnelInstance {
    pub server_id: String,
    #[serde(default)]
    pub public_address: Option<String>,
    pub game_port: u16,
    pub beacon_port: u16,
}

#[async_trait]
pub trait TunnelManager: Send + Sync {
    async fn create_instance(
        &self,
        server_id: &str,
        game_port: u16,
        beacon_port: u16,
    ) -> AgentResult<TunnelInstance>;
    async fn delete_instance(&self, server_id: &str) -> AgentResult<()>;
}

// ── Identity ───────────────────────────────────────────────────────

/// The caller behind a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Identity {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ROLE_ADMIN)
    }

    pub fn is_service_account(&self) -> bool {
        self.has_role(ROLE_SERVICE_ACCOUNT)
    }

    /// Admins and service accounts act on any server; users on their own.
    pub fn can_access(&self, owner_id: &str) -> bool {
        self.is_admin() || self.is_service_account() || self.user_id == owner_id
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token. Fails with `InvalidToken` when the token is
    /// rejected and `IdentityUnavailable` when the service cannot answer.
    async fn validate_token(&self, token: &str) -> AgentResult<Identity>;
}
