//! Wire messages exchanged with event subscribers.
//!
//! Every message is a JSON object discriminated by its `type` field.

use gamegrid_state::{GameServer, Node, NodeStatus};
use serde::{Deserialize, Serialize};

/// Channel carrying per-user server status updates.
pub const SERVERS_CHANNEL: &str = "servers";

/// Channel carrying node status updates for operators.
pub const ADMIN_CHANNEL: &str = "admin";

/// Status label used when a server row has been removed.
pub const DELETED_STATUS: &str = "DELETED";

/// Server → subscriber messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventMessage {
    /// Sent once when a subscriber connects.
    #[serde(rename_all = "camelCase")]
    Connection {
        message: String,
        session_id: String,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    SubscriptionConfirmed {
        channel: String,
        user_id: Option<String>,
        timestamp: u64,
    },

    Pong { timestamp: u64 },

    #[serde(rename_all = "camelCase")]
    ServerStatusUpdate {
        server_id: String,
        status: ServerStatusPayload,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    NodeStatusUpdate {
        node_id: String,
        status: NodeStatusPayload,
        timestamp: u64,
    },

    #[serde(rename_all = "camelCase")]
    Notification {
        notification_type: String,
        message: String,
        timestamp: u64,
    },
}

impl EventMessage {
    pub fn to_json(&self) -> String {
        // Serializing these plain structs cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Subscriber → server messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe {
        channel: String,
        #[serde(default)]
        user_id: Option<String>,
    },
    Ping,
}

/// Snapshot of a server carried by `server_status_update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusPayload {
    /// A `ServerStatus` label, or `DELETED`.
    pub status: String,
    pub server_name: String,
    pub node_id: String,
    pub game_port: u16,
    pub beacon_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServerStatusPayload {
    pub fn deleted(server: &GameServer) -> Self {
        Self {
            status: DELETED_STATUS.to_string(),
            ..Self::from(server)
        }
    }
}

impl From<&GameServer> for ServerStatusPayload {
    fn from(server: &GameServer) -> Self {
        Self {
            status: server.status.to_string(),
            server_name: server.server_name.clone(),
            node_id: server.node_id.clone(),
            game_port: server.game_port,
            beacon_port: server.beacon_port,
            message: server.status_message.clone(),
        }
    }
}

/// Snapshot of a node carried by `node_status_update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusPayload {
    pub status: NodeStatus,
    pub current_servers: u32,
    pub max_servers: u32,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub last_heartbeat: u64,
}

impl From<&Node> for NodeStatusPayload {
    fn from(node: &Node) -> Self {
        Self {
            status: node.status,
            current_servers: node.current_servers,
            max_servers: node.max_servers,
            cpu_usage: node.cpu_usage,
            memory_usage: node.memory_usage,
            disk_usage: node.disk_usage,
            last_heartbeat: node.last_heartbeat,
        }
    }
}
