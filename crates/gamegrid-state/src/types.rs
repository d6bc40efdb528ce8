//! Domain types for the gamegrid state store.
//!
//! Nodes, game servers and port allocations as persisted in redb. All
//! timestamps are Unix epoch milliseconds.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a worker node.
pub type NodeId = String;

/// Unique identifier for a game server.
pub type ServerId = String;

/// Identifier of the user owning a game server.
pub type UserId = String;

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ── Node ───────────────────────────────────────────────────────────

/// Liveness/administrative state of a worker node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Online,
    Offline,
    Maintenance,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A worker node that hosts game-server containers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: NodeId,
    pub hostname: String,
    pub ip_address: String,
    pub max_servers: u32,
    /// Live count of servers in an active state. Recomputed, never
    /// incremented in place.
    pub current_servers: u32,
    /// CPU usage percent, 0–100.
    pub cpu_usage: f64,
    /// Memory usage percent, 0–100.
    pub memory_usage: f64,
    /// Disk usage percent, 0–100.
    pub disk_usage: f64,
    pub status: NodeStatus,
    pub last_heartbeat: u64,
    pub created_at: u64,
}

impl Node {
    /// A freshly registered node: ONLINE, idle, heartbeat stamped at `now`.
    pub fn new(
        node_id: impl Into<NodeId>,
        hostname: impl Into<String>,
        ip_address: impl Into<String>,
        max_servers: u32,
        now: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            hostname: hostname.into(),
            ip_address: ip_address.into(),
            max_servers,
            current_servers: 0,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            disk_usage: 0.0,
            status: NodeStatus::Online,
            last_heartbeat: now,
            created_at: now,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.current_servers < self.max_servers
    }

    /// ONLINE with at least one free slot.
    pub fn is_schedulable(&self) -> bool {
        self.status == NodeStatus::Online && self.has_capacity()
    }
}

// ── Game server ────────────────────────────────────────────────────

/// Lifecycle state of a game server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Provisioning,
    Starting,
    Running,
    Stopping,
    Stopped,
    Restarting,
    Error,
    Maintenance,
}

impl ServerStatus {
    /// States that occupy a slot on the node.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Provisioning | Self::Starting | Self::Running | Self::Restarting
        )
    }

    /// States waiting on an agent acknowledgment.
    pub fn is_transitional(&self) -> bool {
        matches!(self, Self::Starting | Self::Stopping | Self::Restarting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Restarting => "RESTARTING",
            Self::Error => "ERROR",
            Self::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provisioned game-server instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameServer {
    pub server_id: ServerId,
    pub user_id: UserId,
    pub server_name: String,
    pub status: ServerStatus,
    pub node_id: NodeId,
    /// 0 until ports are allocated.
    pub game_port: u16,
    /// Always `game_port + 1` once allocated.
    pub beacon_port: u16,
    /// RAM in GiB.
    pub ram_allocation: u32,
    /// CPU cores.
    pub cpu_allocation: u32,
    pub max_players: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Container handle returned by the host agent on spawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Last failure reason, set when entering ERROR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    pub created_at: u64,
    #[serde(default)]
    pub started_at: Option<u64>,
    #[serde(default)]
    pub last_seen: Option<u64>,
}

impl GameServer {
    pub fn has_ports(&self) -> bool {
        self.game_port != 0
    }
}

// ── Ports ──────────────────────────────────────────────────────────

/// Which half of a server's port pair an allocation row covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortType {
    Game,
    Beacon,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationStatus {
    Allocated,
    Released,
}

/// One reserved port on one node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortAllocation {
    pub port: u16,
    pub port_type: PortType,
    pub node_id: NodeId,
    pub server_id: ServerId,
    pub status: AllocationStatus,
    pub allocated_at: u64,
    #[serde(default)]
    pub released_at: Option<u64>,
}

impl PortAllocation {
    /// Composite key: `{node_id}:{port:05}` (zero-padded so keys sort by port).
    pub fn table_key(&self) -> String {
        port_key(&self.node_id, self.port)
    }
}

pub fn port_key(node_id: &str, port: u16) -> String {
    format!("{node_id}:{port:05}")
}

/// A game/beacon port pair. `beacon_port == game_port + 1`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortPair {
    pub game_port: u16,
    pub beacon_port: u16,
}

impl PortPair {
    pub fn starting_at(game_port: u16) -> Self {
        Self {
            game_port,
            beacon_port: game_port + 1,
        }
    }
}
