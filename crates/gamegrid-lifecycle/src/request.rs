//! Provisioning request/response payloads.

use gamegrid_agent::ContainerStatus;
use gamegrid_state::{GameServer, ServerStatus};
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, LifecycleResult};

pub const PROVISION_MESSAGE: &str = "Server provisioning initiated successfully";

pub const RAM_RANGE_GB: (u32, u32) = (2, 64);
pub const CPU_RANGE: (u32, u32) = (1, 16);
pub const PLAYER_RANGE: (u32, u32) = (1, 100);
pub const MAX_NAME_LEN: usize = 64;

/// A request to create and launch a game server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub user_id: String,
    pub server_name: String,
    /// GiB.
    pub ram_allocation: u32,
    pub cpu_allocation: u32,
    pub max_players: u32,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub preferred_node_id: Option<String>,
}

impl ProvisionRequest {
    /// Check every bound and report all violations at once.
    pub fn validate(&self) -> LifecycleResult<()> {
        let mut problems = Vec::new();

        if self.user_id.trim().is_empty() {
            problems.push("userId must not be blank".to_string());
        }
        let name = self.server_name.trim();
        if name.is_empty() {
            problems.push("serverName must not be blank".to_string());
        } else if name.chars().count() > MAX_NAME_LEN {
            problems.push(format!("serverName must be at most {MAX_NAME_LEN} characters"));
        }
        check_range(&mut problems, "ramAllocation", self.ram_allocation, RAM_RANGE_GB);
        check_range(&mut problems, "cpuAllocation", self.cpu_allocation, CPU_RANGE);
        check_range(&mut problems, "maxPlayers", self.max_players, PLAYER_RANGE);

        if problems.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Validation(problems.join("; ")))
        }
    }
}

fn check_range(problems: &mut Vec<String>, field: &str, value: u32, (min, max): (u32, u32)) {
    if !(min..=max).contains(&value) {
        problems.push(format!("{field} must be between {min} and {max}, got {value}"));
    }
}

/// What the caller learns about a freshly provisioned server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub server_id: String,
    pub server_name: String,
    pub status: ServerStatus,
    pub node_id: String,
    /// Public address players connect to.
    pub join_address: String,
    pub game_port: u16,
    pub beacon_port: u16,
    pub created_at: u64,
    pub message: String,
}

impl ProvisionResponse {
    pub fn new(server: &GameServer, join_address: &str) -> Self {
        Self {
            server_id: server.server_id.clone(),
            server_name: server.server_name.clone(),
            status: server.status,
            node_id: server.node_id.clone(),
            join_address: join_address.to_string(),
            game_port: server.game_port,
            beacon_port: server.beacon_port,
            created_at: server.created_at,
            message: PROVISION_MESSAGE.to_string(),
        }
    }
}

/// Stored server plus what the agent currently reports about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusView {
    pub server: GameServer,
    pub agent: Option<ContainerStatus>,
    /// Why `agent` is missing, when the agent could not be asked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProvisionRequest {
        ProvisionRequest {
            user_id: "u1".to_string(),
            server_name: "arena".to_string(),
            ram_allocation: 4,
            cpu_allocation: 2,
            max_players: 10,
            password: None,
            preferred_node_id: None,
        }
    }

    #[test]
    fn accepts_bounds() {
        let mut req = valid();
        req.ram_allocation = 2;
        req.cpu_allocation = 16;
        req.max_players = 100;
        assert!(req.validate().is_ok());
        req.ram_allocation = 64;
        req.max_players = 1;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn reports_every_violation() {
        let mut req = valid();
        req.ram_allocation = 1;
        req.cpu_allocation = 17;
        req.max_players = 0;
        req.server_name = "  ".to_string();

        match req.validate() {
            Err(LifecycleError::Validation(msg)) => {
                assert!(msg.contains("ramAllocation"));
                assert!(msg.contains("cpuAllocation"));
                assert!(msg.contains("maxPlayers"));
                assert!(msg.contains("serverName"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn deserializes_camel_case() {
        let req: ProvisionRequest = serde_json::from_str(
            r#"{"userId":"u1","serverName":"arena","ramAllocation":8,"cpuAllocation":4,"maxPlayers":20}"#,
        )
        .unwrap();
        assert_eq!(req.ram_allocation, 8);
        assert!(req.password.is_none());
        assert!(req.preferred_node_id.is_none());
    }
}
