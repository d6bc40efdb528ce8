//! NodeRegistry — registration, heartbeats and node state transitions.
//!
//! Every mutation goes through `StateStore::update_node`, which reads and
//! rewrites the row inside one write transaction, so a heartbeat and the
//! health monitor never interleave within a single node update.

use std::sync::Arc;

use gamegrid_events::EventNotifier;
use gamegrid_state::{Node, NodeStatus, StateStore, now_millis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// Resource usage reported by a node heartbeat, in percent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
}

/// Administrative edit of a node's descriptive fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub hostname: Option<String>,
    pub ip_address: Option<String>,
    pub max_servers: Option<u32>,
}

/// Fleet-wide summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub maintenance: usize,
    pub total_capacity: u32,
    pub servers_running: u32,
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Tracks the fleet of worker nodes.
#[derive(Clone)]
pub struct NodeRegistry {
    store: StateStore,
    notifier: Option<Arc<EventNotifier>>,
}

impl NodeRegistry {
    pub fn new(store: StateStore) -> Self {
        Self {
            store,
            notifier: None,
        }
    }

    /// Publish node status changes through `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn publish(&self, node: &Node) {
        if let Some(notifier) = &self.notifier {
            notifier.node_changed(node);
        }
    }

    /// Register a node, or refresh an existing registration.
    ///
    /// A known node keeps its counters; its IP is updated if it changed and
    /// it is forced ONLINE. A new node starts ONLINE with no servers.
    pub fn register_node(
        &self,
        node_id: &str,
        hostname: &str,
        ip_address: &str,
        max_servers: u32,
    ) -> SchedulerResult<Node> {
        if node_id.trim().is_empty() {
            return Err(SchedulerError::InvalidNode("node id must not be blank".into()));
        }
        if ip_address.trim().is_empty() {
            return Err(SchedulerError::InvalidNode("ip address must not be blank".into()));
        }
        if max_servers == 0 {
            return Err(SchedulerError::InvalidNode(
                "max servers must be at least 1".into(),
            ));
        }

        let now = now_millis();
        let existing = self.store.update_node(node_id, |node| {
            let previous = node.status;
            if node.ip_address != ip_address {
                node.ip_address = ip_address.to_string();
            }
            node.status = NodeStatus::Online;
            node.last_heartbeat = now;
            previous
        })?;

        if let Some((node, previous)) = existing {
            info!(%node_id, ip = %node.ip_address, %previous, "node re-registered");
            if previous != NodeStatus::Online {
                self.publish(&node);
            }
            return Ok(node);
        }

        let node = Node::new(node_id, hostname, ip_address, max_servers, now);
        self.store.put_node(&node)?;
        info!(%node_id, %hostname, ip = %ip_address, max_servers, "node registered");
        self.publish(&node);
        Ok(node)
    }

    /// Apply a heartbeat: usage figures, liveness and the live server count.
    ///
    /// A heartbeat proves liveness: the node is forced ONLINE, whether it
    /// was OFFLINE or in MAINTENANCE.
    pub fn update_node_stats(&self, node_id: &str, stats: NodeStats) -> SchedulerResult<Node> {
        let active = self.store.count_active_servers_for_node(node_id)?;
        let now = now_millis();
        let updated = self.store.update_node(node_id, |node| {
            let previous = node.status;
            node.cpu_usage = clamp_percent(stats.cpu_usage);
            node.memory_usage = clamp_percent(stats.memory_usage);
            node.disk_usage = clamp_percent(stats.disk_usage);
            node.last_heartbeat = now;
            node.current_servers = active;
            node.status = NodeStatus::Online;
            previous
        })?;

        match updated {
            Some((node, previous)) => {
                debug!(%node_id, cpu = node.cpu_usage, mem = node.memory_usage, "heartbeat received");
                if previous != node.status {
                    info!(%node_id, from = %previous, to = %node.status, "node recovered");
                    self.publish(&node);
                }
                Ok(node)
            }
            None => {
                warn!(%node_id, "heartbeat from unknown node");
                Err(SchedulerError::NodeNotFound(node_id.to_string()))
            }
        }
    }

    /// Explicitly take a node out of scheduling.
    pub fn mark_node_offline(&self, node_id: &str) -> SchedulerResult<Node> {
        self.set_status(node_id, NodeStatus::Offline)
    }

    /// Enter or leave maintenance. Leaving returns the node to ONLINE.
    pub fn set_node_maintenance(&self, node_id: &str, enabled: bool) -> SchedulerResult<Node> {
        let target = if enabled {
            NodeStatus::Maintenance
        } else {
            NodeStatus::Online
        };
        self.set_status(node_id, target)
    }

    fn set_status(&self, node_id: &str, status: NodeStatus) -> SchedulerResult<Node> {
        let (node, previous) = self
            .store
            .update_node(node_id, |node| std::mem::replace(&mut node.status, status))?
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))?;
        if previous != status {
            info!(%node_id, from = %previous, to = %status, "node status changed");
            self.publish(&node);
        }
        Ok(node)
    }

    /// Mark the node OFFLINE if it is still ONLINE and its last heartbeat is
    /// older than `cutoff`. The check runs inside the row update, so a
    /// heartbeat that landed after the caller's read wins.
    ///
    /// Returns the node when it was transitioned.
    pub fn mark_offline_if_stale(&self, node_id: &str, cutoff: u64) -> SchedulerResult<Option<Node>> {
        let updated = self.store.update_node(node_id, |node| {
            if node.status == NodeStatus::Online && node.last_heartbeat < cutoff {
                node.status = NodeStatus::Offline;
                true
            } else {
                false
            }
        })?;

        match updated {
            Some((node, true)) => {
                warn!(%node_id, last_heartbeat = node.last_heartbeat, "node missed heartbeats, marked offline");
                self.publish(&node);
                Ok(Some(node))
            }
            Some((_, false)) => Ok(None),
            None => Err(SchedulerError::NodeNotFound(node_id.to_string())),
        }
    }

    /// Edit hostname, IP or capacity of a node.
    pub fn update_node(&self, node_id: &str, update: NodeUpdate) -> SchedulerResult<Node> {
        if update.max_servers == Some(0) {
            return Err(SchedulerError::InvalidNode(
                "max servers must be at least 1".into(),
            ));
        }
        let (node, ()) = self
            .store
            .update_node(node_id, |node| {
                if let Some(hostname) = update.hostname {
                    node.hostname = hostname;
                }
                if let Some(ip) = update.ip_address {
                    node.ip_address = ip;
                }
                if let Some(max) = update.max_servers {
                    node.max_servers = max;
                }
            })?
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))?;
        info!(%node_id, "node updated");
        Ok(node)
    }

    /// Recompute `current_servers` from the servers currently active on the
    /// node.
    pub fn refresh_current_servers(&self, node_id: &str) -> SchedulerResult<Node> {
        let active = self.store.count_active_servers_for_node(node_id)?;
        let (node, ()) = self
            .store
            .update_node(node_id, |node| node.current_servers = active)?
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))?;
        debug!(%node_id, current_servers = active, "server count refreshed");
        Ok(node)
    }

    pub fn get_node(&self, node_id: &str) -> SchedulerResult<Node> {
        self.store
            .get_node(node_id)?
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))
    }

    pub fn list_nodes(&self) -> SchedulerResult<Vec<Node>> {
        Ok(self.store.list_nodes()?)
    }

    pub fn stats(&self) -> SchedulerResult<RegistryStats> {
        let nodes = self.store.list_nodes()?;
        let mut stats = RegistryStats {
            total: nodes.len(),
            ..RegistryStats::default()
        };
        for node in &nodes {
            match node.status {
                NodeStatus::Online => stats.online += 1,
                NodeStatus::Offline => stats.offline += 1,
                NodeStatus::Maintenance => stats.maintenance += 1,
            }
            stats.total_capacity += node.max_servers;
            stats.servers_running += node.current_servers;
        }
        Ok(stats)
    }
}
