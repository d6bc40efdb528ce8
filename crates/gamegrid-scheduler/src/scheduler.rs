//! Node selection for new game servers.

use gamegrid_state::{Node, StateStore};
use tracing::{debug, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::scorer::rank_nodes;

/// Picks the node a new server is placed on.
#[derive(Clone)]
pub struct Scheduler {
    store: StateStore,
}

impl Scheduler {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// The least loaded ONLINE node with a free slot.
    pub fn choose_best_node(&self) -> SchedulerResult<Node> {
        let nodes = self.store.list_nodes()?;
        let ranked = rank_nodes(&nodes);
        let best = ranked.first().ok_or_else(|| {
            SchedulerError::NoCapacity(format!(
                "no online node with spare capacity among {} registered",
                nodes.len()
            ))
        })?;
        debug!(node_id = %best.node_id, load = best.load, candidates = ranked.len(), "node selected");

        nodes
            .into_iter()
            .find(|n| n.node_id == best.node_id)
            .ok_or_else(|| SchedulerError::NodeNotFound(best.node_id.clone()))
    }

    /// The requested node, if it is ONLINE with a free slot.
    pub fn choose_specific_node(&self, node_id: &str) -> SchedulerResult<Node> {
        let node = self
            .store
            .get_node(node_id)?
            .ok_or_else(|| SchedulerError::NodeNotFound(node_id.to_string()))?;
        if !node.is_schedulable() {
            return Err(SchedulerError::NoCapacity(format!(
                "node {node_id} is {} with {}/{} servers",
                node.status, node.current_servers, node.max_servers
            )));
        }
        Ok(node)
    }

    /// Use `preferred` when it qualifies, otherwise fall back to the best
    /// node.
    pub fn select_node(&self, preferred: Option<&str>) -> SchedulerResult<Node> {
        if let Some(node_id) = preferred {
            match self.choose_specific_node(node_id) {
                Ok(node) => return Ok(node),
                Err(SchedulerError::State(e)) => return Err(SchedulerError::State(e)),
                Err(e) => warn!(%node_id, error = %e, "preferred node unavailable, choosing best"),
            }
        }
        self.choose_best_node()
    }
}
