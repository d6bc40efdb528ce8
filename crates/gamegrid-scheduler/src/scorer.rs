//! Node scoring for placement decisions.
//!
//! A node's load is a weighted mix of its reported resource usage; lower
//! is better. Only ONLINE nodes with a free slot are ranked.

use gamegrid_state::Node;

pub const CPU_WEIGHT: f64 = 0.4;
pub const MEMORY_WEIGHT: f64 = 0.4;
pub const DISK_WEIGHT: f64 = 0.2;

/// Scored candidate node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeScore {
    pub node_id: String,
    /// Weighted load, 0.0..=100.0. Lower is better.
    pub load: f64,
    pub free_slots: u32,
}

/// `0.4·cpu + 0.4·mem + 0.2·disk`.
pub fn load_score(node: &Node) -> f64 {
    CPU_WEIGHT * node.cpu_usage + MEMORY_WEIGHT * node.memory_usage + DISK_WEIGHT * node.disk_usage
}

/// Rank schedulable nodes, least loaded first. Equal loads are ordered by
/// node ID so the choice is deterministic.
pub fn rank_nodes(nodes: &[Node]) -> Vec<NodeScore> {
    let mut scores: Vec<NodeScore> = nodes
        .iter()
        .filter(|n| n.is_schedulable())
        .map(|n| NodeScore {
            node_id: n.node_id.clone(),
            load: load_score(n),
            free_slots: n.max_servers - n.current_servers,
        })
        .collect();

    scores.sort_by(|a, b| {
        a.load
            .total_cmp(&b.load)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    scores
}
