//! PortAllocator — game/beacon port pairs per node.
//!
//! Pairs are `(base, base + 1)` with `base` stepping by 2 from the start of
//! the range, so every allocation is aligned and pairs never straddle.
//! Allocation runs inside a single store write transaction, which
//! serializes concurrent allocations on the same node.

use std::collections::BTreeSet;

use gamegrid_state::{PortPair, StateStore};
use tracing::{info, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// First port handed out (inclusive).
pub const PORT_RANGE_START: u16 = 30000;
/// End of the port range (exclusive).
pub const PORT_RANGE_END: u16 = 35000;

/// Half-open port range `[start, end)`. `start` should be even-aligned
/// relative to the pairs it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: PORT_RANGE_START,
            end: PORT_RANGE_END,
        }
    }
}

impl PortRange {
    /// Lowest pair in the range with neither port in `taken`.
    pub fn first_free_pair(&self, taken: &BTreeSet<u16>) -> Option<PortPair> {
        (self.start..self.end.saturating_sub(1))
            .step_by(2)
            .find(|base| !taken.contains(base) && !taken.contains(&(base + 1)))
            .map(PortPair::starting_at)
    }

    pub fn pair_count(&self) -> usize {
        (self.end.saturating_sub(self.start) / 2) as usize
    }
}

#[derive(Clone)]
pub struct PortAllocator {
    store: StateStore,
    range: PortRange,
}

impl PortAllocator {
    pub fn new(store: StateStore) -> Self {
        Self::with_range(store, PortRange::default())
    }

    pub fn with_range(store: StateStore, range: PortRange) -> Self {
        Self { store, range }
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    /// Reserve the lowest free pair on `node_id` for `server_id`.
    pub fn allocate_ports(&self, node_id: &str, server_id: &str) -> SchedulerResult<PortPair> {
        let range = self.range;
        match self
            .store
            .allocate_port_pair(node_id, server_id, |taken| range.first_free_pair(taken))?
        {
            Some(pair) => {
                info!(
                    %node_id,
                    %server_id,
                    game_port = pair.game_port,
                    beacon_port = pair.beacon_port,
                    "ports allocated"
                );
                Ok(pair)
            }
            None => {
                warn!(%node_id, %server_id, "port range exhausted");
                Err(SchedulerError::PortRangeExhausted(node_id.to_string()))
            }
        }
    }

    /// Release every port held by `server_id`. Returns how many were freed.
    pub fn release_ports(&self, server_id: &str) -> SchedulerResult<u32> {
        let released = self.store.release_ports_for_server(server_id)?;
        if !released.is_empty() {
            info!(%server_id, count = released.len(), "ports released");
        }
        Ok(released.len() as u32)
    }

    /// True if no live allocation holds `port` on `node_id`.
    pub fn is_port_available(&self, port: u16, node_id: &str) -> SchedulerResult<bool> {
        Ok(!self.store.is_port_allocated(node_id, port)?)
    }
}
