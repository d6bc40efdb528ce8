//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur during registry, scheduling and port operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("invalid node registration: {0}")]
    InvalidNode(String),

    /// No node (or not the requested node) can take another server.
    #[error("no capacity: {0}")]
    NoCapacity(String),

    #[error("port range exhausted on node {0}")]
    PortRangeExhausted(String),

    #[error("state store error: {0}")]
    State(#[from] gamegrid_state::StateError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
