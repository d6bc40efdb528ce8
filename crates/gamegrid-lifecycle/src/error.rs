//! Lifecycle error taxonomy.

use gamegrid_agent::AgentError;
use gamegrid_scheduler::SchedulerError;
use gamegrid_state::{ServerStatus, StateError};
use thiserror::Error;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Bad request input; nothing was changed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// No node or port pair available.
    #[error("capacity exhausted: {0}")]
    Capacity(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A host agent, tunnel or identity call failed or timed out.
    #[error("external call failed: {0}")]
    ExternalCall(String),

    /// The operation is not allowed from the server's current state.
    #[error("cannot {operation} server {server_id} while {status}")]
    InvalidState {
        server_id: String,
        status: ServerStatus,
        operation: &'static str,
    },

    #[error("state store error: {0}")]
    Store(#[from] StateError),
}

impl LifecycleError {
    pub fn server_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "server",
            id: id.to_string(),
        }
    }
}

impl From<SchedulerError> for LifecycleError {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::NodeNotFound(id) => Self::NotFound { kind: "node", id },
            SchedulerError::InvalidNode(msg) => Self::Validation(msg),
            SchedulerError::NoCapacity(msg) => Self::Capacity(msg),
            e @ SchedulerError::PortRangeExhausted(_) => Self::Capacity(e.to_string()),
            SchedulerError::State(StateError::Conflict(msg)) => Self::Conflict(msg),
            SchedulerError::State(e) => Self::Store(e),
        }
    }
}

impl From<AgentError> for LifecycleError {
    fn from(e: AgentError) -> Self {
        Self::ExternalCall(e.to_string())
    }
}
