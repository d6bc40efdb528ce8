//! Errors from calls to external collaborators.

use thiserror::Error;

pub type AgentResult<T> = Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("connection to {address} failed: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("{operation} returned HTTP {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Request(String),

    /// The identity service rejected the token.
    #[error("invalid or expired token")]
    InvalidToken,

    /// The identity service could not be asked.
    #[error("identity service unavailable: {0}")]
    IdentityUnavailable(String),

    /// Scripted failure from an in-process stub.
    #[error("{0}")]
    Stub(String),
}
