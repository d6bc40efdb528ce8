//! gamegrid-agent — contracts with the systems the orchestrator drives.
//!
//! - [`HostAgent`]: the per-node container agent (spawn, start, stop,
//!   restart, delete, status).
//! - [`TunnelManager`]: exposes a server's ports publicly.
//! - [`IdentityProvider`]: resolves bearer tokens to users and roles.
//!
//! Each contract has an HTTP implementation (plain hyper over a TCP
//! connection, every call bounded by a timeout) and an in-process stub
//! with scripted behavior for tests and local development.

pub mod contract;
pub mod error;
pub mod host;
pub mod http_client;
pub mod identity;
pub mod stub;
pub mod tunnel;

pub use contract::{
    AgentState, ContainerStatus, HostAgent, Identity, IdentityProvider, ROLE_ADMIN,
    ROLE_SERVICE_ACCOUNT, SpawnOutcome, SpawnRequest, TunnelInstance, TunnelManager,
};
pub use error::{AgentError, AgentResult};
pub use host::{DEFAULT_AGENT_PORT, HttpHostAgent};
pub use identity::HttpIdentityProvider;
pub use stub::{Behavior, StubHostAgent, StubIdentityProvider, StubTunnelManager};
pub use tunnel::HttpTunnelManager;
