//! gamegrid-health — node liveness from heartbeats.
//!
//! Nodes report usage through `NodeRegistry::update_node_stats`. The
//! [`HealthMonitor`] periodically scans ONLINE nodes and marks the ones
//! whose last heartbeat is older than the configured timeout as OFFLINE,
//! which removes them from scheduling. A later heartbeat brings them back.
//!
//! # Architecture
//!
//! ```text
//! HealthMonitor (ticker task, owned by the daemon)
//!   ├── NodeRegistry::list_nodes()
//!   └── NodeRegistry::mark_offline_if_stale(node, cutoff)
//!         └── EventNotifier (node_status_update, admin channel)
//! ```

pub mod config;
pub mod monitor;

pub use config::{ConfigError, HealthConfig};
pub use monitor::{HealthMonitor, HealthReport};
