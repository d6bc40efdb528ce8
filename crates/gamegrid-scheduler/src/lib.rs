//! gamegrid-scheduler — where game servers run and which ports they get.
//!
//! - [`NodeRegistry`] tracks worker nodes: registration, heartbeats,
//!   administrative transitions and the live active-server count.
//! - [`Scheduler`] picks a node for a new server: the least loaded ONLINE
//!   node with a free slot, or a specific requested node.
//! - [`PortAllocator`] hands out game/beacon port pairs per node.
//!
//! # Architecture
//!
//! ```text
//! NodeRegistry ──┐
//! Scheduler ─────┼── StateStore (nodes, servers, ports)
//! PortAllocator ─┘
//!       │
//!       └── EventNotifier (optional, node status on the admin channel)
//! ```

pub mod error;
pub mod ports;
pub mod registry;
pub mod scheduler;
pub mod scorer;

pub use error::{SchedulerError, SchedulerResult};
pub use ports::{PORT_RANGE_END, PORT_RANGE_START, PortAllocator, PortRange};
pub use registry::{NodeRegistry, NodeStats, NodeUpdate, RegistryStats};
pub use scheduler::Scheduler;
pub use scorer::{NodeScore, load_score, rank_nodes};
