//! gamegrid-state — embedded state store for the game-server orchestrator.
//!
//! Backed by [redb](https://docs.rs/redb), holds nodes, game servers and
//! port allocations in persistent or in-memory databases.
//!
//! # Architecture
//!
//! Domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Port allocations use the composite key `{node_id}:{port}`, which makes
//! "one ALLOCATED row per (node, port)" a property of the table itself.
//!
//! redb serializes write transactions. Read-modify-write helpers
//! (`update_node`, `update_server`, `allocate_port_pair`) run entirely
//! inside one write transaction, so they are atomic with respect to each
//! other without extra locking.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
