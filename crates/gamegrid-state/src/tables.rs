//! redb table definitions for the gamegrid state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Worker nodes keyed by `{node_id}`.
pub const NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("nodes");

/// Game servers keyed by `{server_id}`.
pub const SERVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("servers");

/// Port allocations keyed by `{node_id}:{port:05}`.
pub const PORTS: TableDefinition<&str, &[u8]> = TableDefinition::new("ports");
