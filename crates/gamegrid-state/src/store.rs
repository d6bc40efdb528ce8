//! StateStore — redb-backed state persistence for gamegrid.
//!
//! Provides typed CRUD operations over nodes, game servers and port
//! allocations. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(SERVERS).map_err(map_err!(Table))?;
        txn.open_table(PORTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic row access ─────────────────────────────────────────

    fn put_row<T: Serialize>(&self, def: Table, key: &str, row: &T) -> StateResult<()> {
        let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_row<T: DeserializeOwned>(&self, def: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let row = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn scan_rows<T, P>(&self, def: Table, mut keep: P) -> StateResult<Vec<T>>
    where
        T: DeserializeOwned,
        P: FnMut(&T) -> bool,
    {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let row: T = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if keep(&row) {
                results.push(row);
            }
        }
        Ok(results)
    }

    /// Read-modify-write a single row inside one write transaction.
    ///
    /// Returns `None` when the key does not exist (nothing is written).
    fn update_row<T, R, F>(&self, def: Table, key: &str, f: F) -> StateResult<Option<(T, R)>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> R,
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result = {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            let current: Option<T> = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };
            match current {
                Some(mut row) => {
                    let out = f(&mut row);
                    let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
                    table
                        .insert(key, value.as_slice())
                        .map_err(map_err!(Write))?;
                    Some((row, out))
                }
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(result)
    }

    fn delete_row(&self, def: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or replace a node.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        self.put_row(NODES, &node.node_id, node)?;
        debug!(node_id = %node.node_id, "node stored");
        Ok(())
    }

    /// Get a node by ID.
    pub fn get_node(&self, node_id: &str) -> StateResult<Option<Node>> {
        self.get_row(NODES, node_id)
    }

    /// List all nodes, ordered by node ID.
    pub fn list_nodes(&self) -> StateResult<Vec<Node>> {
        self.scan_rows(NODES, |_: &Node| true)
    }

    /// Atomically mutate a node row. `Ok(None)` if the node is unknown.
    pub fn update_node<R>(
        &self,
        node_id: &str,
        f: impl FnOnce(&mut Node) -> R,
    ) -> StateResult<Option<(Node, R)>> {
        self.update_row(NODES, node_id, f)
    }

    // ── Game servers ───────────────────────────────────────────────

    /// Insert or replace a game server.
    pub fn put_server(&self, server: &GameServer) -> StateResult<()> {
        self.put_row(SERVERS, &server.server_id, server)?;
        debug!(server_id = %server.server_id, status = %server.status, "server stored");
        Ok(())
    }

    pub fn get_server(&self, server_id: &str) -> StateResult<Option<GameServer>> {
        self.get_row(SERVERS, server_id)
    }

    pub fn list_servers(&self) -> StateResult<Vec<GameServer>> {
        self.scan_rows(SERVERS, |_: &GameServer| true)
    }

    /// All servers placed on a node, in any state.
    pub fn list_servers_for_node(&self, node_id: &str) -> StateResult<Vec<GameServer>> {
        self.scan_rows(SERVERS, |s: &GameServer| s.node_id == node_id)
    }

    pub fn list_servers_for_user(&self, user_id: &str) -> StateResult<Vec<GameServer>> {
        self.scan_rows(SERVERS, |s: &GameServer| s.user_id == user_id)
    }

    /// Servers on the node whose status counts against capacity.
    pub fn count_active_servers_for_node(&self, node_id: &str) -> StateResult<u32> {
        let active = self.scan_rows(SERVERS, |s: &GameServer| {
            s.node_id == node_id && s.status.is_active()
        })?;
        Ok(active.len() as u32)
    }

    /// Atomically mutate a server row. `Ok(None)` if the server is unknown.
    pub fn update_server<R>(
        &self,
        server_id: &str,
        f: impl FnOnce(&mut GameServer) -> R,
    ) -> StateResult<Option<(GameServer, R)>> {
        self.update_row(SERVERS, server_id, f)
    }

    /// Delete a server row. Returns true if it existed.
    pub fn delete_server(&self, server_id: &str) -> StateResult<bool> {
        let existed = self.delete_row(SERVERS, server_id)?;
        debug!(%server_id, existed, "server deleted");
        Ok(existed)
    }

    // ── Port allocations ───────────────────────────────────────────

    /// Reserve a game/beacon pair on `node_id` for `server_id`.
    ///
    /// The node's currently ALLOCATED ports are read and `pick` chooses a
    /// free pair; both rows are inserted before the transaction commits.
    /// Because redb admits one writer at a time, concurrent callers on the
    /// same node observe each other's allocations. Returns `Ok(None)` when
    /// `pick` finds nothing.
    pub fn allocate_port_pair<F>(
        &self,
        node_id: &str,
        server_id: &str,
        pick: F,
    ) -> StateResult<Option<PortPair>>
    where
        F: FnOnce(&BTreeSet<u16>) -> Option<PortPair>,
    {
        let prefix = format!("{node_id}:");
        let now = now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let chosen = {
            let mut table = txn.open_table(PORTS).map_err(map_err!(Table))?;
            let mut taken = BTreeSet::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if !key.value().starts_with(&prefix) {
                    continue;
                }
                let alloc: PortAllocation =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if alloc.node_id == node_id && alloc.status == AllocationStatus::Allocated {
                    taken.insert(alloc.port);
                }
            }

            match pick(&taken) {
                Some(pair) => {
                    for (port, port_type) in [
                        (pair.game_port, PortType::Game),
                        (pair.beacon_port, PortType::Beacon),
                    ] {
                        if taken.contains(&port) {
                            return Err(StateError::Conflict(format!(
                                "port {port} already allocated on node {node_id}"
                            )));
                        }
                        let alloc = PortAllocation {
                            port,
                            port_type,
                            node_id: node_id.to_string(),
                            server_id: server_id.to_string(),
                            status: AllocationStatus::Allocated,
                            allocated_at: now,
                            released_at: None,
                        };
                        let value = serde_json::to_vec(&alloc).map_err(map_err!(Serialize))?;
                        table
                            .insert(alloc.table_key().as_str(), value.as_slice())
                            .map_err(map_err!(Write))?;
                    }
                    Some(pair)
                }
                None => None,
            }
        };
        txn.commit().map_err(map_err!(Transaction))?;
        if let Some(pair) = chosen {
            debug!(%node_id, %server_id, game_port = pair.game_port, "port pair allocated");
        }
        Ok(chosen)
    }

    /// Release every port held by a server.
    ///
    /// Rows are stamped RELEASED and removed in one transaction; the
    /// stamped records are returned.
    pub fn release_ports_for_server(&self, server_id: &str) -> StateResult<Vec<PortAllocation>> {
        let now = now_millis();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let released = {
            let mut table = txn.open_table(PORTS).map_err(map_err!(Table))?;
            let mut held = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let alloc: PortAllocation =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if alloc.server_id == server_id {
                    held.push((key.value().to_string(), alloc));
                }
            }

            let mut released = Vec::with_capacity(held.len());
            for (key, mut alloc) in held {
                table.remove(key.as_str()).map_err(map_err!(Write))?;
                alloc.status = AllocationStatus::Released;
                alloc.released_at = Some(now);
                released.push(alloc);
            }
            released
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%server_id, count = released.len(), "ports released");
        Ok(released)
    }

    pub fn list_ports_for_node(&self, node_id: &str) -> StateResult<Vec<PortAllocation>> {
        self.scan_rows(PORTS, |p: &PortAllocation| p.node_id == node_id)
    }

    pub fn list_ports_for_server(&self, server_id: &str) -> StateResult<Vec<PortAllocation>> {
        self.scan_rows(PORTS, |p: &PortAllocation| p.server_id == server_id)
    }

    /// True if `port` has an ALLOCATED row on `node_id`.
    pub fn is_port_allocated(&self, node_id: &str, port: u16) -> StateResult<bool> {
        let row: Option<PortAllocation> = self.get_row(PORTS, &port_key(node_id, port))?;
        Ok(row.is_some_and(|p| p.status == AllocationStatus::Allocated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server(id: &str, node_id: &str, status: ServerStatus) -> GameServer {
        GameServer {
            server_id: id.to_string(),
            user_id: "user-1".to_string(),
            server_name: format!("{id}-name"),
            status,
            node_id: node_id.to_string(),
            game_port: 0,
            beacon_port: 0,
            ram_allocation: 4,
            cpu_allocation: 2,
            max_players: 10,
            password: None,
            container_id: None,
            status_message: None,
            created_at: 1000,
            started_at: None,
            last_seen: None,
        }
    }

    fn lowest_free(taken: &BTreeSet<u16>) -> Option<PortPair> {
        (30000u16..30010)
            .step_by(2)
            .find(|p| !taken.contains(p) && !taken.contains(&(p + 1)))
            .map(PortPair::starting_at)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    #[test]
    fn node_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let node = Node::new("node-1", "host-1", "10.0.0.1", 8, 1000);

        store.put_node(&node).unwrap();
        assert_eq!(store.get_node("node-1").unwrap(), Some(node));
        assert_eq!(store.get_node("missing").unwrap(), None);
    }

    #[test]
    fn node_update_in_place() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_node(&Node::new("node-1", "h", "10.0.0.1", 8, 1000))
            .unwrap();

        let (node, previous) = store
            .update_node("node-1", |n| {
                let previous = n.status;
                n.status = NodeStatus::Offline;
                previous
            })
            .unwrap()
            .unwrap();

        assert_eq!(previous, NodeStatus::Online);
        assert_eq!(node.status, NodeStatus::Offline);
        assert_eq!(
            store.get_node("node-1").unwrap().unwrap().status,
            NodeStatus::Offline
        );
    }

    #[test]
    fn node_update_unknown_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.update_node("ghost", |_| ()).unwrap().is_none());
        assert!(store.list_nodes().unwrap().is_empty());
    }

    // ── Servers ────────────────────────────────────────────────────

    #[test]
    fn server_queries_filter_by_node_and_user() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_server(&test_server("srv-a", "node-1", ServerStatus::Running))
            .unwrap();
        store
            .put_server(&test_server("srv-b", "node-1", ServerStatus::Stopped))
            .unwrap();
        let mut other = test_server("srv-c", "node-2", ServerStatus::Starting);
        other.user_id = "user-2".to_string();
        store.put_server(&other).unwrap();

        assert_eq!(store.list_servers().unwrap().len(), 3);
        assert_eq!(store.list_servers_for_node("node-1").unwrap().len(), 2);
        assert_eq!(store.list_servers_for_user("user-2").unwrap().len(), 1);
        assert_eq!(store.count_active_servers_for_node("node-1").unwrap(), 1);
        assert_eq!(store.count_active_servers_for_node("node-2").unwrap(), 1);
    }

    #[test]
    fn server_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_server(&test_server("srv-a", "node-1", ServerStatus::Stopped))
            .unwrap();

        assert!(store.delete_server("srv-a").unwrap());
        assert!(!store.delete_server("srv-a").unwrap());
        assert!(store.get_server("srv-a").unwrap().is_none());
    }

    // ── Ports ──────────────────────────────────────────────────────

    #[test]
    fn allocation_writes_both_rows() {
        let store = StateStore::open_in_memory().unwrap();
        let pair = store
            .allocate_port_pair("node-1", "srv-a", lowest_free)
            .unwrap()
            .unwrap();

        assert_eq!(pair, PortPair::starting_at(30000));
        let rows = store.list_ports_for_server("srv-a").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.port_type == PortType::Game && r.port == 30000));
        assert!(rows.iter().any(|r| r.port_type == PortType::Beacon && r.port == 30001));
        assert!(store.is_port_allocated("node-1", 30001).unwrap());
        assert!(!store.is_port_allocated("node-2", 30001).unwrap());
    }

    #[test]
    fn allocation_sees_existing_rows() {
        let store = StateStore::open_in_memory().unwrap();
        store.allocate_port_pair("node-1", "srv-a", lowest_free).unwrap();
        let second = store
            .allocate_port_pair("node-1", "srv-b", lowest_free)
            .unwrap()
            .unwrap();
        assert_eq!(second.game_port, 30002);

        // Other nodes have an independent port space.
        let other = store
            .allocate_port_pair("node-2", "srv-c", lowest_free)
            .unwrap()
            .unwrap();
        assert_eq!(other.game_port, 30000);
    }

    #[test]
    fn allocation_rejects_taken_port() {
        let store = StateStore::open_in_memory().unwrap();
        store.allocate_port_pair("node-1", "srv-a", lowest_free).unwrap();

        let err = store
            .allocate_port_pair("node-1", "srv-b", |_| Some(PortPair::starting_at(30000)))
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        assert!(store.list_ports_for_server("srv-b").unwrap().is_empty());
    }

    #[test]
    fn allocation_picker_none_writes_nothing() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.allocate_port_pair("node-1", "srv-a", |_| None).unwrap().is_none());
        assert!(store.list_ports_for_node("node-1").unwrap().is_empty());
    }

    #[test]
    fn release_removes_rows_and_frees_ports() {
        let store = StateStore::open_in_memory().unwrap();
        store.allocate_port_pair("node-1", "srv-a", lowest_free).unwrap();

        let released = store.release_ports_for_server("srv-a").unwrap();
        assert_eq!(released.len(), 2);
        assert!(
            released
                .iter()
                .all(|r| r.status == AllocationStatus::Released && r.released_at.is_some())
        );
        assert!(!store.is_port_allocated("node-1", 30000).unwrap());
        assert!(store.list_ports_for_node("node-1").unwrap().is_empty());
        assert!(store.release_ports_for_server("srv-a").unwrap().is_empty());
    }

    #[test]
    fn concurrent_allocations_on_one_node_never_overlap() {
        let store = StateStore::open_in_memory().unwrap();
        let handles: Vec<_> = (0..5)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .allocate_port_pair("node-1", &format!("srv-{i}"), lowest_free)
                        .unwrap()
                        .unwrap()
                })
            })
            .collect();

        let mut ports: Vec<u16> = handles
            .into_iter()
            .map(|h| h.join().unwrap().game_port)
            .collect();
        ports.sort_unstable();
        assert_eq!(ports, vec![30000, 30002, 30004, 30006, 30008]);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store
                .put_node(&Node::new("node-1", "h", "10.0.0.1", 4, 1000))
                .unwrap();
            store.allocate_port_pair("node-1", "srv-a", lowest_free).unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_node("node-1").unwrap().is_some());
        assert!(store.is_port_allocated("node-1", 30000).unwrap());
    }
}
