//! LifecycleOrchestrator — provisioning and state transitions for game
//! servers.
//!
//! Commands follow one shape: validate, optimistically move the row into
//! the transitional state (guarded by the allowed source states inside a
//! single store update), call the host agent under a timeout, then either
//! finalize or compensate. Agent calls never run while a store
//! transaction is open.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use gamegrid_agent::{
    AgentResult, AgentState, HostAgent, SpawnOutcome, SpawnRequest, TunnelManager,
};
use gamegrid_events::{EventNotifier, ServerStatusPayload};
use gamegrid_scheduler::{NodeRegistry, PortAllocator, PortRange, Scheduler, SchedulerError};
use gamegrid_state::{GameServer, Node, ServerStatus, StateStore, now_millis};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{LifecycleError, LifecycleResult};
use crate::request::{ProvisionRequest, ProvisionResponse, ServerStatusView};

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorConfig {
    /// Address players use to join; returned in provisioning responses.
    pub public_address: String,
    /// Upper bound on every host agent and tunnel call.
    pub agent_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            public_address: "127.0.0.1".to_string(),
            agent_timeout: Duration::from_secs(10),
        }
    }
}

/// `srv_{user}_{8 hex chars}`.
fn generate_server_id(user_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("srv_{user_id}_{}", &suffix[..8])
}

pub struct LifecycleOrchestrator {
    store: StateStore,
    registry: NodeRegistry,
    scheduler: Scheduler,
    ports: PortAllocator,
    agent: Arc<dyn HostAgent>,
    tunnels: Option<Arc<dyn TunnelManager>>,
    notifier: Arc<EventNotifier>,
    config: OrchestratorConfig,
}

impl LifecycleOrchestrator {
    pub fn new(
        store: StateStore,
        agent: Arc<dyn HostAgent>,
        notifier: Arc<EventNotifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            registry: NodeRegistry::new(store.clone()).with_notifier(notifier.clone()),
            scheduler: Scheduler::new(store.clone()),
            ports: PortAllocator::new(store.clone()),
            store,
            agent,
            tunnels: None,
            notifier,
            config,
        }
    }

    pub fn with_tunnels(mut self, tunnels: Arc<dyn TunnelManager>) -> Self {
        self.tunnels = Some(tunnels);
        self
    }

    pub fn with_port_range(mut self, range: PortRange) -> Self {
        self.ports = PortAllocator::with_range(self.store.clone(), range);
        self
    }

    /// Registry sharing this orchestrator's store and notifier.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    pub fn notifier(&self) -> &Arc<EventNotifier> {
        &self.notifier
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ── Provisioning ───────────────────────────────────────────────

    /// Create a server, place it, reserve ports and ask the agent to spawn
    /// it.
    ///
    /// Validation happens before anything is written. Once the row exists,
    /// every failure is compensated before the error is returned: a
    /// capacity failure removes the row, a spawn failure releases the
    /// ports and leaves the row in ERROR.
    pub async fn provision(&self, request: ProvisionRequest) -> LifecycleResult<ProvisionResponse> {
        request.validate()?;

        let node = self
            .scheduler
            .select_node(request.preferred_node_id.as_deref())?;
        let server = GameServer {
            server_id: generate_server_id(request.user_id.trim()),
            user_id: request.user_id.trim().to_string(),
            server_name: request.server_name.trim().to_string(),
            status: ServerStatus::Provisioning,
            node_id: node.node_id.clone(),
            game_port: 0,
            beacon_port: 0,
            ram_allocation: request.ram_allocation,
            cpu_allocation: request.cpu_allocation,
            max_players: request.max_players,
            password: request.password,
            container_id: None,
            status_message: None,
            created_at: now_millis(),
            started_at: None,
            last_seen: None,
        };
        let server_id = server.server_id.clone();

        self.store.put_server(&server)?;
        self.notifier.server_changed(&server);
        info!(%server_id, node_id = %node.node_id, user_id = %server.user_id, "server provisioning");

        let (node, server) = self.reserve(&node.node_id, &server)?;
        let server = self.spawn_on(&node, server).await?;
        Ok(ProvisionResponse::new(&server, &self.config.public_address))
    }

    /// Confirm the slot, then reserve and record a port pair. Any failure
    /// removes the PROVISIONING row along with whatever it already holds.
    fn reserve(&self, node_id: &str, server: &GameServer) -> LifecycleResult<(Node, GameServer)> {
        let reserved = self.try_reserve(node_id, &server.server_id);
        if let Err(e) = &reserved {
            warn!(server_id = %server.server_id, %node_id, error = %e, "reservation failed, discarding");
            self.discard(server);
        }
        reserved
    }

    fn try_reserve(&self, node_id: &str, server_id: &str) -> LifecycleResult<(Node, GameServer)> {
        // Concurrent provisions may have raced for the last slot.
        let node = self.registry.refresh_current_servers(node_id)?;
        if node.current_servers > node.max_servers {
            return Err(LifecycleError::Capacity(format!(
                "node {node_id} filled up during placement"
            )));
        }

        let pair = self.ports.allocate_ports(node_id, server_id)?;
        let server = self.update(server_id, |s| {
            s.game_port = pair.game_port;
            s.beacon_port = pair.beacon_port;
        })?;
        Ok((node, server))
    }

    /// Spawn the container for a server that holds ports. Accepted → STARTING;
    /// otherwise the ports are released and the server goes to ERROR.
    ///
    /// If the row left its current state while the spawn was in flight, the
    /// new container is torn down and its ports released.
    async fn spawn_on(&self, node: &Node, server: GameServer) -> LifecycleResult<GameServer> {
        let server_id = server.server_id.clone();
        let expected = server.status;
        let request = SpawnRequest::for_server(&server);
        let outcome = self
            .call("spawn", self.agent.spawn(node, &request))
            .await
            .and_then(|outcome| match outcome {
                SpawnOutcome::Accepted { container_id } => Ok(container_id),
                SpawnOutcome::Rejected { reason } => Err(LifecycleError::ExternalCall(format!(
                    "spawn rejected: {reason}"
                ))),
            });

        match outcome {
            Ok(container_id) => {
                let now = now_millis();
                let finished = self.finish(&server_id, "spawn", expected, ServerStatus::Starting, |s| {
                    s.container_id = container_id;
                    s.started_at = Some(now);
                    s.last_seen = Some(now);
                    s.status_message = None;
                });
                let server = match finished {
                    Ok(server) => server,
                    Err(e) => {
                        warn!(%server_id, error = %e, "spawn acknowledged for a superseded server");
                        if let Err(e) = self.call("delete", self.agent.delete(node, &server_id)).await {
                            warn!(%server_id, error = %e, "orphan container teardown failed");
                        }
                        if let Ok(current) = self.get_server(&server_id) {
                            if current.has_ports() && !current.status.is_active() {
                                self.fail(&server_id, "container torn down after a concurrent update", true);
                            }
                        }
                        return Err(e);
                    }
                };
                info!(%server_id, node_id = %node.node_id, game_port = server.game_port, "spawn accepted");
                self.open_tunnel(&server).await;
                self.refresh_node(&server.node_id);
                Ok(server)
            }
            Err(e) => {
                self.fail(&server_id, &e.to_string(), true);
                Err(e)
            }
        }
    }

    // ── Lifecycle commands ─────────────────────────────────────────

    /// Start a STOPPED or ERROR server.
    ///
    /// A server whose ports were released (failed provisioning) is
    /// re-placed on its node and spawned again, ending in STARTING;
    /// otherwise the agent's acknowledgment finalizes it to RUNNING.
    pub async fn start(&self, server_id: &str) -> LifecycleResult<GameServer> {
        let current = self.get_server(server_id)?;
        let node = self.registry.get_node(&current.node_id)?;
        self.ensure_slot(&current, &node)?;

        let server = self.begin(
            server_id,
            "start",
            &[ServerStatus::Stopped, ServerStatus::Error],
            ServerStatus::Starting,
        )?;
        self.refresh_node(&server.node_id);

        if !server.has_ports() {
            let pair = match self.ports.allocate_ports(&node.node_id, server_id) {
                Ok(pair) => pair,
                Err(e) => {
                    let e = LifecycleError::from(e);
                    self.fail(server_id, &e.to_string(), false);
                    return Err(e);
                }
            };
            let server = self.update(server_id, |s| {
                s.game_port = pair.game_port;
                s.beacon_port = pair.beacon_port;
            })?;
            return self.spawn_on(&node, server).await;
        }

        match self.call("start", self.agent.start(&node, server_id)).await {
            Ok(()) => {
                let now = now_millis();
                let server = self.finish(
                    server_id,
                    "start",
                    ServerStatus::Starting,
                    ServerStatus::Running,
                    |s| {
                        s.started_at = Some(now);
                        s.last_seen = Some(now);
                        s.status_message = None;
                    },
                )?;
                info!(%server_id, "server started");
                self.open_tunnel(&server).await;
                Ok(server)
            }
            Err(e) => {
                self.fail(server_id, &e.to_string(), false);
                Err(e)
            }
        }
    }

    /// Stop a running (or starting, restarting, failed) server.
    pub async fn stop(&self, server_id: &str) -> LifecycleResult<GameServer> {
        let server = self.begin(
            server_id,
            "stop",
            &[
                ServerStatus::Running,
                ServerStatus::Starting,
                ServerStatus::Restarting,
                ServerStatus::Error,
            ],
            ServerStatus::Stopping,
        )?;

        // Nothing was ever launched; there is no container to stop.
        if !server.has_ports() {
            let server = self.transition(server_id, |s| s.status = ServerStatus::Stopped)?;
            self.refresh_node(&server.node_id);
            return Ok(server);
        }

        let node = self.registry.get_node(&server.node_id)?;
        match self.call("stop", self.agent.stop(&node, server_id)).await {
            Ok(()) => {
                let server = self.finish(
                    server_id,
                    "stop",
                    ServerStatus::Stopping,
                    ServerStatus::Stopped,
                    |s| {
                        s.last_seen = Some(now_millis());
                        s.status_message = None;
                    },
                )?;
                info!(%server_id, "server stopped");
                self.close_tunnel(server_id).await;
                self.refresh_node(&server.node_id);
                Ok(server)
            }
            Err(e) => {
                self.fail(server_id, &e.to_string(), false);
                Err(e)
            }
        }
    }

    pub async fn restart(&self, server_id: &str) -> LifecycleResult<GameServer> {
        let current = self.get_server(server_id)?;
        if !current.has_ports() {
            return Err(LifecycleError::Conflict(format!(
                "server {server_id} has no container; start it instead"
            )));
        }
        let node = self.registry.get_node(&current.node_id)?;
        self.ensure_slot(&current, &node)?;

        let server = self.begin(
            server_id,
            "restart",
            &[
                ServerStatus::Running,
                ServerStatus::Stopped,
                ServerStatus::Error,
            ],
            ServerStatus::Restarting,
        )?;
        self.refresh_node(&server.node_id);

        match self.call("restart", self.agent.restart(&node, server_id)).await {
            Ok(()) => {
                let now = now_millis();
                let server = self.finish(
                    server_id,
                    "restart",
                    ServerStatus::Restarting,
                    ServerStatus::Running,
                    |s| {
                        s.started_at = Some(now);
                        s.last_seen = Some(now);
                        s.status_message = None;
                    },
                )?;
                info!(%server_id, "server restarted");
                if current.status != ServerStatus::Running {
                    self.open_tunnel(&server).await;
                }
                Ok(server)
            }
            Err(e) => {
                self.fail(server_id, &e.to_string(), false);
                Err(e)
            }
        }
    }

    /// Tear a server down and forget it.
    ///
    /// PROVISIONING and STARTING servers are refused unless `force` is set.
    /// A RUNNING server is stopped first. Agent and tunnel teardown are best
    /// effort; port release and row removal are not.
    pub async fn delete(&self, server_id: &str, force: bool) -> LifecycleResult<()> {
        let server = self.get_server(server_id)?;
        if !force
            && matches!(
                server.status,
                ServerStatus::Provisioning | ServerStatus::Starting
            )
        {
            return Err(LifecycleError::InvalidState {
                server_id: server_id.to_string(),
                status: server.status,
                operation: "delete",
            });
        }

        let node = self.registry.get_node(&server.node_id).ok();
        if let Some(node) = &node {
            if server.status == ServerStatus::Running {
                if let Err(e) = self.call("stop", self.agent.stop(node, server_id)).await {
                    warn!(%server_id, error = %e, "stop before delete failed, continuing");
                }
            }
            if server.has_ports() || server.container_id.is_some() {
                if let Err(e) = self.call("delete", self.agent.delete(node, server_id)).await {
                    warn!(%server_id, error = %e, "container teardown failed, continuing");
                }
            }
        }
        self.close_tunnel(server_id).await;

        self.ports.release_ports(server_id)?;
        self.store.delete_server(server_id)?;
        self.refresh_node(&server.node_id);
        self.notifier.broadcast_server_status(
            server_id,
            &server.user_id,
            ServerStatusPayload::deleted(&server),
        );
        info!(%server_id, force, "server deleted");
        Ok(())
    }

    /// Administrative override. Entering is allowed from STOPPED or ERROR;
    /// leaving returns the server to STOPPED.
    pub fn set_maintenance(&self, server_id: &str, enabled: bool) -> LifecycleResult<GameServer> {
        let server = if enabled {
            self.begin(
                server_id,
                "enter maintenance",
                &[ServerStatus::Stopped, ServerStatus::Error],
                ServerStatus::Maintenance,
            )?
        } else {
            self.begin(
                server_id,
                "leave maintenance",
                &[ServerStatus::Maintenance],
                ServerStatus::Stopped,
            )?
        };
        info!(%server_id, enabled, "server maintenance toggled");
        Ok(server)
    }

    // ── Agent reports and polling ──────────────────────────────────

    /// Apply a container state reported by (or polled from) the agent.
    ///
    /// Finalizes transitional states. A failure releases the ports only
    /// while the server is still PROVISIONING; once a spawn was accepted the
    /// container exists and keeps its pair until it is deleted.
    pub fn report_status(&self, server_id: &str, state: AgentState) -> LifecycleResult<GameServer> {
        let now = now_millis();
        let (server, (previous, release)) = self
            .store
            .update_server(server_id, |s| {
                let previous = s.status;
                s.last_seen = Some(now);
                let next = match (s.status, state) {
                    (ServerStatus::Starting | ServerStatus::Restarting, AgentState::Running) => {
                        Some(ServerStatus::Running)
                    }
                    (ServerStatus::Stopping | ServerStatus::Running, AgentState::Stopped) => {
                        Some(ServerStatus::Stopped)
                    }
                    (status, AgentState::Failed)
                        if status.is_active() || status == ServerStatus::Stopping =>
                    {
                        Some(ServerStatus::Error)
                    }
                    _ => None,
                };
                if let Some(next) = next {
                    s.status = next;
                    if next == ServerStatus::Error {
                        s.status_message = Some("container reported failure".to_string());
                    }
                }
                let release =
                    next == Some(ServerStatus::Error) && previous == ServerStatus::Provisioning;
                (previous, release)
            })?
            .ok_or_else(|| LifecycleError::server_not_found(server_id))?;

        if server.status == previous {
            debug!(%server_id, ?state, "agent report, no transition");
            return Ok(server);
        }

        info!(%server_id, from = %previous, to = %server.status, "agent report applied");
        let server = if release {
            self.release_ports_of(server_id);
            self.update(server_id, |s| {
                s.game_port = 0;
                s.beacon_port = 0;
            })?
        } else {
            server
        };
        self.notifier.server_changed(&server);
        self.refresh_node(&server.node_id);
        Ok(server)
    }

    /// Poll the agent for one server and apply what it says.
    pub async fn reconcile(&self, server_id: &str) -> LifecycleResult<GameServer> {
        let server = self.get_server(server_id)?;
        let node = self.registry.get_node(&server.node_id)?;
        let status = self
            .call("status", self.agent.status(&node, server_id))
            .await?;
        if status.state == AgentState::Unknown {
            return Ok(server);
        }
        self.report_status(server_id, status.state)
    }

    /// The stored server plus live agent statistics when available.
    pub async fn server_status(&self, server_id: &str) -> LifecycleResult<ServerStatusView> {
        let server = self.get_server(server_id)?;
        if !server.has_ports() {
            return Ok(ServerStatusView {
                server,
                agent: None,
                stats_error: None,
            });
        }

        let lookup = match self.registry.get_node(&server.node_id) {
            Ok(node) => self.call("status", self.agent.status(&node, server_id)).await,
            Err(e) => Err(e.into()),
        };
        Ok(match lookup {
            Ok(status) => ServerStatusView {
                server,
                agent: Some(status),
                stats_error: None,
            },
            Err(e) => ServerStatusView {
                server,
                agent: None,
                stats_error: Some(e.to_string()),
            },
        })
    }

    // ── Queries ────────────────────────────────────────────────────

    pub fn get_server(&self, server_id: &str) -> LifecycleResult<GameServer> {
        self.store
            .get_server(server_id)?
            .ok_or_else(|| LifecycleError::server_not_found(server_id))
    }

    pub fn list_servers(&self) -> LifecycleResult<Vec<GameServer>> {
        Ok(self.store.list_servers()?)
    }

    pub fn list_servers_for_user(&self, user_id: &str) -> LifecycleResult<Vec<GameServer>> {
        Ok(self.store.list_servers_for_user(user_id)?)
    }

    // ── Internals ──────────────────────────────────────────────────

    /// Run an external call under the configured timeout.
    async fn call<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = AgentResult<T>>,
    ) -> LifecycleResult<T> {
        match tokio::time::timeout(self.config.agent_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LifecycleError::ExternalCall(format!("{operation}: {e}"))),
            Err(_) => Err(LifecycleError::ExternalCall(format!(
                "{operation} timed out after {} ms",
                self.config.agent_timeout.as_millis()
            ))),
        }
    }

    /// Move to `target` only if the current status is in `allowed`.
    fn begin(
        &self,
        server_id: &str,
        operation: &'static str,
        allowed: &[ServerStatus],
        target: ServerStatus,
    ) -> LifecycleResult<GameServer> {
        let (server, outcome) = self
            .store
            .update_server(server_id, |s| {
                if allowed.contains(&s.status) {
                    s.status = target;
                    Ok(())
                } else {
                    Err(s.status)
                }
            })?
            .ok_or_else(|| LifecycleError::server_not_found(server_id))?;

        match outcome {
            Ok(()) => {
                debug!(%server_id, %operation, status = %target, "transition begun");
                self.notifier.server_changed(&server);
                Ok(server)
            }
            Err(status) => Err(LifecycleError::InvalidState {
                server_id: server_id.to_string(),
                status,
                operation,
            }),
        }
    }

    /// Finalize a command started with `begin`. The row must still be in
    /// `expected`; a row already at (or, for STARTING, past) `target` only
    /// takes the field updates. Any other state means a
    /// concurrent report or command won, and nothing is written.
    fn finish(
        &self,
        server_id: &str,
        operation: &'static str,
        expected: ServerStatus,
        target: ServerStatus,
        f: impl FnOnce(&mut GameServer),
    ) -> LifecycleResult<GameServer> {
        let (server, outcome) = self
            .store
            .update_server(server_id, |s| {
                // A RUNNING report may overtake a spawn acknowledgment.
                let settled = s.status == target
                    || (target == ServerStatus::Starting && s.status == ServerStatus::Running);
                if s.status != expected && !settled {
                    return Err(s.status);
                }
                if s.status == expected {
                    s.status = target;
                }
                f(s);
                Ok(())
            })?
            .ok_or_else(|| LifecycleError::server_not_found(server_id))?;

        match outcome {
            Ok(()) => {
                self.notifier.server_changed(&server);
                Ok(server)
            }
            Err(status) => Err(LifecycleError::Conflict(format!(
                "server {server_id} moved to {status} during {operation}"
            ))),
        }
    }

    /// Mutate and publish.
    fn transition(
        &self,
        server_id: &str,
        f: impl FnOnce(&mut GameServer),
    ) -> LifecycleResult<GameServer> {
        let server = self.update(server_id, f)?;
        self.notifier.server_changed(&server);
        Ok(server)
    }

    /// Mutate without publishing.
    fn update(&self, server_id: &str, f: impl FnOnce(&mut GameServer)) -> LifecycleResult<GameServer> {
        self.store
            .update_server(server_id, f)?
            .map(|(server, ())| server)
            .ok_or_else(|| LifecycleError::server_not_found(server_id))
    }

    /// Starting a non-active server needs a free slot on an ONLINE node.
    fn ensure_slot(&self, server: &GameServer, node: &Node) -> LifecycleResult<()> {
        if server.status.is_active() {
            return Ok(());
        }
        if !node.is_schedulable() {
            return Err(LifecycleError::Capacity(format!(
                "node {} is {} with {}/{} servers",
                node.node_id, node.status, node.current_servers, node.max_servers
            )));
        }
        Ok(())
    }

    /// Put the server in ERROR, optionally releasing its ports. Failures
    /// here are logged; the caller is already reporting an error.
    fn fail(&self, server_id: &str, reason: &str, release_ports: bool) {
        warn!(%server_id, %reason, release_ports, "server failed");
        if release_ports {
            self.release_ports_of(server_id);
        }
        let result = self.transition(server_id, |s| {
            s.status = ServerStatus::Error;
            s.status_message = Some(reason.to_string());
            if release_ports {
                s.game_port = 0;
                s.beacon_port = 0;
            }
        });
        match result {
            Ok(server) => self.refresh_node(&server.node_id),
            Err(e) => error!(%server_id, error = %e, "failed to record server error"),
        }
    }

    /// Remove a row that never got past PROVISIONING.
    fn discard(&self, server: &GameServer) {
        self.release_ports_of(&server.server_id);
        if let Err(e) = self.store.delete_server(&server.server_id) {
            error!(server_id = %server.server_id, error = %e, "failed to discard server row");
        }
        self.refresh_node(&server.node_id);
        self.notifier.broadcast_server_status(
            &server.server_id,
            &server.user_id,
            ServerStatusPayload::deleted(server),
        );
    }

    fn release_ports_of(&self, server_id: &str) {
        if let Err(e) = self.ports.release_ports(server_id) {
            error!(%server_id, error = %e, "failed to release ports");
        }
    }

    fn refresh_node(&self, node_id: &str) {
        match self.registry.refresh_current_servers(node_id) {
            Ok(_) => {}
            Err(SchedulerError::NodeNotFound(_)) => {
                warn!(%node_id, "server references unknown node")
            }
            Err(e) => error!(%node_id, error = %e, "failed to refresh server count"),
        }
    }

    async fn open_tunnel(&self, server: &GameServer) {
        let Some(tunnels) = &self.tunnels else {
            return;
        };
        let result = self
            .call(
                "tunnel create",
                tunnels.create_instance(&server.server_id, server.game_port, server.beacon_port),
            )
            .await;
        if let Err(e) = result {
            warn!(server_id = %server.server_id, error = %e, "tunnel creation failed");
        }
    }

    async fn close_tunnel(&self, server_id: &str) {
        let Some(tunnels) = &self.tunnels else {
            return;
        };
        if let Err(e) = self
            .call("tunnel delete", tunnels.delete_instance(server_id))
            .await
        {
            warn!(%server_id, error = %e, "tunnel removal failed");
        }
    }
}
