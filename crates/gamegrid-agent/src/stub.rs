//! In-process implementations with scripted behavior.
//!
//! Used by tests and by the daemon when started without real agents.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use gamegrid_state::Node;
use tracing::debug;

use crate::contract::{
    AgentState, ContainerStatus, HostAgent, Identity, IdentityProvider, SpawnOutcome, SpawnRequest,
    TunnelInstance, TunnelManager,
};
use crate::error::{AgentError, AgentResult};

/// How a stubbed call responds.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    Accept,
    /// Spawn answers `Rejected`; other calls fail with this reason.
    Reject(String),
    /// Fail with a transport-style error.
    Fail(String),
    /// Never answer.
    Hang,
    /// Answer like `Accept` after a pause.
    Delay(Duration),
}

fn read(lock: &RwLock<Behavior>) -> Behavior {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write(lock: &RwLock<Behavior>, behavior: Behavior) {
    *lock.write().unwrap_or_else(|e| e.into_inner()) = behavior;
}

async fn gate(behavior: Behavior) -> AgentResult<()> {
    match behavior {
        Behavior::Accept => Ok(()),
        Behavior::Reject(reason) | Behavior::Fail(reason) => Err(AgentError::Stub(reason)),
        Behavior::Hang => std::future::pending().await,
        Behavior::Delay(pause) => {
            tokio::time::sleep(pause).await;
            Ok(())
        }
    }
}

// ── Host agent ─────────────────────────────────────────────────────

#[derive(Debug)]
pub struct StubHostAgent {
    spawn: RwLock<Behavior>,
    control: RwLock<Behavior>,
    teardown: RwLock<Behavior>,
    /// State a container settles in after an accepted spawn/start/restart.
    settle: RwLock<AgentState>,
    states: DashMap<String, AgentState>,
    calls: RwLock<Vec<String>>,
}

impl Default for StubHostAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl StubHostAgent {
    /// Accepts everything; containers report RUNNING once started.
    pub fn new() -> Self {
        Self {
            spawn: RwLock::new(Behavior::Accept),
            control: RwLock::new(Behavior::Accept),
            teardown: RwLock::new(Behavior::Accept),
            settle: RwLock::new(AgentState::Running),
            states: DashMap::new(),
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn set_spawn(&self, behavior: Behavior) {
        write(&self.spawn, behavior);
    }

    /// Behavior of start, stop and restart.
    pub fn set_control(&self, behavior: Behavior) {
        write(&self.control, behavior);
    }

    pub fn set_teardown(&self, behavior: Behavior) {
        write(&self.teardown, behavior);
    }

    /// State reported after an accepted spawn/start/restart.
    pub fn set_settle_state(&self, state: AgentState) {
        *self.settle.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn set_state(&self, server_id: &str, state: AgentState) {
        self.states.insert(server_id.to_string(), state);
    }

    pub fn state_of(&self, server_id: &str) -> Option<AgentState> {
        self.states.get(server_id).map(|s| *s)
    }

    /// Calls received so far, as `op:server_id`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, op: &str, server_id: &str) {
        debug!(%op, %server_id, "stub agent call");
        self.calls
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(format!("{op}:{server_id}"));
    }

    fn settle_state(&self) -> AgentState {
        *self.settle.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl HostAgent for StubHostAgent {
    async fn spawn(&self, _node: &Node, request: &SpawnRequest) -> AgentResult<SpawnOutcome> {
        self.record("spawn", &request.server_id);
        let behavior = read(&self.spawn);
        if let Behavior::Delay(pause) = behavior {
            tokio::time::sleep(pause).await;
        }
        match behavior {
            Behavior::Accept | Behavior::Delay(_) => {
                self.set_state(&request.server_id, self.settle_state());
                Ok(SpawnOutcome::Accepted {
                    container_id: Some(format!("stub-{}", request.server_id)),
                })
            }
            Behavior::Reject(reason) => Ok(SpawnOutcome::Rejected { reason }),
            Behavior::Fail(reason) => Err(AgentError::Stub(reason)),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn start(&self, _node: &Node, server_id: &str) -> AgentResult<()> {
        self.record("start", server_id);
        gate(read(&self.control)).await?;
        self.set_state(server_id, self.settle_state());
        Ok(())
    }

    async fn stop(&self, _node: &Node, server_id: &str) -> AgentResult<()> {
        self.record("stop", server_id);
        gate(read(&self.control)).await?;
        self.set_state(server_id, AgentState::Stopped);
        Ok(())
    }

    async fn restart(&self, _node: &Node, server_id: &str) -> AgentResult<()> {
        self.record("restart", server_id);
        gate(read(&self.control)).await?;
        self.set_state(server_id, self.settle_state());
        Ok(())
    }

    async fn delete(&self, _node: &Node, server_id: &str) -> AgentResult<()> {
        self.record("delete", server_id);
        gate(read(&self.teardown)).await?;
        self.states.remove(server_id);
        Ok(())
    }

    async fn status(&self, _node: &Node, server_id: &str) -> AgentResult<ContainerStatus> {
        let state = self.state_of(server_id).unwrap_or(AgentState::Unknown);
        Ok(ContainerStatus::in_state(state))
    }
}

// ── Tunnel manager ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct StubTunnelManager {
    behavior: RwLock<Behavior>,
    public_address: Option<String>,
    instances: DashMap<String, TunnelInstance>,
}

impl Default for StubTunnelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StubTunnelManager {
    pub fn new() -> Self {
        Self {
            behavior: RwLock::new(Behavior::Accept),
            public_address: None,
            instances: DashMap::new(),
        }
    }

    pub fn with_public_address(mut self, address: impl Into<String>) -> Self {
        self.public_address = Some(address.into());
        self
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        write(&self.behavior, behavior);
    }

    pub fn has_instance(&self, server_id: &str) -> bool {
        self.instances.contains_key(server_id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

#[async_trait]
impl TunnelManager for StubTunnelManager {
    async fn create_instance(
        &self,
        server_id: &str,
        game_port: u16,
        beacon_port: u16,
    ) -> AgentResult<TunnelInstance> {
        gate(read(&self.behavior)).await?;
        let instance = TunnelInstance {
            server_id: server_id.to_string(),
            public_address: self.public_address.clone(),
            game_port,
            beacon_port,
        };
        self.instances.insert(server_id.to_string(), instance.clone());
        Ok(instance)
    }

    async fn delete_instance(&self, server_id: &str) -> AgentResult<()> {
        gate(read(&self.behavior)).await?;
        self.instances.remove(server_id);
        Ok(())
    }
}

// ── Identity ───────────────────────────────────────────────────────

/// Token table lookup.
#[derive(Debug, Default)]
pub struct StubIdentityProvider {
    tokens: DashMap<String, Identity>,
    unavailable: AtomicBool,
}

impl StubIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, token: &str, user_id: &str, roles: &[&str]) -> Self {
        self.tokens.insert(
            token.to_string(),
            Identity {
                user_id: user_id.to_string(),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }
}

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    async fn validate_token(&self, token: &str) -> AgentResult<Identity> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AgentError::IdentityUnavailable("stubbed outage".to_string()));
        }
        self.tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(AgentError::InvalidToken)
    }
}
