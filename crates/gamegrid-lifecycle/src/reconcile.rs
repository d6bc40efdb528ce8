//! Background reconciliation of servers waiting on the host agent.
//!
//! STARTING, STOPPING and RESTARTING are finalized either by an agent
//! report or, when no report arrives, by this loop polling the agent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::LifecycleOrchestrator;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub checked: usize,
    /// Servers whose status changed.
    pub transitioned: Vec<String>,
    pub failures: Vec<(String, String)>,
}

pub struct Reconciler {
    orchestrator: Arc<LifecycleOrchestrator>,
    interval: Duration,
}

impl Reconciler {
    pub fn new(orchestrator: Arc<LifecycleOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Poll every transitional server once.
    pub async fn reconcile_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let servers = match self.orchestrator.list_servers() {
            Ok(servers) => servers,
            Err(e) => {
                warn!(error = %e, "reconcile could not list servers");
                report.failures.push((String::new(), e.to_string()));
                return report;
            }
        };

        for server in servers.iter().filter(|s| s.status.is_transitional()) {
            report.checked += 1;
            match self.orchestrator.reconcile(&server.server_id).await {
                Ok(updated) if updated.status != server.status => {
                    report.transitioned.push(server.server_id.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(server_id = %server.server_id, error = %e, "reconcile poll failed");
                    report.failures.push((server.server_id.clone(), e.to_string()));
                }
            }
        }

        if !report.transitioned.is_empty() {
            info!(
                checked = report.checked,
                transitioned = report.transitioned.len(),
                "reconcile pass finalized servers"
            );
        }
        report
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        info!(interval_ms = self.interval.as_millis() as u64, "reconciler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.reconcile_once().await;
                }
                _ = shutdown.changed() => {
                    debug!("reconciler shutting down");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use gamegrid_agent::{AgentState, StubHostAgent};
    use gamegrid_events::EventNotifier;
    use gamegrid_state::{ServerStatus, StateStore};

    use super::*;
    use crate::orchestrator::OrchestratorConfig;
    use crate::request::ProvisionRequest;

    fn setup() -> (Arc<LifecycleOrchestrator>, Arc<StubHostAgent>) {
        let agent = Arc::new(StubHostAgent::new());
        agent.set_settle_state(AgentState::Starting);
        let orchestrator = LifecycleOrchestrator::new(
            StateStore::open_in_memory().unwrap(),
            agent.clone(),
            Arc::new(EventNotifier::new()),
            OrchestratorConfig::default(),
        );
        orchestrator
            .registry()
            .register_node("node-1", "host-1", "127.0.0.1", 8)
            .unwrap();
        (Arc::new(orchestrator), agent)
    }

    async fn provision(orchestrator: &LifecycleOrchestrator) -> String {
        orchestrator
            .provision(ProvisionRequest {
                user_id: "u1".to_string(),
                server_name: "arena".to_string(),
                ram_allocation: 4,
                cpu_allocation: 2,
                max_players: 8,
                password: None,
                preferred_node_id: None,
            })
            .await
            .unwrap()
            .server_id
    }

    #[tokio::test]
    async fn pass_finalizes_started_servers() {
        let (orchestrator, agent) = setup();
        let a = provision(&orchestrator).await;
        let b = provision(&orchestrator).await;
        agent.set_state(&a, AgentState::Running);

        let reconciler = Reconciler::new(orchestrator.clone(), Duration::from_secs(60));
        let report = reconciler.reconcile_once().await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.transitioned, vec![a.clone()]);
        assert_eq!(orchestrator.get_server(&a).unwrap().status, ServerStatus::Running);
        assert_eq!(orchestrator.get_server(&b).unwrap().status, ServerStatus::Starting);

        agent.set_state(&b, AgentState::Failed);
        let report = reconciler.reconcile_once().await;
        assert_eq!(report.checked, 1);
        assert_eq!(orchestrator.get_server(&b).unwrap().status, ServerStatus::Error);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let (orchestrator, _) = setup();
        let (tx, rx) = watch::channel(false);
        let handle = Reconciler::new(orchestrator, Duration::from_millis(10)).spawn(rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
