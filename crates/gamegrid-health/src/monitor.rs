//! Health monitor — background task that expires silent nodes.
//!
//! One pass walks every ONLINE node and marks it OFFLINE when its last
//! heartbeat is older than the timeout. A failure on one node is logged
//! and recorded in the [`HealthReport`]; the pass carries on with the rest.

use std::time::Duration;

use gamegrid_scheduler::NodeRegistry;
use gamegrid_state::{NodeStatus, now_millis};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::HealthConfig;

/// Outcome of a single scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    /// ONLINE nodes examined.
    pub checked: usize,
    /// Nodes transitioned to OFFLINE during this pass.
    pub marked_offline: Vec<String>,
    /// Nodes whose update failed, with the error text.
    pub failures: Vec<(String, String)>,
}

/// Periodic heartbeat-timeout scanner.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: NodeRegistry,
    interval: Duration,
    timeout: Duration,
}

impl HealthMonitor {
    pub fn new(registry: NodeRegistry, config: &HealthConfig) -> Self {
        Self {
            registry,
            interval: config.interval(),
            timeout: config.timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Scan now.
    pub fn check_once(&self) -> HealthReport {
        self.check_at(now_millis())
    }

    /// Scan as if the current time were `now` (epoch millis).
    pub fn check_at(&self, now: u64) -> HealthReport {
        let cutoff = now.saturating_sub(self.timeout.as_millis() as u64);
        let mut report = HealthReport::default();

        let nodes = match self.registry.list_nodes() {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "health check could not list nodes");
                report.failures.push((String::new(), e.to_string()));
                return report;
            }
        };

        for node in nodes.iter().filter(|n| n.status == NodeStatus::Online) {
            report.checked += 1;
            if node.last_heartbeat >= cutoff {
                continue;
            }
            match self.registry.mark_offline_if_stale(&node.node_id, cutoff) {
                Ok(Some(_)) => report.marked_offline.push(node.node_id.clone()),
                Ok(None) => debug!(node_id = %node.node_id, "heartbeat arrived during scan"),
                Err(e) => {
                    error!(node_id = %node.node_id, error = %e, "failed to mark node offline");
                    report.failures.push((node.node_id.clone(), e.to_string()));
                }
            }
        }

        if !report.marked_offline.is_empty() {
            info!(
                checked = report.checked,
                offline = report.marked_offline.len(),
                "health check marked nodes offline"
            );
        } else {
            debug!(checked = report.checked, "health check complete");
        }
        report
    }

    /// Run scans on a fixed interval until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        info!(
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            "health monitor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_once();
                }
                _ = shutdown.changed() => {
                    debug!("health monitor shutting down");
                    break;
                }
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
