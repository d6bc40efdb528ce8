//! `serve` — wire the subsystems together and run until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, bail};
use gamegrid_agent::{
    HostAgent, HttpHostAgent, HttpIdentityProvider, HttpTunnelManager, IdentityProvider,
    ROLE_ADMIN, ROLE_SERVICE_ACCOUNT, StubHostAgent, StubIdentityProvider, StubTunnelManager,
    TunnelManager,
};
use gamegrid_api::{ApiState, build_router};
use gamegrid_events::EventNotifier;
use gamegrid_health::HealthMonitor;
use gamegrid_lifecycle::{LifecycleOrchestrator, OrchestratorConfig, Reconciler};
use gamegrid_state::StateStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;

/// Bearer token accepted in stub mode, with admin and service-account roles.
const STUB_TOKEN: &str = "dev-token";

struct Collaborators {
    agent: Arc<dyn HostAgent>,
    tunnels: Option<Arc<dyn TunnelManager>>,
    identity: Arc<dyn IdentityProvider>,
}

fn collaborators(config: &DaemonConfig, stub: bool) -> anyhow::Result<Collaborators> {
    if stub {
        warn!(token = STUB_TOKEN, "running with stub agents; do not use in production");
        let identity = StubIdentityProvider::new().with_token(
            STUB_TOKEN,
            "dev",
            &[ROLE_ADMIN, ROLE_SERVICE_ACCOUNT],
        );
        return Ok(Collaborators {
            agent: Arc::new(StubHostAgent::new()),
            tunnels: Some(Arc::new(
                StubTunnelManager::new().with_public_address(config.server.public_address.clone()),
            )),
            identity: Arc::new(identity),
        });
    }

    let timeout = config.agent_timeout();
    let Some(identity_url) = config.identity.url.as_deref() else {
        bail!("identity.url is required unless --stub-agents is given");
    };
    let identity = HttpIdentityProvider::new(identity_url, timeout)
        .with_context(|| format!("identity url {identity_url}"))?;

    let tunnels: Option<Arc<dyn TunnelManager>> = match config.tunnel.url.as_deref() {
        Some(url) => Some(Arc::new(
            HttpTunnelManager::new(url, config.tunnel.token.clone(), timeout)
                .with_context(|| format!("tunnel url {url}"))?,
        )),
        None => {
            info!("tunnel manager disabled");
            None
        }
    };

    Ok(Collaborators {
        agent: Arc::new(HttpHostAgent::new(config.agent.port, timeout)),
        tunnels,
        identity: Arc::new(identity),
    })
}

pub async fn run(config: DaemonConfig, stub_agents: bool) -> anyhow::Result<()> {
    info!("gamegrid daemon starting");

    std::fs::create_dir_all(&config.server.data_dir)
        .with_context(|| format!("creating {}", config.server.data_dir.display()))?;
    let db_path = config.server.data_dir.join("gamegrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let notifier = Arc::new(EventNotifier::new());
    let parts = collaborators(&config, stub_agents)?;

    let mut orchestrator = LifecycleOrchestrator::new(
        store,
        parts.agent,
        notifier,
        OrchestratorConfig {
            public_address: config.server.public_address.clone(),
            agent_timeout: config.agent_timeout(),
        },
    );
    if let Some(tunnels) = parts.tunnels {
        orchestrator = orchestrator.with_tunnels(tunnels);
    }
    let orchestrator = Arc::new(orchestrator);
    info!(public_address = %config.server.public_address, "orchestrator initialized");

    // ── Background tasks ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let health_handle =
        HealthMonitor::new(orchestrator.registry().clone(), &config.health).spawn(shutdown_rx.clone());
    let reconcile_handle =
        Reconciler::new(orchestrator.clone(), config.reconcile_interval()).spawn(shutdown_rx);

    // ── API server ─────────────────────────────────────────────

    let router = build_router(ApiState::new(orchestrator, parts.identity));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl-C");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = health_handle.await;
    let _ = reconcile_handle.await;

    info!("gamegrid daemon stopped");
    Ok(())
}
