//! gamegrid-lifecycle — the game-server state machine.
//!
//! ```text
//! PROVISIONING ─▶ STARTING ─▶ RUNNING ─▶ STOPPING ─▶ STOPPED
//!                     ▲          │  ▲                   │
//!                     │          ▼  │                   │
//!                     │      RESTARTING                 │
//!                     └─────────────────────────────────┘
//!   any active state ─▶ ERROR          MAINTENANCE (admin override)
//! ```
//!
//! The [`LifecycleOrchestrator`] combines node selection, port allocation
//! and the host agent into the operations above. Partial work is undone on
//! failure: a server that never starts never keeps a port pair. Every
//! transition is pushed to the owner through the `EventNotifier`.
//!
//! The [`Reconciler`] polls the host agent for servers waiting in a
//! transitional state and finalizes them.

pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod request;

pub use error::{LifecycleError, LifecycleResult};
pub use orchestrator::{LifecycleOrchestrator, OrchestratorConfig};
pub use reconcile::{ReconcileReport, Reconciler};
pub use request::{PROVISION_MESSAGE, ProvisionRequest, ProvisionResponse, ServerStatusView};
