//! gamegrid.toml configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use gamegrid_agent::DEFAULT_AGENT_PORT;
use gamegrid_health::HealthConfig;
use serde::{Deserialize, Serialize};

/// Full daemon configuration. Every section and field is optional in the
/// file and falls back to its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerSection,
    pub health: HealthConfig,
    pub agent: AgentSection,
    pub tunnel: TunnelSection,
    pub identity: IdentitySection,
    pub reconcile: ReconcileSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    /// Address handed to players in provisioning responses.
    pub public_address: String,
    pub data_dir: PathBuf,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 8080,
            public_address: "127.0.0.1".to_string(),
            data_dir: PathBuf::from("/var/lib/gamegrid"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    pub port: u16,
    pub timeout_ms: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            port: DEFAULT_AGENT_PORT,
            timeout_ms: 10_000,
        }
    }
}

/// Tunnel manager. Disabled when `url` is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TunnelSection {
    pub url: Option<String>,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentitySection {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconcileSection {
    pub interval_ms: u64,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self { interval_ms: 15_000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSection {
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.health.validate()?;
        if self.agent.timeout_ms == 0 {
            bail!("agent.timeout_ms must be positive");
        }
        if self.reconcile.interval_ms == 0 {
            bail!("reconcile.interval_ms must be positive");
        }
        if self.server.public_address.trim().is_empty() {
            bail!("server.public_address must not be blank");
        }
        if self.tunnel.url.is_some() && self.tunnel.token.is_empty() {
            bail!("tunnel.token is required when tunnel.url is set");
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent.timeout_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile.interval_ms)
    }
}
