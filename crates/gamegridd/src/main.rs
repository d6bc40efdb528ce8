//! gamegridd — the gamegrid orchestrator daemon.
//!
//! Single binary that assembles the subsystems:
//! - State store (redb)
//! - Node registry, scheduler and port allocator
//! - Lifecycle orchestrator + reconciler
//! - Health monitor
//! - REST API + event stream
//!
//! # Usage
//!
//! ```text
//! gamegridd serve --config /etc/gamegrid/gamegrid.toml
//! gamegridd serve --config gamegrid.toml --stub-agents --data-dir ./data
//! gamegridd check-config --config gamegrid.toml
//! ```

mod config;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;

const DEFAULT_FILTER: &str = "info,gamegridd=debug,gamegrid_lifecycle=debug,gamegrid_scheduler=debug";

#[derive(Parser)]
#[command(name = "gamegridd", about = "gamegrid orchestrator daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator.
    Serve {
        /// Path to gamegrid.toml.
        #[arg(long, default_value = "gamegrid.toml")]
        config: PathBuf,

        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,

        /// Override `server.data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Use in-process host agent, tunnel and identity stubs.
        #[arg(long)]
        stub_agents: bool,
    },

    /// Parse and validate a configuration file, then exit.
    CheckConfig {
        #[arg(long, default_value = "gamegrid.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            data_dir,
            stub_agents,
        } => {
            let mut config = DaemonConfig::from_file(&config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            init_tracing(config.logging.json);
            serve::run(config, stub_agents).await
        }
        Command::CheckConfig { config: path } => {
            let config = DaemonConfig::from_file(&path)?;
            println!("{} is valid", path.display());
            println!("  listen port     {}", config.server.port);
            println!("  data dir        {}", config.server.data_dir.display());
            println!("  agent port      {}", config.agent.port);
            println!("  heartbeat ttl   {:?}", config.health.timeout());
            println!(
                "  tunnels         {}",
                config.tunnel.url.as_deref().unwrap_or("disabled")
            );
            Ok(())
        }
    }
}
