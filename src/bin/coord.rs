//! Coordinator binary

use clap::Parser;
use quorumkv::common::{parse_duration, Config, CoordinatorRole};
use quorumkv::Coordinator;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quorumkv-coord")]
#[command(about = "quorumkv primary or backup coordinator")]
#[command(version)]
struct Args {
    /// Which coordinator to run
    #[arg(long, value_enum)]
    role: Option<CoordinatorRole>,

    /// Listen address (defaults to port 12345 for primary, 12346 for backup)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Operation log (backup only)
    #[arg(long)]
    log_path: Option<PathBuf>,

    /// Deadline for one slave exchange, e.g. "3s"
    #[arg(long, value_parser = parse_duration)]
    slave_timeout: Option<std::time::Duration>,

    /// Config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let log_level = args.log_level.clone().unwrap_or(config.log_level);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| log_level.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut coord_config = config.coordinator;
    if let Some(role) = args.role {
        // A role switch without an explicit address moves to that role's port
        if role != coord_config.role && args.bind.is_none() {
            coord_config.bind_addr.set_port(role.default_port());
        }
        coord_config.role = role;
    }
    if let Some(bind) = args.bind {
        coord_config.bind_addr = bind;
    }
    if let Some(log_path) = args.log_path {
        coord_config.log_path = log_path;
    }
    if let Some(timeout) = args.slave_timeout {
        coord_config.slave_timeout_ms = timeout.as_millis() as u64;
    }

    let coordinator = Coordinator::open(coord_config)?;

    tokio::select! {
        res = coordinator.serve() => res?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
