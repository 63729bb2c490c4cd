//! Storage slave binary

use clap::Parser;
use quorumkv::common::{parse_duration, Config};
use quorumkv::SlaveNode;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "quorumkv-slave")]
#[command(about = "quorumkv storage slave")]
#[command(version)]
struct Args {
    /// Coordinators to try, in order (comma-separated)
    #[arg(long, value_delimiter = ',')]
    coordinators: Vec<String>,

    /// Idle time before pinging the coordinator, e.g. "30s"
    #[arg(long, value_parser = parse_duration)]
    idle_timeout: Option<std::time::Duration>,

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

    let mut slave_config = config.slave;
    if !args.coordinators.is_empty() {
        slave_config.coordinators = args.coordinators;
    }
    if let Some(idle) = args.idle_timeout {
        slave_config.idle_timeout_ms = idle.as_millis() as u64;
    }
    slave_config.validate()?;

    tracing::info!("Starting quorumkv slave {}", quorumkv::VERSION);
    tracing::info!("  Coordinators: {}", slave_config.coordinators.join(", "));

    tokio::select! {
        _ = SlaveNode::new(slave_config).run() => {}
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down"),
    }

    Ok(())
}
