//! One-shot command-line client

use clap::{Parser, Subcommand};
use quorumkv::common::config::{BACKUP_PORT, PRIMARY_PORT};
use quorumkv::KvClient;

#[derive(Parser)]
#[command(name = "quorumkv")]
#[command(about = "quorumkv key-value store CLI")]
#[command(version)]
struct Cli {
    /// Coordinators to try, primary first (comma-separated)
    #[arg(long, value_delimiter = ',', default_values_t = default_coordinators())]
    coordinators: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value
    Write {
        /// Key
        key: String,

        /// Value (a single word)
        value: String,
    },

    /// Fetch a value
    Read {
        /// Key
        key: String,
    },
}

fn default_coordinators() -> Vec<String> {
    (PRIMARY_PORT..=BACKUP_PORT + 2)
        .map(|port| format!("127.0.0.1:{}", port))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut client = KvClient::connect(&cli.coordinators).await?;

    match cli.command {
        Commands::Write { key, value } => {
            client.write(&key, &value).await?;
            println!("✓ Wrote {}", key);
        }
        Commands::Read { key } => match client.read(&key).await? {
            Some(value) => println!("{}", value),
            None => {
                eprintln!("{} not found", key);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
