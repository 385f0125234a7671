use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use quorum_client::{ClientConfig, ClientSettings};

mod commands;

use commands::{cluster, users};

/// Log filter when `RUST_LOG` is unset. Logs go to stderr, command output to stdout.
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser)]
#[command(name = "quorum")]
#[command(author, version, about = "Quorum cluster client", long_about = None)]
struct Cli {
    /// TOML client configuration
    #[arg(short, long, env = "QUORUM_CONFIG")]
    config: Option<PathBuf>,

    /// Seed endpoints, overriding the configuration
    #[arg(short, long, value_delimiter = ',')]
    seeds: Vec<String>,

    /// leader, follower, read-only-replica or random
    #[arg(short, long)]
    preference: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Cluster {
        #[command(subcommand)]
        command: cluster::ClusterCommands,
    },
    Users {
        #[command(subcommand)]
        command: users::UserCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    debug!("using {} seed(s)", settings.connectivity.seeds.len());

    match cli.command {
        Commands::Cluster { command } => cluster::execute(command, settings).await?,
        Commands::Users { command } => users::execute(command, settings).await?,
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<ClientSettings> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::load()?,
    };

    if !cli.seeds.is_empty() {
        config.connectivity.seeds = cli.seeds.clone();
    }
    if let Some(preference) = &cli.preference {
        config.connectivity.node_preference = preference.clone();
    }

    Ok(config.into_settings()?)
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
