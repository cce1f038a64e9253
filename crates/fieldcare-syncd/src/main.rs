//! fieldcare-syncd: headless sync daemon for FieldCare visit records
//!
//! Plays the host-platform role on desktop and server installs: probes
//! reachability, fires background wakes for registrations left while
//! offline, and keeps the sync coordinator alive for the process lifetime.

mod config;
mod platform;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use fieldcare_core::{
    ConnectivityMonitor, Database, HttpRemote, PassOutcome, SyncCoordinator, SyncStatus,
};
use tracing::{error, info};

use config::Config;

#[derive(Parser)]
#[command(name = "fieldcare-syncd")]
#[command(about = "Offline sync daemon for FieldCare visit records")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "fieldcare-syncd.toml")]
    config: PathBuf,

    /// Database file (overrides config file)
    #[arg(short, long, env = "FIELDCARE_DATABASE")]
    database: Option<PathBuf>,

    /// Remote submit endpoint (overrides config file)
    #[arg(long, env = "FIELDCARE_ENDPOINT")]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon (default)
    Run,
    /// Run a single pass and print its report
    Once,
    /// Print pending/synced counts and background registrations
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fieldcare=info".parse()?)
                .add_directive("fieldcare_core=info".parse()?)
                .add_directive("fieldcare_syncd=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)?;
    if let Some(database) = cli.database {
        config.database.path = database;
    }
    if let Some(endpoint) = cli.endpoint {
        config.sync.endpoint = endpoint;
    }

    info!("Database: {}", config.database.path.display());
    info!("Endpoint: {}", config.sync.endpoint);

    let db = Database::open(&config.database.path)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Status => status(&db),
        Command::Once => once(db, &config).await,
        Command::Run => run(db, config).await,
    }
}

fn status(db: &Database) -> anyhow::Result<()> {
    println!("pending: {}", db.count_visits_by_status(SyncStatus::Pending)?);
    println!("synced:  {}", db.count_visits_by_status(SyncStatus::Synced)?);
    let tags = db.background_sync_tags()?;
    if tags.is_empty() {
        println!("background registrations: none");
    } else {
        println!("background registrations: {}", tags.join(", "));
    }
    Ok(())
}

async fn once(db: Database, config: &Config) -> anyhow::Result<()> {
    let remote = Arc::new(HttpRemote::new(&config.sync)?);
    let connectivity = Arc::new(ConnectivityMonitor::new(remote.probe().await));
    let coordinator = SyncCoordinator::new(
        Arc::new(Mutex::new(db)),
        remote,
        connectivity,
        &config.sync,
    );

    if let PassOutcome::Completed(report) = coordinator.run_sync_pass().await {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

async fn run(db: Database, config: Config) -> anyhow::Result<()> {
    let remote = Arc::new(HttpRemote::new(&config.sync)?);

    let reachable = remote.probe().await;
    info!(reachable, "Initial reachability");

    let connectivity = Arc::new(ConnectivityMonitor::new(reachable));
    let coordinator = SyncCoordinator::new(
        Arc::new(Mutex::new(db)),
        remote.clone(),
        connectivity,
        &config.sync,
    );

    let tasks = platform::spawn(&coordinator, remote, &config.sync);

    info!("fieldcare-syncd running");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    for task in &tasks {
        task.abort();
    }
    Ok(())
}
