// ABOUTME: CLI entry point for postgres-test-store
// ABOUTME: Maintenance commands for test databases: create, drop, status, and purge

use clap::{Parser, Subcommand};
use postgres_test_store::{commands, StoreConfig, TestHarness};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "postgres-test-store")]
#[command(about = "Manage ephemeral PostgreSQL databases used by test suites", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a test-store TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Base connection string (overrides config and TEST_DATABASE_URL)
    #[arg(long, global = true)]
    connection: Option<String>,
    /// Scratch database prefix (overrides config and TEST_STORE_SCRATCH_PREFIX)
    #[arg(long, global = true)]
    scratch_prefix: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a test database, optionally from a GO-separated SQL script
    Create {
        name: String,
        /// Script to run after (re)creating the database
        #[arg(long)]
        script: Option<PathBuf>,
        /// Drop and recreate the database if it already exists
        #[arg(long)]
        recreate: bool,
    },
    /// Terminate sessions on a test database and drop it
    Drop { name: String },
    /// Check server version, privileges, and leftover scratch databases
    Status {
        /// Also report whether this database exists
        name: Option<String>,
    },
    /// Delete scratch databases left behind by killed test runs
    Purge {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = StoreConfig::load(cli.config.as_deref())?;
    if let Some(connection) = cli.connection {
        config.connection_string = connection;
    }
    if let Some(prefix) = cli.scratch_prefix {
        config.scratch_prefix = prefix;
    }
    let harness = TestHarness::new(&config)?;

    match cli.command {
        Commands::Create {
            name,
            script,
            recreate,
        } => commands::create(&harness, &name, script.as_deref(), recreate).await,
        Commands::Drop { name } => commands::drop_database(&harness, &name).await,
        Commands::Status { name } => commands::status(&harness, name.as_deref()).await,
        Commands::Purge { yes } => commands::purge(&harness, yes).await,
    }
}
