//! Azure SQL Migration CLI
//!
//! Exports databases to blob storage, copies the snapshots across storage
//! accounts, imports them on the target servers and verifies row counts.

// CLI tool - relax pedantic lints for ergonomics
#![allow(clippy::pedantic)]

use clap::{Parser, Subcommand};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use azsql_migrate::config::{DEFAULT_CONFIG_FILE, DEFAULT_QUERIES_FILE};
use azsql_migrate::{
    ui, AzCliGateway, MigrationConfig, Pipeline, SqlServerVerifier, TerminalConsole,
    VerificationQuerySet,
};

#[derive(Parser)]
#[command(name = "azsql-migrate")]
#[command(version)]
#[command(about = "Migrate Azure SQL databases between servers through blob storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Migration configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verification query file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_QUERIES_FILE)]
    queries: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE", env = "AZSQL_MIGRATE_LOG")]
    log_file: Option<PathBuf>,

    /// Seconds between export completion checks
    #[arg(long, value_name = "SECS")]
    poll_interval: Option<u64>,

    /// Give up waiting for exports after this many seconds
    #[arg(long, value_name = "SECS")]
    poll_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migration from config file
    Run {
        /// Migration configuration file
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Verification query file
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_QUERIES_FILE)]
        queries: PathBuf,
    },

    /// Validate configuration and query files
    Validate {
        /// Migration configuration file
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Verification query file
        #[arg(short, long, value_name = "FILE", default_value = DEFAULT_QUERIES_FILE)]
        queries: PathBuf,
    },

    /// Generate example configuration and query files
    Init {
        /// Output configuration file path
        #[arg(short, long, default_value = "migration.yaml")]
        output: PathBuf,

        /// Output query file path
        #[arg(short, long, default_value = "queries.yaml")]
        queries: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_file.as_deref()) {
        eprintln!("Cannot initialise logging: {e}");
        std::process::exit(1);
    }

    let overrides = Overrides {
        poll_interval: cli.poll_interval,
        poll_timeout: cli.poll_timeout,
    };

    let outcome = match cli.command {
        Some(Commands::Run { config, queries }) => run_migration(&config, &queries, &overrides).await,
        Some(Commands::Validate { config, queries }) => validate_config(&config, &queries),
        Some(Commands::Init { output, queries }) => generate_config(&output, &queries),
        None => run_migration(&cli.config, &cli.queries, &overrides).await,
    };

    if let Err(e) = outcome {
        if e.downcast_ref::<azsql_migrate::Error>()
            .is_some_and(azsql_migrate::Error::is_operator_exit)
        {
            info!("Exiting at operator request");
            std::process::exit(0);
        }
        tracing::error!("{:#}", e);
        ui::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = File::options().create(true).append(true).open(path)?;
            let subscriber = builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = builder.with_writer(std::io::stderr).finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

struct Overrides {
    poll_interval: Option<u64>,
    poll_timeout: Option<u64>,
}

fn load(config_path: &Path, queries_path: &Path) -> anyhow::Result<(MigrationConfig, VerificationQuerySet)> {
    info!("Loading configuration from {:?}", config_path);
    let config = MigrationConfig::from_file(config_path)?;
    info!("Loading verification queries from {:?}", queries_path);
    let queries = VerificationQuerySet::from_file(queries_path)?;
    Ok((config, queries))
}

async fn run_migration(config_path: &Path, queries_path: &Path, overrides: &Overrides) -> anyhow::Result<()> {
    let (mut config, queries) = load(config_path, queries_path)?;

    if let Some(secs) = overrides.poll_interval {
        config.options.poll_interval_secs = secs;
    }
    if let Some(secs) = overrides.poll_timeout {
        config.options.poll_timeout_secs = Some(secs);
    }

    config.validate()?;

    ui::print_header();
    ui::print_plan(&config, queries.len());

    let cloud = Arc::new(AzCliGateway::new(&config.options)?);
    let verifier = Arc::new(SqlServerVerifier::new(&config.options));
    let console = Arc::new(TerminalConsole::new());

    let mut pipeline = Pipeline::new(config, queries, cloud, verifier, console);
    let summary = pipeline.run().await?;

    ui::print_summary(&summary);
    Ok(())
}

fn validate_config(config_path: &Path, queries_path: &Path) -> anyhow::Result<()> {
    let (config, queries) = load(config_path, queries_path)?;
    config.validate()?;

    println!("✅ Configuration is valid!");
    println!("   Source:    {}", config.source.storage_url());
    println!("   Target:    {}", config.target.storage_url());
    println!("   Databases: {}", config.database_configs.len());
    println!("   Probes:    {}", queries.len());

    Ok(())
}

fn generate_config(output: &Path, queries: &Path) -> anyhow::Result<()> {
    for path in [output, queries] {
        if path.exists() {
            anyhow::bail!("{} already exists", path.display());
        }
    }

    std::fs::write(output, CONFIG_TEMPLATE)?;
    std::fs::write(queries, QUERIES_TEMPLATE)?;
    println!("✅ Generated configuration: {:?}", output);
    println!("✅ Generated verification queries: {:?}", queries);
    println!(
        "   Edit the files and run: azsql-migrate run --config {:?} --queries {:?}",
        output, queries
    );

    Ok(())
}

const CONFIG_TEMPLATE: &str = r#"# Azure SQL Migration Configuration
source:
  resource_group: rg-source
  subscription: source-subscription-id
  storage_account_url: https://sourceaccount.blob.core.windows.net
  container: migrationbackups
  # auth_type: SQL
  # storage_type: StorageAccessKey

target:
  resource_group: rg-target
  subscription: target-subscription-id
  storage_account_url: https://targetaccount.blob.core.windows.net
  container: migrationbackups

database_configs:
  - source_resource_group: rg-source
    source_server: source-server.database.windows.net
    source_db: your_database
    target_resource_group: rg-target
    target_server: target-server.database.windows.net
    target_db: your_database

options:
  poll_interval_secs: 5
  # poll_timeout_secs: 7200
  az_path: az
  azcopy_path: azcopy
  sas_validity_hours: 24
  sql_port: 1433
  trust_server_certificate: true
"#;

const QUERIES_TEMPLATE: &str = r#"# Each query must return a single integer
- SELECT COUNT(*) FROM sys.tables
- SELECT COUNT(*) FROM sys.procedures
- SELECT COUNT(*) FROM sys.views
"#;
