//! dbmigrate CLI - MySQL/MariaDB to PostgreSQL migration.

mod operator;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dbmigrate::{Config, MigrateError, MigrationResult, Orchestrator, RunState};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use operator::TerminalOperator;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "dbmigrate")]
#[command(about = "Migrate a prefixed MySQL/MariaDB schema and its data to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Table prefix shared by every application table [default: mdl_]
    #[arg(long)]
    prefix: Option<String>,

    /// Target database type (pgsql, postgres, postgresql)
    #[arg(long)]
    dbtype: Option<String>,

    /// Target driver as <type>/<library>, e.g. pgsql/native
    #[arg(long)]
    dbconnector: Option<String>,

    /// Target host
    #[arg(long)]
    dbhost: Option<String>,

    /// Target port
    #[arg(long)]
    dbport: Option<u16>,

    /// Target database name
    #[arg(long)]
    dbname: Option<String>,

    /// Target user
    #[arg(long)]
    dbuser: Option<String>,

    /// Target password
    #[arg(long, env = "DBMIGRATE_DBPASS", hide_env_values = true)]
    dbpass: Option<String>,

    /// Source host
    #[arg(long)]
    source_host: Option<String>,

    /// Source port
    #[arg(long)]
    source_port: Option<u16>,

    /// Source database name
    #[arg(long)]
    source_db: Option<String>,

    /// Source user
    #[arg(long)]
    source_user: Option<String>,

    /// Source password
    #[arg(long, env = "DBMIGRATE_SOURCE_PASS", hide_env_values = true)]
    source_pass: Option<String>,

    /// Only migrate these tables (comma-separated, without prefix)
    #[arg(long, value_delimiter = ',')]
    only_tables: Vec<String>,

    /// Skip these tables (comma-separated, without prefix)
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Rows per copy window
    #[arg(long)]
    page_size: Option<usize>,

    /// Number of tables copied in parallel
    #[arg(long)]
    workers: Option<usize>,

    /// Truncate existing target tables without asking
    #[arg(long)]
    force: bool,

    /// Confirm the source application is in maintenance mode
    #[arg(long)]
    maintenance: bool,

    /// Leave target sequences where they are after the copy
    #[arg(long)]
    no_reset_sequences: bool,

    /// Compare source and target row counts after the copy
    #[arg(long)]
    validate: bool,

    /// Show the plan and DDL without changing the target
    #[arg(long)]
    dry_run: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::read(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };
    apply_overrides(&cli, &mut config)?;
    config.validate()?;
    let config = config.with_auto_tuning();

    let cancel_token = setup_signal_handler();
    let operator = Arc::new(TerminalOperator::new(cli.output_json));

    let result = Orchestrator::connect(config, operator)
        .await?
        .with_cancellation(cancel_token)
        .dry_run(cli.dry_run)
        .run()
        .await?;

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        print_result(&result);
    }

    Ok(())
}

/// Apply command-line flags on top of the file configuration.
fn apply_overrides(cli: &Cli, config: &mut Config) -> Result<(), MigrateError> {
    let target = &mut config.target;
    if let Some(dbtype) = &cli.dbtype {
        target.r#type = dbtype.clone();
    }
    if let Some(connector) = &cli.dbconnector {
        let (dbtype, library) = match connector.split_once('/') {
            Some((t, l)) => (t, Some(l)),
            None => (connector.as_str(), None),
        };
        if let Some(library) = library.filter(|l| !l.eq_ignore_ascii_case("native")) {
            return Err(MigrateError::Config(format!(
                "Unsupported database library '{}' in --dbconnector; only 'native' is available",
                library
            )));
        }
        target.r#type = dbtype.to_string();
    }
    if let Some(host) = &cli.dbhost {
        target.host = host.clone();
    }
    if let Some(port) = cli.dbport {
        target.port = port;
    }
    if let Some(name) = &cli.dbname {
        target.database = name.clone();
    }
    if let Some(user) = &cli.dbuser {
        target.user = user.clone();
    }
    if let Some(pass) = &cli.dbpass {
        target.password = pass.clone();
    }

    let source = &mut config.source;
    if let Some(host) = &cli.source_host {
        source.host = host.clone();
    }
    if let Some(port) = cli.source_port {
        source.port = port;
    }
    if let Some(db) = &cli.source_db {
        source.database = db.clone();
    }
    if let Some(user) = &cli.source_user {
        source.user = user.clone();
    }
    if let Some(pass) = &cli.source_pass {
        source.password = pass.clone();
    }

    let migration = &mut config.migration;
    if let Some(prefix) = &cli.prefix {
        migration.prefix = prefix.clone();
    }
    if !cli.only_tables.is_empty() {
        migration.include_tables = cli.only_tables.clone();
    }
    if !cli.exclude.is_empty() {
        migration.exclude_tables = cli.exclude.clone();
    }
    if let Some(page_size) = cli.page_size {
        migration.page_size = page_size;
    }
    if let Some(workers) = cli.workers {
        migration.workers = Some(workers);
    }
    migration.force |= cli.force;
    migration.maintenance |= cli.maintenance;
    migration.validate_row_counts |= cli.validate;
    if cli.no_reset_sequences {
        migration.reset_sequences = false;
    }

    Ok(())
}

fn print_result(result: &MigrationResult) {
    match result.status {
        RunState::Aborted => {
            println!("\nMigration aborted; the target was not changed.");
            return;
        }
        _ if result.dry_run => println!("\nDry run completed!"),
        _ => println!("\nMigration completed!"),
    }
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {} ({} created, {} truncated)",
        result.tables_total, result.tables_created, result.tables_truncated
    );
    println!("  Rows: {}", result.rows_transferred);
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    println!(
        "  Sequences: {} reset, {} failed",
        result.sequences_reset, result.sequences_failed
    );
    for m in &result.row_count_mismatches {
        println!(
            "  Row count mismatch: {} (source {}, target {})",
            m.table, m.source_rows, m.target_rows
        );
    }
}

/// Log to stderr so stdout carries only the summary, prompts and JSON.
fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel the run on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current windows...", name);
                    token.cancel();
                });
            }
            Err(e) => tracing::warn!("Could not install {} handler: {}", name, e),
        }
    }

    cancel_token
}

/// Ctrl-C only outside unix.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current windows...");
            token.cancel();
        }
    });

    cancel_token
}
