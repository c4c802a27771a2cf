//! schema-reconcile CLI - declarative schema migration for PostgreSQL, MySQL, SQL Server and SQLite.

use clap::{Parser, Subcommand};
use schema_reconcile::{
    Config, DesiredSchema, Dialect, DialectImpl, DialectKind, MigrateError, MigrationPlan,
    Migrator, Schema,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "schema-reconcile")]
#[command(about = "Reconcile a declarative entity schema against a live database")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the migration plan without changing the database
    Plan {
        /// Path to the desired schema (YAML or JSON)
        #[arg(short, long)]
        schema: PathBuf,
    },

    /// Bring the database schema in line with the desired schema
    Apply {
        /// Path to the desired schema (YAML or JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Allocate a 2^32 id block per table
        #[arg(long)]
        global_unique_id: bool,

        /// Drop columns absent from the desired schema
        #[arg(long)]
        drop_column: bool,

        /// Drop indexes absent from the desired schema
        #[arg(long)]
        drop_index: bool,
    },

    /// Validate a schema file offline
    ValidateSchema {
        /// Path to the desired schema (YAML or JSON)
        #[arg(short, long)]
        schema: PathBuf,

        /// Dialect to check type mappings against
        #[arg(long, default_value = "postgres")]
        dialect: String,
    },

    /// Test the database connection
    HealthCheck,
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

    // Offline: no configuration or connection needed
    if let Commands::ValidateSchema { schema, dialect } = &cli.command {
        return validate_schema(schema, dialect, cli.output_json);
    }

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::ValidateSchema { .. } => unreachable!(), // Handled above
        Commands::Plan { schema } => {
            let schema = Schema::load(&schema)?;
            let migrator = Migrator::connect(&config).await?;
            let plan = migrator.plan(&schema).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan, migrator.dialect(), migrator.namespace());
            }
        }

        Commands::Apply {
            schema,
            global_unique_id,
            drop_column,
            drop_index,
        } => {
            // Flags only ever enable toggles the config leaves off
            let options = &mut config.migration;
            options.global_unique_id |= global_unique_id;
            options.drop_column |= drop_column;
            options.drop_index |= drop_index;

            let schema = Schema::load(&schema)?;
            let cancel_token = setup_signal_handler();
            let migrator = Migrator::connect(&config).await?;
            let report = migrator.migrate(&schema, cancel_token).await?;

            if cli.output_json {
                println!("{}", report.to_json()?);
            } else {
                println!("\nMigration completed!");
                println!("  Database: {} ({})", report.namespace, report.dialect);
                println!("  Duration: {:.2}s", report.duration_seconds);
                println!(
                    "  Operations: {} ({} destructive)",
                    report.applied(),
                    report.destructive
                );
                for op in &report.operations {
                    println!("    {}", op);
                }
                if !report.tags.is_empty() {
                    println!("  Id blocks:");
                    for tag in &report.tags {
                        println!("    {} -> {}", tag.table, tag.block());
                    }
                }
                if report.verified {
                    println!("  Verified: schema is up to date");
                }
            }
        }

        Commands::HealthCheck => {
            let migrator = Migrator::connect(&config).await?;
            let result = migrator.health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  {} ({}): {} ({}ms)",
                    result.dialect,
                    result.namespace,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::connection(
                    result.error.unwrap_or_default(),
                    "health check",
                ));
            }
        }
    }

    Ok(())
}

fn validate_schema(path: &Path, dialect: &str, output_json: bool) -> Result<(), MigrateError> {
    let dialect = DialectImpl::from_kind(DialectKind::parse(dialect)?);
    let schema = Schema::load(path)?;
    let desired = DesiredSchema::build(&dialect, &schema)?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&desired.tables)?);
        return Ok(());
    }

    println!("Schema is valid for {}:", dialect.name());
    for table in &desired.tables {
        println!(
            "  {} ({} columns, {} indexes, {} foreign keys)",
            table.name,
            table.columns.len(),
            table.indexes.len(),
            table.foreign_keys.len()
        );
    }
    for rename in &desired.renames {
        println!("  rename {}.{} -> {}", rename.table, rename.from, rename.to);
    }
    Ok(())
}

fn print_plan(plan: &MigrationPlan, dialect: &DialectImpl, namespace: &str) {
    if plan.is_empty() {
        println!("Schema is up to date.");
        return;
    }

    println!(
        "Plan: {} operations ({} destructive)\n",
        plan.len(),
        plan.destructive_count()
    );
    for (i, op) in plan.render(dialect, namespace).iter().enumerate() {
        println!("{:>3}. {}", i + 1, op.description);
        for stmt in &op.statements {
            println!("       {};", stmt);
        }
    }
    if !plan.tags.is_empty() {
        println!("\nId blocks:");
        for tag in &plan.tags {
            println!(
                "  {} -> {}{}",
                tag.table,
                tag.block(),
                if tag.new { " (new)" } else { "" }
            );
        }
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG overrides --verbosity
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

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

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// The returned token is cancelled when a signal is received; the migrator
/// stops before the next operation.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    error!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!("\nReceived {}. Stopping after the current operation...", name);
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!("\nReceived Ctrl-C. Stopping after the current operation...");
        token.cancel();
    });

    cancel_token
}
