//! mysql-copy CLI - online table copy between MySQL servers.

use clap::{Args, Parser, Subcommand};
use mysql_copy::orchestrator::resolve;
use mysql_copy::{
    AliasMap, Config, ConnectionsFile, CopyConfig, CopyError, MysqlReader, Orchestrator,
    ProgressTracker, Role, SessionSettings, SourceReader, TableSelection,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-copy")]
#[command(about = "Copy MySQL tables online with temp-table swap")]
#[command(version)]
struct Cli {
    /// Named connections file [default: ~/.config/mysql-copy/connections.yaml]
    #[arg(long, global = true)]
    connections: Option<PathBuf>,

    /// Table aliases file [default: ~/.config/mysql-copy/aliases.yaml]
    #[arg(long, global = true)]
    aliases: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    /// Shorthand for --verbosity debug
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60", global = true)]
    shutdown_timeout: u64,

    /// Print progress updates as JSON lines to stderr
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy tables from SOURCE to DEST
    Copy {
        /// Source connection name or mysql:// URL
        source: String,

        /// Destination connection name or mysql:// URL
        dest: String,

        /// Tables, glob patterns or aliases (exclusions with --all)
        tables: Vec<String>,

        #[command(flatten)]
        options: CopyOptions,
    },

    /// Show which tables a selection resolves to, largest first
    Plan {
        /// Source connection name or mysql:// URL
        source: String,

        /// Tables, glob patterns or aliases (exclusions with --all)
        tables: Vec<String>,

        /// Select every table
        #[arg(long)]
        all: bool,
    },

    /// Test database connections
    HealthCheck {
        /// Source connection name or mysql:// URL
        source: String,

        /// Destination connection name or mysql:// URL
        dest: String,
    },
}

#[derive(Args)]
struct CopyOptions {
    /// Concurrent table copies (default: 4)
    #[arg(short = 't', long)]
    workers: Option<usize>,

    /// Copy every table; listed tables are excluded
    #[arg(long)]
    all: bool,

    /// Insert into existing tables, skipping duplicate keys
    #[arg(long)]
    insert_ignore: bool,

    /// Log the statements that would run without changing the destination
    #[arg(long)]
    dry_run: bool,

    /// Copy table definitions only
    #[arg(short = 'n', long)]
    skip_data: bool,

    /// Skip the row count used for progress
    #[arg(long)]
    skip_count: bool,

    /// Rows buffered between reader and writer (default: 10000)
    #[arg(short = 'r', long)]
    row_buffer: Option<usize>,

    /// Rows per insert batch (default: 1000)
    #[arg(long)]
    batch_rows: Option<usize>,

    /// Maximum size of one INSERT statement in bytes (default: 4194304)
    #[arg(long)]
    max_statement_bytes: Option<usize>,

    /// Prefix for temporary table names
    #[arg(short = 'p', long)]
    temp_prefix: Option<String>,

    /// Concurrent finalize tasks (default: 4)
    #[arg(long)]
    finalize_workers: Option<usize>,

    /// Finalize all tables inside one destination transaction
    #[arg(long)]
    finalize_in_transaction: bool,

    /// Also copy stored functions
    #[arg(long)]
    funcs: bool,

    /// Also copy views
    #[arg(long)]
    views: bool,

    /// Also copy stored procedures
    #[arg(long)]
    procs: bool,

    /// Session time zone for both sides
    #[arg(long)]
    time_zone: Option<String>,
}

impl CopyOptions {
    fn into_config(self) -> CopyConfig {
        let defaults = CopyConfig::default();
        CopyConfig {
            workers: self.workers,
            finalize_workers: self.finalize_workers,
            finalize_in_transaction: self.finalize_in_transaction,
            row_buffer: self.row_buffer,
            batch_rows: self.batch_rows,
            max_statement_bytes: self.max_statement_bytes,
            temp_table_prefix: self.temp_prefix.unwrap_or(defaults.temp_table_prefix),
            insert_ignore: self.insert_ignore,
            skip_data: self.skip_data,
            skip_count: self.skip_count,
            dry_run: self.dry_run,
            copy_functions: self.funcs,
            copy_views: self.views,
            copy_procedures: self.procs,
            time_zone: self.time_zone.unwrap_or(defaults.time_zone),
            ..defaults
        }
    }
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

async fn run() -> Result<(), CopyError> {
    let cli = Cli::parse();

    let verbosity = if cli.verbose { "debug" } else { cli.verbosity.as_str() };
    setup_logging(verbosity, &cli.log_format);

    let connections = load_connections(cli.connections.as_deref())?;
    let aliases = load_aliases(cli.aliases.as_deref())?;

    match cli.command {
        Commands::Copy {
            source,
            dest,
            tables,
            options,
        } => {
            let selection = TableSelection {
                tables,
                all: options.all,
            };
            let config = Config {
                source: connections.resolve(&source, Role::Source)?,
                target: connections.resolve(&dest, Role::Destination)?,
                copy: options.into_config(),
            };
            config.validate()?;
            info!(
                "Copying from {} to {}",
                config.source.describe(),
                config.target.describe()
            );

            let cancel_token = setup_signal_handler(cli.shutdown_timeout)?;
            let mut orchestrator = Orchestrator::connect(&config).await?.with_aliases(aliases);

            let reporter = if cli.progress {
                let tracker = Arc::new(ProgressTracker::new());
                orchestrator = orchestrator.with_progress(tracker.clone());
                Some(spawn_progress_reporter(tracker))
            } else {
                None
            };

            let result = run_with_shutdown(
                &orchestrator,
                &selection,
                cancel_token,
                Duration::from_secs(cli.shutdown_timeout),
            )
            .await;

            if let Some((stop, handle)) = reporter {
                stop.cancel();
                handle.await.ok();
            }
            orchestrator.close().await;
            let result = result?;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                let status_msg = if config.copy.dry_run {
                    "Dry run completed!"
                } else {
                    "Copy completed!"
                };
                println!("\n{}", status_msg);
                println!("  Run ID: {}", result.run_id);
                println!("  Duration: {:.2}s", result.duration_seconds);
                println!("  Tables: {}", result.tables_total);
                println!("  Rows: {}", result.rows_transferred);
                println!("  Throughput: {} rows/sec", result.rows_per_second);
                if result.routines_copied > 0 {
                    println!("  Routines: {}", result.routines_copied);
                }
                if !result.warnings.is_empty() {
                    println!("  Warnings:");
                    for warning in &result.warnings {
                        println!("    {}", warning);
                    }
                }
            }
        }

        Commands::Plan {
            source,
            tables,
            all,
        } => {
            let conn = connections.resolve(&source, Role::Source)?;
            let copy = CopyConfig::default();
            let reader =
                MysqlReader::new(&conn, &SessionSettings::for_source(&conn, &copy), 2).await?;
            let catalog = reader.list_tables().await;
            reader.close().await;

            let worklist = resolve(&catalog?, &TableSelection { tables, all }, &aliases)?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&worklist)?);
            } else {
                println!("{} table(s), largest first:", worklist.len());
                for table in &worklist {
                    println!("  {:<48} {:>14} bytes", table.name, table.size_bytes);
                }
            }
        }

        Commands::HealthCheck { source, dest } => {
            let config = Config {
                source: connections.resolve(&source, Role::Source)?,
                target: connections.resolve(&dest, Role::Destination)?,
                copy: CopyConfig::default(),
            };
            let orchestrator = Orchestrator::connect(&config).await?;
            let result = orchestrator.health_check().await?;
            orchestrator.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Source ({}): {} ({}ms)",
                    config.source.describe(),
                    if result.source_connected { "OK" } else { "FAILED" },
                    result.source_latency_ms
                );
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target ({}): {} ({}ms)",
                    config.target.describe(),
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(CopyError::pool("health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

/// Explicit paths must exist; the default files may be missing.
fn load_connections(path: Option<&Path>) -> Result<ConnectionsFile, CopyError> {
    match path {
        Some(path) => ConnectionsFile::load(path),
        None => match mysql_copy::config::default_config_dir() {
            Some(dir) => ConnectionsFile::load_optional(dir.join("connections.yaml")),
            None => Ok(ConnectionsFile::default()),
        },
    }
}

fn load_aliases(path: Option<&Path>) -> Result<AliasMap, CopyError> {
    match path {
        Some(path) => AliasMap::load(path),
        None => match mysql_copy::config::default_config_dir() {
            Some(dir) => AliasMap::load_optional(dir.join("aliases.yaml")),
            None => Ok(AliasMap::default()),
        },
    }
}

/// Run the copy; after a shutdown signal wait at most `timeout` for it to stop.
async fn run_with_shutdown(
    orchestrator: &Orchestrator,
    selection: &TableSelection,
    cancel: CancellationToken,
    timeout: Duration,
) -> Result<mysql_copy::CopyResult, CopyError> {
    let run = orchestrator.run(selection, cancel.clone());
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => result,
        _ = cancel.cancelled() => {
            match tokio::time::timeout(timeout, &mut run).await {
                Ok(result) => result,
                Err(_) => {
                    eprintln!("Shutdown timeout reached, exiting");
                    Err(CopyError::Cancelled)
                }
            }
        }
    }
}

/// Print a JSON progress snapshot to stderr every two seconds.
fn spawn_progress_reporter(
    tracker: Arc<ProgressTracker>,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let stop = CancellationToken::new();
    let stopped = stop.clone();
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(2));
        loop {
            tokio::select! {
                _ = stopped.cancelled() => break,
                _ = ticker.tick() => {
                    if let Ok(line) = serde_json::to_string(&tracker.snapshot()) {
                        eprintln!("{}", line);
                    }
                }
            }
        }
    });
    (stop, handle)
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
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
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> Result<CancellationToken, CopyError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!(
            "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
            name, shutdown_timeout
        );
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(_shutdown_timeout: u64) -> Result<CancellationToken, CopyError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
