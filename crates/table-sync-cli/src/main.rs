//! table-sync CLI - content-hash synchronization of MySQL/MariaDB tables.

use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use table_sync::core::SchemaProvider;
use table_sync::{
    Config, ConnectionConfig, ConnectionFactory, MysqlConnectionFactory, SyncError, SyncReport,
    TableConnection,
};
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "table-sync")]
#[command(about = "Content-hash synchronization of MySQL/MariaDB tables")]
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
    /// Print the aggregate content hash and row count of a table
    Hash {
        /// Table name
        #[arg(long)]
        table: String,

        /// Which configured store to read
        #[arg(long, value_enum, default_value = "target")]
        side: Side,
    },

    /// Compare a target table against the same table on the source
    Diff {
        /// Table name
        #[arg(long)]
        table: String,
    },

    /// Make a target table hold exactly the rows of the source table
    Sync {
        /// Table name
        #[arg(long)]
        table: String,

        /// Dry run: compute and report the plan without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// List the tables of a configured store
    Tables {
        /// Which configured store to list
        #[arg(long, value_enum, default_value = "target")]
        side: Side,
    },

    /// Test database connections
    HealthCheck,
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    Source,
    Target,
}

impl Side {
    fn select(self, config: &Config) -> Result<&ConnectionConfig, SyncError> {
        match self {
            Side::Target => Ok(&config.target),
            Side::Source => require_source(config),
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

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Hash { table, side } => {
            let factory = MysqlConnectionFactory::new(side.select(&config)?)?;
            let result = table_hash(&factory, &table, &config).await;
            factory.close().await?;
            let (rows, hash) = result?;

            if cli.output_json {
                let out = json!({ "table": table, "rows": rows, "table_hash": hash });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}  {} ({} rows)", hash, table, rows);
            }
        }

        Commands::Diff { table } => {
            let source_factory = MysqlConnectionFactory::new(require_source(&config)?)?;
            let target_factory = MysqlConnectionFactory::new(&config.target)?;
            let result = diff_tables(&source_factory, &target_factory, &table, &config).await;
            source_factory.close().await?;
            target_factory.close().await?;
            let counts = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                println!("Diff of {}:", table);
                println!("  Unchanged: {}", counts["unchanged"]);
                println!("  Obsolete: {}", counts["obsolete"]);
                println!("  Stale: {}", counts["stale"]);
                println!("  New: {}", counts["new"]);
            }
        }

        Commands::Sync { table, dry_run } => {
            let source_factory = MysqlConnectionFactory::new(require_source(&config)?)?;
            let target_factory = MysqlConnectionFactory::new(&config.target)?;
            let result = sync_tables(&source_factory, &target_factory, &table, &config, dry_run).await;
            source_factory.close().await?;
            target_factory.close().await?;
            let report = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }

        Commands::Tables { side } => {
            let factory = MysqlConnectionFactory::new(side.select(&config)?)?;
            let result = match factory.connect().await {
                Ok(conn) => conn.table_names().await,
                Err(e) => Err(e),
            };
            factory.close().await?;
            let tables = result?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&tables)?);
            } else {
                for table in tables {
                    println!("{}", table);
                }
            }
        }

        Commands::HealthCheck => {
            let mut sides = Vec::new();
            if let Some(source) = &config.source {
                sides.push(("source", check_connection(source).await));
            }
            sides.push(("target", check_connection(&config.target).await));
            let healthy = sides.iter().all(|(_, r)| r.is_ok());

            if cli.output_json {
                let entries: Vec<_> = sides
                    .iter()
                    .map(|(name, r)| match r {
                        Ok(ms) => json!({ "side": name, "connected": true, "latency_ms": ms }),
                        Err(e) => json!({ "side": name, "connected": false, "error": e.to_string() }),
                    })
                    .collect();
                let out = json!({ "healthy": healthy, "connections": entries });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("Health Check Results:");
                for (name, r) in &sides {
                    match r {
                        Ok(ms) => println!("  {}: OK ({}ms)", name, ms),
                        Err(e) => {
                            println!("  {}: FAILED", name);
                            println!("    Error: {}", e);
                        }
                    }
                }
                println!("\n  Overall: {}", if healthy { "HEALTHY" } else { "UNHEALTHY" });
            }

            if !healthy {
                return Err(SyncError::connection("health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

fn require_source(config: &Config) -> Result<&ConnectionConfig, SyncError> {
    config
        .source
        .as_ref()
        .ok_or_else(|| SyncError::Config("this command needs a source section".to_string()))
}

async fn table_hash(
    factory: &MysqlConnectionFactory,
    table: &str,
    config: &Config,
) -> Result<(u64, String), SyncError> {
    let handle = TableConnection::open(factory, table, config.sync).await?;
    let rows = handle.row_count().await?;
    let hash = handle.fetch_table_hash().await?;
    Ok((rows, hash.to_hex()))
}

async fn diff_tables(
    source_factory: &MysqlConnectionFactory,
    target_factory: &MysqlConnectionFactory,
    table: &str,
    config: &Config,
) -> Result<serde_json::Value, SyncError> {
    let source = TableConnection::open(source_factory, table, config.sync).await?;
    let target = TableConnection::open(target_factory, table, config.sync).await?;
    let diff = target.diff_against(&source).await?;
    Ok(json!({
        "table": table,
        "in_sync": diff.is_in_sync(),
        "unchanged": diff.unchanged.len(),
        "obsolete": diff.obsolete().count(),
        "stale": diff.stale().count(),
        "new": diff.new_keys().count(),
    }))
}

async fn sync_tables(
    source_factory: &MysqlConnectionFactory,
    target_factory: &MysqlConnectionFactory,
    table: &str,
    config: &Config,
    dry_run: bool,
) -> Result<SyncReport, SyncError> {
    let source = TableConnection::open(source_factory, table, config.sync).await?;
    let target = TableConnection::open(target_factory, table, config.sync).await?;
    if dry_run {
        target.dry_run_from_table(&source).await
    } else {
        target.sync_from_table(&source).await
    }
}

async fn check_connection(config: &ConnectionConfig) -> Result<u64, SyncError> {
    let start = Instant::now();
    let factory = MysqlConnectionFactory::new(config)?;
    let result = factory.connect().await.map(|_| start.elapsed().as_millis() as u64);
    if let Err(e) = factory.close().await {
        warn!("{}", e);
    }
    result
}

fn print_report(report: &SyncReport) {
    let status_msg = if report.dry_run { "Dry run completed!" } else { "Sync completed!" };
    println!("\n{}", status_msg);
    println!("  Table: {}", report.table);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Unchanged: {}", report.unchanged);
    println!("  Obsolete: {}", report.obsolete);
    println!("  Stale: {}", report.stale);
    println!("  New: {}", report.new);
    if !report.dry_run {
        println!("  Rows deleted: {}", report.rows_deleted);
        println!("  Rows inserted: {}", report.rows_inserted);
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
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

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format {:?} (expected text or json)", other)),
    }

    Ok(())
}
