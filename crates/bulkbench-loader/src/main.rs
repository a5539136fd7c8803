//! bulkbench - parallel bulk-load benchmark

use anyhow::{bail, Context, Result};
use bulkbench_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use bulkbench_loader::config::{AuthMode, LoadConfig};
use bulkbench_loader::db::{self, provision, PgBulkSink, ServerProperties};
use bulkbench_loader::pipeline::{LineSource, LoadPipeline, LoadReport, RowParser};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bulkbench")]
#[command(author, version, about = "Parallel batched bulk-load benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a delimited file and report throughput
    Load(LoadArgs),

    /// Print server properties
    ServerInfo {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// Source file; first line is the header. `.gz` is decompressed.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Target table
    #[arg(short, long)]
    table: Option<String>,

    /// Rows per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Connections opened up front
    #[arg(long)]
    min_workers: Option<usize>,

    /// Maximum concurrently running batches
    #[arg(long)]
    max_workers: Option<usize>,

    /// Unlogged table and lock-free bulk mode
    #[arg(long)]
    in_memory: bool,

    /// Create the database if it does not exist
    #[arg(long)]
    create_database: bool,

    /// Create the table before loading
    #[arg(long)]
    create_table: bool,

    /// DDL file used by --create-table instead of deriving from the header
    #[arg(long)]
    schema_file: Option<PathBuf>,

    /// Drop the table first (with --create-table)
    #[arg(long)]
    drop_existing: bool,

    /// Field delimiter
    #[arg(long, default_value_t = '\t')]
    delimiter: char,

    /// Statement timeout for pooled batches in seconds, 0 for none
    #[arg(long)]
    session_timeout: Option<u64>,

    /// List failed batches after the report
    #[arg(long)]
    show_failures: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthKind {
    Password,
    Trust,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long, env = "BULKBENCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Authentication mode; defaults to password when one is given
    #[arg(long, value_enum)]
    auth: Option<AuthKind>,

    /// Seconds to wait for a connection
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// COPY send buffer in bytes; defaults to four server pages
    #[arg(long)]
    packet_size: Option<usize>,
}

impl ConnectionArgs {
    fn apply(self, config: &mut LoadConfig) -> Result<()> {
        let conn = &mut config.connection;
        if let Some(host) = self.host {
            conn.host = host;
        }
        if let Some(port) = self.port {
            conn.port = port;
        }
        if let Some(database) = self.database {
            conn.database = database;
        }
        if let Some(timeout) = self.connect_timeout {
            conn.connect_timeout_secs = timeout;
        }
        if self.packet_size.is_some() {
            conn.packet_size = self.packet_size;
        }

        let user = self.user.unwrap_or_else(|| conn.auth.user().to_string());
        let password = self.password.or_else(|| conn.auth.password().map(str::to_string));
        conn.auth = match (self.auth, password) {
            (Some(AuthKind::Trust), _) => AuthMode::Trust { user },
            (_, Some(password)) => AuthMode::Password { user, password },
            (Some(AuthKind::Password), None) => bail!("--auth password requires --password"),
            (None, None) => AuthMode::Trust { user },
        };
        Ok(())
    }
}

impl LoadArgs {
    fn into_config(self) -> Result<(LoadConfig, bool, bool)> {
        let mut config = LoadConfig::from_env();
        if let Some(file) = self.file {
            config.source = file;
        }
        if let Some(table) = self.table {
            config.table = table;
        }
        if let Some(n) = self.batch_size {
            config.batch_size = n;
        }
        if let Some(n) = self.min_workers {
            config.min_workers = n;
        }
        if let Some(n) = self.max_workers {
            config.max_workers = n;
        }
        if let Some(secs) = self.session_timeout {
            config.session_timeout_secs = secs;
        }
        config.in_memory |= self.in_memory;
        config.create_database = self.create_database;
        config.create_table = self.create_table;
        config.drop_existing = self.drop_existing;
        config.schema_file = self.schema_file;
        config.delimiter = self.delimiter;
        self.connection.apply(&mut config)?;

        config.validate().context("Invalid configuration")?;
        Ok((config, self.show_failures, self.json))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Console logs go to stderr, stdout carries the report
    let log_config = LogConfig::builder()
        .level(log_level)
        .output(LogOutput::Console)
        .log_file_prefix("bulkbench")
        .filter_directives("sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    match cli.command {
        Command::Load(args) => {
            let (config, show_failures, json) = args.into_config()?;
            let report = load(&config).await?;
            print_report(&report, show_failures, json)?;
        },
        Command::ServerInfo { connection, json } => {
            let mut config = LoadConfig::from_env();
            connection.apply(&mut config)?;
            let pool = db::create_pool(&config.connection, 1, 1).await?;
            let properties = ServerProperties::discover(&pool).await;
            pool.close().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&properties)?);
            } else {
                println!("Server version:  {}", properties.version);
                println!(
                    "Data directory:  {}",
                    properties.data_directory.as_deref().unwrap_or("(not visible)")
                );
                println!("Block size:      {}", properties.block_size);
            }
        },
    }

    Ok(())
}

async fn load(config: &LoadConfig) -> Result<LoadReport> {
    if config.create_database {
        provision::ensure_database(&config.connection)
            .await
            .context("Failed to provision database")?;
    }

    let min_connections = u32::try_from(config.min_workers).unwrap_or(u32::MAX);
    let pool = db::create_pool(&config.connection, min_connections, config.max_connections())
        .await?;

    let properties = ServerProperties::discover(&pool).await;
    info!(
        version = %properties.version,
        data_directory = properties.data_directory.as_deref().unwrap_or("-"),
        block_size = properties.block_size,
        "Connected"
    );

    if config.create_table {
        let ddl = match &config.schema_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read schema file {}", path.display()))?,
            None => {
                let columns = read_header(config)?;
                provision::table_ddl(&config.table, &columns, config.in_memory)?
            },
        };
        provision::create_table(&pool, &config.table, &ddl, config.drop_existing)
            .await
            .context("Failed to provision table")?;
    }

    let packet_size = config
        .connection
        .packet_size
        .unwrap_or_else(|| properties.preferred_packet_size());
    let sink = Arc::new(PgBulkSink::new(pool.clone(), packet_size));

    let source = LineSource::open(&config.source)?;
    let pipeline = LoadPipeline::new(config.pipeline(), config.table.clone(), sink)
        .with_progress(spinner());

    let report = pipeline.run(source).await.context("Load failed")?;
    pool.close().await;

    if report.has_failures() {
        warn!(
            failed = report.failed().count(),
            "Some batches failed; rerun with --show-failures for details"
        );
    }
    Ok(report)
}

fn read_header(config: &LoadConfig) -> Result<Vec<String>> {
    let source = LineSource::open(&config.source)?;
    let header = match source.lines().next() {
        Some(line) => line?,
        None => bail!("{} has no header line", config.source.display()),
    };
    Ok(RowParser::new(config.delimiter).parse_header(&header))
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} {human_pos} rows read [{elapsed}]")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_report(report: &LoadReport, show_failures: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report.summary())?);
        return Ok(());
    }

    print!("{}", report);
    if show_failures {
        for outcome in report.failed() {
            println!(
                "Batch {} ({} rows{}): {}",
                outcome.batch,
                outcome.rows,
                if outcome.trailing { ", trailing" } else { "" },
                outcome.error().map(ToString::to_string).unwrap_or_default()
            );
        }
    }
    Ok(())
}
