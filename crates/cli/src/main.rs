//! perf-dashboard CLI - Query benchmark runs from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use perf_dashboard_core::{
    AnnotationRequest, ChartRequest, ComparisonFilter, Engine, EngineConfig, RunChartRequest,
    RunFilterMode, RunRecord, SqliteRunStore, VerticalAxis,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

mod render;

/// perf-dashboard: compare benchmark runs across SDKs, versions and clusters
#[derive(Parser, Debug)]
#[command(name = "perf-dashboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQLite database holding the runs
    #[arg(
        short,
        long,
        global = true,
        env = "PERF_DASHBOARD_DB",
        default_value = "perf-dashboard.db"
    )]
    database: PathBuf,

    /// Maximum number of pooled database connections
    #[arg(long, global = true, default_value_t = EngineConfig::default().max_pool_size)]
    pool_size: u32,

    /// SDK version prefix marking code-review builds
    #[arg(long, global = true, default_value = perf_dashboard_core::run_filter::DEFAULT_GERRIT_PREFIX)]
    gerrit_prefix: String,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the database schema
    Init,
    /// Load runs from a JSON file
    Import(ImportArgs),
    /// Evaluate a chart request
    Chart(ChartArgs),
    /// Chart a single run
    Run(RunArgs),
    /// List runs matching a filter
    Runs(RunsArgs),
    /// Show known cluster versions and SDKs
    Versions(VersionsArgs),
}

#[derive(Parser, Debug)]
struct ImportArgs {
    /// A run record or an array of run records
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Json,
    Text,
}

#[derive(Parser, Debug)]
struct ChartArgs {
    #[arg(short, long, value_name = "FILE")]
    request: PathBuf,

    #[arg(long, value_enum, default_value = "json")]
    format: Format,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[arg(long)]
    id: String,

    /// buckets:<column>, metric:<name>, errors or metrics-all
    #[arg(long = "axis", value_parser = render::parse_axis, required = true)]
    axes: Vec<VerticalAxis>,

    #[arg(long, default_value = "0")]
    trimming_seconds: i64,

    #[arg(long)]
    bucketise_seconds: Option<i64>,

    /// Overlay run events of these types; pass without a value for every type
    #[arg(long, num_args = 0.., value_delimiter = ',')]
    events: Option<Vec<String>>,

    #[arg(long, value_enum, default_value = "json")]
    format: Format,
}

#[derive(Parser, Debug)]
struct RunsArgs {
    /// Comparison filter as a JSON file; every run matches when omitted
    #[arg(long, value_name = "FILE")]
    filter: Option<PathBuf>,

    #[arg(long, value_parser = render::parse_mode, default_value = "all")]
    mode: RunFilterMode,

    #[arg(long, default_value = "false")]
    exclude_snapshots: bool,

    #[arg(long, default_value = "false")]
    exclude_gerrit: bool,

    #[arg(long, value_enum, default_value = "text")]
    format: Format,
}

#[derive(Parser, Debug)]
struct VersionsArgs {
    #[arg(long, value_enum, default_value = "text")]
    format: Format,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    Many(Vec<RunRecord>),
    One(Box<RunRecord>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = EngineConfig {
        max_pool_size: cli.pool_size,
        gerrit_prefix: cli.gerrit_prefix.clone(),
    };
    let store = SqliteRunStore::open(&cli.database, config.max_pool_size)
        .with_context(|| format!("Failed to open database: {:?}", cli.database))?;

    match cli.command {
        Commands::Init => init_command(&store),
        Commands::Import(args) => import_command(&store, args),
        Commands::Chart(args) => chart_command(Engine::new(store, config), args).await,
        Commands::Run(args) => run_command(Engine::new(store, config), args).await,
        Commands::Runs(args) => runs_command(Engine::new(store, config), args).await,
        Commands::Versions(args) => versions_command(Engine::new(store, config), args).await,
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse JSON from {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_command(store: &SqliteRunStore) -> Result<()> {
    store.init_schema().context("Failed to create schema")?;
    info!("Database ready");
    Ok(())
}

fn import_command(store: &SqliteRunStore, args: ImportArgs) -> Result<()> {
    let records = match read_json::<ImportFile>(&args.file)? {
        ImportFile::Many(records) => records,
        ImportFile::One(record) => vec![*record],
    };
    debug!("Read {} run records from {:?}", records.len(), args.file);

    store.init_schema().context("Failed to create schema")?;
    let imported = store
        .insert_runs(&records)
        .context("Failed to import runs")?;

    info!("Imported {} runs", imported);
    Ok(())
}

async fn chart_command(engine: Engine<SqliteRunStore>, args: ChartArgs) -> Result<()> {
    let request: ChartRequest = read_json(&args.request)?;
    let response = engine
        .chart(&request)
        .await
        .context("Failed to evaluate chart request")?;

    match args.format {
        Format::Json => print_json(&response),
        Format::Text => {
            print!("{}", render::chart(&response));
            Ok(())
        }
    }
}

async fn run_command(engine: Engine<SqliteRunStore>, args: RunArgs) -> Result<()> {
    let mut request = RunChartRequest::new(args.id, args.axes);
    request.trimming_seconds = args.trimming_seconds;
    request.bucketise_seconds = args.bucketise_seconds;
    if let Some(event_types) = args.events {
        request.annotations = vec![AnnotationRequest::RunEvents { event_types }];
    }

    let chart = engine
        .run_chart(&request)
        .await
        .with_context(|| format!("Failed to chart run {}", request.run_id))?;

    match args.format {
        Format::Json => print_json(&chart),
        Format::Text => {
            print!("{}", render::line_chart(&chart));
            Ok(())
        }
    }
}

async fn runs_command(engine: Engine<SqliteRunStore>, args: RunsArgs) -> Result<()> {
    let filter = match &args.filter {
        Some(path) => read_json(path)?,
        None => ComparisonFilter::unconstrained(),
    };

    let runs = engine
        .runs(&filter, args.mode, args.exclude_snapshots, args.exclude_gerrit)
        .await
        .context("Failed to list runs")?;
    info!("{} matching runs", runs.len());

    match args.format {
        Format::Json => print_json(&runs),
        Format::Text => {
            print!("{}", render::runs(&runs));
            Ok(())
        }
    }
}

async fn versions_command(engine: Engine<SqliteRunStore>, args: VersionsArgs) -> Result<()> {
    let cluster_versions = engine
        .cluster_versions()
        .await
        .context("Failed to load cluster versions")?;
    let sdks = engine.sdks().await.context("Failed to load SDKs")?;

    match args.format {
        Format::Json => print_json(&serde_json::json!({
            "clusterVersions": cluster_versions.as_ref(),
            "sdks": sdks.as_ref(),
        })),
        Format::Text => {
            print!("{}", render::reference(&cluster_versions, &sdks));
            Ok(())
        }
    }
}
