/*!
logvault CLI - run and inspect CloudWatch Logs archival.

Every option can also be given through the environment variables read by the
scheduled invocation, so the same binary works as a cron job and by hand.
*/

use anyhow::{bail, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use logvault_core::config::{
    parse_retention_days, parse_sources, ENV_DESTINATION_BUCKET, ENV_POLL_TIMEOUT_SECS,
    ENV_REGION, ENV_RETENTION_DAYS, ENV_SOURCES,
};
use logvault_core::observability::{init_observability, LogFormat};
use logvault_core::{
    compute_window, destination_prefix, discover_sources, handle_invocation, AwsEnvironment,
    CloudWatchLogsCatalog, Clock, ExportOrchestrator, InvocationContext, InvocationResult,
    LogCatalog, RunConfig, S3BucketStore, SystemClock, TaskId,
};
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "logvault")]
#[command(about = "Archive CloudWatch Logs groups to S3 with export tasks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Run configuration. Values stay raw strings so that parsing and defaults
/// are the same as for the environment-driven invocation.
#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Destination bucket name or s3:// URI
    #[arg(long, global = true, env = ENV_DESTINATION_BUCKET)]
    bucket: Option<String>,

    /// Comma separated log group names
    #[arg(long, global = true, env = ENV_SOURCES)]
    sources: Option<String>,

    /// Age in days of the end of the exported window
    #[arg(long, global = true, env = ENV_RETENTION_DAYS)]
    retention_days: Option<String>,

    /// Wait budget per export task, in seconds
    #[arg(long, global = true, env = ENV_POLL_TIMEOUT_SECS)]
    timeout_secs: Option<String>,

    /// AWS region
    #[arg(long, global = true, env = ENV_REGION)]
    region: Option<String>,
}

impl ConfigArgs {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            ENV_DESTINATION_BUCKET => self.bucket.clone(),
            ENV_SOURCES => self.sources.clone(),
            ENV_RETENTION_DAYS => self.retention_days.clone(),
            ENV_POLL_TIMEOUT_SECS => self.timeout_secs.clone(),
            ENV_REGION => self.region.clone(),
            _ => None,
        }
    }

    fn run_config(&self) -> logvault_core::Result<RunConfig> {
        RunConfig::from_lookup(|key| self.lookup(key))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export every configured log group once
    Run {
        /// Pretty-print the JSON result
        #[arg(long)]
        pretty: bool,

        /// Exit non-zero when any single source failed
        #[arg(long)]
        strict: bool,
    },
    /// List the configured log groups that exist in the account
    Sources,
    /// Show the window and destination prefix each source would be exported to
    Window {
        /// Only show this log group
        #[arg(long)]
        source: Option<String>,
    },
    /// Show the status of an export task
    Status {
        /// Export task id
        task_id: String,
    },
}

#[derive(Tabled)]
struct SourceRow {
    #[tabled(rename = "Log Group")]
    name: String,
    #[tabled(rename = "Stored")]
    stored: String,
    #[tabled(rename = "Created")]
    created: String,
}

#[derive(Tabled)]
struct WindowRow {
    #[tabled(rename = "Log Group")]
    source: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Prefix")]
    prefix: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs)?;

    match &cli.command {
        Commands::Run { pretty, strict } => run_exports(&cli.config, *pretty, *strict),
        Commands::Sources => list_sources(&cli.config),
        Commands::Window { source } => show_windows(&cli.config, source.as_deref()),
        Commands::Status { task_id } => show_status(&cli.config, task_id),
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<(), anyhow::Error> {
    if verbose && std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "logvault=debug");
    }
    let format = if json { LogFormat::Json } else { LogFormat::Text };
    init_observability(format)?;
    Ok(())
}

fn aws_environment(config: &ConfigArgs) -> Result<AwsEnvironment, anyhow::Error> {
    AwsEnvironment::load(config.region.as_deref()).context("Failed to load AWS configuration")
}

fn run_exports(config: &ConfigArgs, pretty: bool, strict: bool) -> Result<(), anyhow::Error> {
    let context = InvocationContext::generate();
    let payload = json!({ "source": "logvault-cli", "time": Utc::now().to_rfc3339() });

    let result = invoke(config, AwsEnvironment::load, |run_config, env| {
        let orchestrator = ExportOrchestrator::with_defaults(
            CloudWatchLogsCatalog::new(env),
            S3BucketStore::new(env),
        );
        handle_invocation(&payload, &context, Ok(run_config), &orchestrator)
    });

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{output}");

    if !result.status {
        bail!(
            "{}",
            result
                .error_message
                .as_deref()
                .unwrap_or("Export run failed")
        );
    }

    let failed: Vec<&str> = result.failed_sources().map(|o| o.source.as_str()).collect();
    if strict && !failed.is_empty() {
        bail!("Export failed for {}", failed.join(", "));
    }
    Ok(())
}

/// Build the run configuration and AWS environment, then hand both to
/// `export`. Failures of either step become a failed [`InvocationResult`].
fn invoke<E, L, X>(config: &ConfigArgs, load: L, export: X) -> InvocationResult
where
    L: FnOnce(Option<&str>) -> logvault_core::Result<E>,
    X: FnOnce(RunConfig, &E) -> InvocationResult,
{
    let run_config = match config.run_config() {
        Ok(run_config) => run_config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return InvocationResult::failed(&e);
        }
    };

    match load(run_config.region.as_deref()) {
        Ok(env) => export(run_config, &env),
        Err(e) => {
            error!(error = %e, "Failed to load AWS configuration");
            InvocationResult::failed(&e)
        }
    }
}

fn list_sources(config: &ConfigArgs) -> Result<(), anyhow::Error> {
    let wanted = config
        .sources
        .as_deref()
        .map(parse_sources)
        .unwrap_or_default();
    if wanted.is_empty() {
        bail!("No log groups given (use --sources or {ENV_SOURCES})");
    }

    let env = aws_environment(config)?;
    let catalog = CloudWatchLogsCatalog::new(&env);
    let sources = discover_sources(&catalog, &wanted)?;
    info!(count = sources.len(), "Found log groups");

    let rows: Vec<SourceRow> = sources
        .into_iter()
        .map(|source| SourceRow {
            stored: source
                .stored_bytes
                .map(|b| format_size(b.max(0) as u64))
                .unwrap_or_else(|| "-".to_string()),
            created: source
                .creation_time
                .map(format_timestamp_millis)
                .unwrap_or_else(|| "-".to_string()),
            name: source.name,
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

fn show_windows(config: &ConfigArgs, only: Option<&str>) -> Result<(), anyhow::Error> {
    let retention_days = parse_retention_days(config.retention_days.as_deref());
    let sources = match only {
        Some(source) => vec![source.to_string()],
        None => config
            .sources
            .as_deref()
            .map(parse_sources)
            .unwrap_or_default(),
    };
    if sources.is_empty() {
        bail!("No log groups given (use --source, --sources or {ENV_SOURCES})");
    }

    let window = compute_window(retention_days, SystemClock.now());
    let rows: Vec<WindowRow> = sources
        .iter()
        .map(|source| WindowRow {
            source: source.clone(),
            from: format_time(window.from_time()),
            to: format_time(window.to_time()),
            prefix: destination_prefix(source, &window),
        })
        .collect();

    println!("Retention: {retention_days} days");
    println!("{}", Table::new(rows));
    Ok(())
}

fn show_status(config: &ConfigArgs, task_id: &str) -> Result<(), anyhow::Error> {
    let env = aws_environment(config)?;
    let catalog = CloudWatchLogsCatalog::new(&env);
    let status = catalog
        .export_status(&TaskId::from(task_id))
        .with_context(|| format!("Unable to read status of task {task_id}"))?;

    println!("Export Task:");
    println!("  ID: {}", status.task_id);
    println!("  Status: {}", status.code);
    if let Some(message) = &status.message {
        println!("  Message: {message}");
    }
    if let Some(group) = status.raw["logGroupName"].as_str() {
        println!("  Log Group: {group}");
    }
    if let (Some(bucket), Some(prefix)) = (
        status.raw["destination"].as_str(),
        status.raw["destinationPrefix"].as_str(),
    ) {
        println!("  Destination: s3://{bucket}/{prefix}");
    }
    if let Some(created) = status.raw["executionInfo"]["creationTime"].as_i64() {
        println!("  Created: {}", format_timestamp_millis(created));
    }
    if let Some(completed) = status.raw["executionInfo"]["completionTime"].as_i64() {
        println!("  Completed: {}", format_timestamp_millis(completed));
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn format_timestamp_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(format_time)
        .unwrap_or_else(|| millis.to_string())
}
