//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use enquete_core::{JOB_ID, Pipeline, RunObserver, RunState, RunSummary, Scheduler, WeeklySchedule};
use enquete_shared::{AppConfig, NewsRecord, init_config, load_config, load_config_from};
use enquete_storage::{NewsRepository, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// enquete: weekly news headline to poll question.
#[derive(Parser)]
#[command(
    name = "enquete",
    version,
    about = "Turn the latest municipal news headline into a yes/no poll question.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.enquete/enquete.toml).
    #[arg(long, global = true, env = "ENQUETE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline once and print the summary.
    Run,

    /// Run the pipeline on the configured weekly schedule until Ctrl-C.
    Serve,

    /// List stored records, newest first.
    List {
        /// Maximum number of records.
        #[arg(short, long, default_value = "10")]
        limit: u32,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show one record as JSON.
    Show {
        /// Record id.
        id: i64,
    },

    /// Delete one record.
    Delete {
        /// Record id.
        id: i64,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Config and tracing setup
// ---------------------------------------------------------------------------

/// Load the config file, overlay the environment, and validate.
pub(crate) fn resolve_config(cli: &Cli) -> Result<AppConfig> {
    if matches!(
        cli.command,
        Command::Config {
            action: ConfigAction::Init
        }
    ) {
        return Ok(AppConfig::default());
    }

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    config.apply_env_overrides(env_lookup);
    config.validate()?;
    Ok(config)
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Initialize tracing based on CLI flags and the configured level.
pub(crate) fn init_tracing(cli: &Cli, log_level: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => format!("enquete={log_level}"),
        1 => "enquete=debug".to_string(),
        _ => "enquete=trace".to_string(),
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Serve => cmd_serve(&config).await,
        Command::List { limit, json } => cmd_list(&config, limit, json).await,
        Command::Show { id } => cmd_show(&config, id).await,
        Command::Delete { id } => cmd_delete(&config, id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_deref()),
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = config.storage.resolved_path()?;
    Ok(Storage::open(&path).await?)
}

async fn open_storage_readonly(config: &AppConfig) -> Result<Storage> {
    let path = config.storage.resolved_path()?;
    Ok(Storage::open_readonly(&path).await?)
}

// ---------------------------------------------------------------------------
// Pipeline commands
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig) -> Result<()> {
    let storage = open_storage(config).await?;
    let pipeline = Pipeline::from_config(config, Arc::new(storage), env_lookup)?;

    info!(portal = config.portal.url.as_str(), "manual run");

    let progress = CliProgress::new();
    let summary = pipeline
        .run_with(&progress)
        .await
        .inspect_err(|_| progress.spinner.finish_and_clear())?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn cmd_serve(config: &AppConfig) -> Result<()> {
    let schedule = WeeklySchedule::from_config(&config.schedule)?;
    let storage = open_storage(config).await?;
    let pipeline = Pipeline::from_config(config, Arc::new(storage), env_lookup)?;

    let mut scheduler = Scheduler::new();
    scheduler.register(JOB_ID, schedule, Arc::new(pipeline));
    println!("Scheduled {JOB_ID}: {schedule}. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for Ctrl-C")?;

    info!(jobs = scheduler.job_count(), "shutting down scheduler");
    scheduler.shutdown();
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI run observer using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl RunObserver for CliProgress {
    fn transition(&self, state: RunState) {
        self.spinner.set_message(state.label());
    }

    fn finished(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Record commands
// ---------------------------------------------------------------------------

async fn cmd_list(config: &AppConfig, limit: u32, json: bool) -> Result<()> {
    let storage = open_storage_readonly(config).await?;
    let records = storage.list(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records yet.");
        return Ok(());
    }

    for record in &records {
        println!("{}", list_line(record));
    }
    Ok(())
}

fn list_line(record: &NewsRecord) -> String {
    let status = match (&record.question_title, &record.external_response) {
        (_, Some(_)) => "sent",
        (Some(_), None) => "rewritten",
        (None, None) => "stored",
    };
    let text = record
        .question_title
        .as_deref()
        .unwrap_or(&record.source_title);
    format!(
        "{:>6}  {}  {:<9}  {}",
        record.id,
        record.fetched_at.format("%Y-%m-%d %H:%M"),
        status,
        text
    )
}

async fn cmd_show(config: &AppConfig, id: i64) -> Result<()> {
    let storage = open_storage_readonly(config).await?;
    let record = storage
        .get(id)
        .await?
        .ok_or_else(|| eyre!("no record with id {id}"))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn cmd_delete(config: &AppConfig, id: i64) -> Result<()> {
    let storage = open_storage(config).await?;
    let record = storage
        .get(id)
        .await?
        .ok_or_else(|| eyre!("no record with id {id}"))?;
    storage.delete(&record).await?;
    info!(record_id = id, "record deleted");
    println!("Deleted record {id}.");
    Ok(())
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init(path: Option<&Path>) -> Result<()> {
    let path = match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, toml::to_string_pretty(&AppConfig::default())?)?;
            path.to_path_buf()
        }
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
