//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use recallbrief_core::{
    EnrichmentOrchestrator, EnrichmentOutcome, HttpRecordSource, PdfRenderer, ProgressReporter,
    RecordSource, ReportWriter, StaticRecordSource, WorkflowClient, WorkflowSettings,
};
use recallbrief_fetcher::{ArtifactLayout, ArtifactSweeper};
use recallbrief_shared::{AppConfig, EnrichRequest, init_config, load_config, load_config_from};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// RecallBrief: enrich food-recall notices into report rows.
#[derive(Parser, Debug)]
#[command(
    name = "recallbrief",
    version,
    about = "Enrich food-recall records with documents, remote workflows and per-source rules.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.recallbrief/recallbrief.toml.
    #[arg(long, global = true, env = "RECALLBRIEF_CONFIG")]
    pub config: Option<PathBuf>,

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
#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Enrich the records named in a request file and write a report.
    Enrich {
        /// JSON request: { "globalIds": [...], "imagesByGlobalId": {...} }.
        #[arg(long)]
        request: PathBuf,

        /// Serve records from this JSON file instead of the lookup endpoint.
        #[arg(long)]
        records: Option<PathBuf>,

        /// User id forwarded to the remote service (overrides the request).
        #[arg(long)]
        user: Option<String>,
    },

    /// Delete downloaded artifacts older than the retention window.
    Clean {
        /// Retention in hours (defaults to [cleanup] retention_hours).
        #[arg(long)]
        hours: Option<u64>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "recallbrief=info",
        1 => "recallbrief=debug",
        _ => "recallbrief=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Enrich {
            request,
            records,
            user,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_enrich(&config, &request, records.as_deref(), user).await
        }
        Command::Clean { hours } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_clean(&config, hours).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// enrich
// ---------------------------------------------------------------------------

async fn cmd_enrich(
    config: &AppConfig,
    request_path: &Path,
    records_path: Option<&Path>,
    user: Option<String>,
) -> Result<()> {
    let content = std::fs::read_to_string(request_path)
        .wrap_err_with(|| format!("cannot read request file '{}'", request_path.display()))?;
    let mut request: EnrichRequest = serde_json::from_str(&content)
        .wrap_err_with(|| format!("invalid request file '{}'", request_path.display()))?;
    if user.is_some() {
        request.user_id = user;
    }

    info!(
        request = %request_path.display(),
        ids = request.global_ids.len(),
        "enriching records"
    );

    match records_path {
        Some(path) => {
            let source = StaticRecordSource::from_file(path)?;
            enrich_with(config, &request, source).await
        }
        None => {
            if config.workflow.records_url.is_empty() {
                return Err(eyre!(
                    "no record source: pass --records <file> or set [workflow] records_url"
                ));
            }
            let source = HttpRecordSource::new(
                &config.workflow.records_url,
                &config.workflow.records_doc_id,
                Duration::from_secs(config.fetch.timeout_secs),
            )?;
            enrich_with(config, &request, source).await
        }
    }
}

async fn enrich_with<R: RecordSource>(
    config: &AppConfig,
    request: &EnrichRequest,
    records: R,
) -> Result<()> {
    let service = WorkflowClient::new(WorkflowSettings::from_config(config)?)?;
    let renderer = PdfRenderer::from_config(config);
    let orchestrator = EnrichmentOrchestrator::new(config, service, records, renderer)?;

    let reporter = CliProgress::new();
    let outcome = orchestrator.run(request, &reporter).await?;

    let path = ReportWriter::new(&config.paths.output_dir)
        .write(&outcome.records)
        .await?;

    println!();
    println!("  Enrichment complete!");
    println!("  Records:        {}", outcome.records.len());
    println!("  Fetch failures: {}", outcome.fetch_failures);
    println!("  Chunk failures: {}", outcome.chunk_failures);
    if !outcome.degraded_sources.is_empty() {
        println!("  Degraded:       {}", outcome.degraded_sources.join(", "));
    }
    println!("  Report:         {}", path.display());
    println!("  Time:           {:.1}s", outcome.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn fetched(&self, materialized: usize, failed: usize) {
        self.spinner
            .set_message(format!("Downloaded {materialized} artifacts ({failed} failed)"));
    }

    fn done(&self, _outcome: &EnrichmentOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// clean
// ---------------------------------------------------------------------------

async fn cmd_clean(config: &AppConfig, hours: Option<u64>) -> Result<()> {
    let hours = hours.unwrap_or(config.cleanup.retention_hours);
    let layout = ArtifactLayout::new(&config.paths.data_dir);
    let sweeper = ArtifactSweeper::new(
        layout.managed_dirs(),
        config.cleanup.suffixes.clone(),
        Duration::from_secs(hours.saturating_mul(3600)),
    );

    info!(hours, data_dir = %config.paths.data_dir, "cleaning artifacts");
    let report = sweeper.sweep().await;

    println!("Removed {} file(s) older than {hours}h", report.removed);
    if !report.failures.is_empty() {
        println!("Could not remove {} file(s):", report.failures.len());
        for (path, error) in &report.failures {
            println!("  {}: {error}", path.display());
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
