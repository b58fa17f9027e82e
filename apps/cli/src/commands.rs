//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use prospector_core::{
    CachedReasoning, Pipeline, Ports, ProgressReporter, RunOutcome, SilentProgress,
    run_and_persist,
};
use prospector_discovery::HunterClient;
use prospector_profiles::RapidApiClient;
use prospector_reasoning::OpenRouterReasoning;
use prospector_shared::{
    AppConfig, PipelineOptions, ReasoningPort, RecordKey, RunConfig, StageId, init_config,
    load_config, resolve_data_dir, validate_api_keys,
};
use prospector_storage::{DB_FILE_NAME, Storage};
use tracing::info;

use crate::output;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Prospector: find and prioritize the right people at a company.
#[derive(Parser)]
#[command(
    name = "prospector",
    version,
    about = "Discover contacts at a company domain, score them for a target role, and enrich the best fits.",
    long_about = None,
)]
pub(crate) struct Cli {
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
    /// Run the pipeline for a company domain.
    Run(RunArgs),

    /// List persisted runs.
    Runs {
        /// Only show runs for this domain.
        #[arg(long)]
        domain: Option<String>,
    },

    /// Print the event log of a persisted run.
    Events {
        /// Run id as printed by `prospector run` or `prospector runs`.
        run_id: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct RunArgs {
    /// Company domain, e.g. example.com.
    #[arg(long)]
    pub domain: String,

    /// Description of the role to prospect for.
    #[arg(long)]
    pub role: String,

    /// Maximum number of records scoring forwards (defaults to config).
    #[arg(long)]
    pub max_results: Option<u32>,

    /// Pages of discovery results to read (defaults to config).
    #[arg(long)]
    pub depth: Option<u32>,

    /// Concurrent enrichment workers (defaults to config).
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Do not write the run to the local database.
    #[arg(long)]
    pub no_persist: bool,

    /// Only output records that were enriched.
    #[arg(long)]
    pub enriched_only: bool,

    /// Print `{events, records}` as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,
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
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "prospector=info",
        1 => "prospector=debug",
        _ => "prospector=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so `--json` output on stdout stays parseable.
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
    match cli.command {
        Command::Run(args) => cmd_run(args).await,
        Command::Runs { domain } => cmd_runs(domain.as_deref()).await,
        Command::Events { run_id } => cmd_events(&run_id).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn db_path(config: &AppConfig) -> Result<PathBuf> {
    Ok(resolve_data_dir(config)?.join(DB_FILE_NAME))
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = load_config()?;
    validate_api_keys(&config)?;

    let run_config = RunConfig::new(
        &args.domain,
        &args.role,
        args.max_results.unwrap_or(config.defaults.max_results),
    )
    .with_search_depth(args.depth.unwrap_or(config.defaults.search_depth))
    .validate()?;

    let mut options = PipelineOptions::from(&config);
    if let Some(concurrency) = args.concurrency {
        options.concurrency = concurrency.max(1);
    }

    // Adapter timeouts match the engine budgets so neither cuts the other short.
    let reasoning = Arc::new(OpenRouterReasoning::from_config(
        &config.openrouter,
        options.reasoning_timeout,
    )?);
    let model_id = reasoning.model().to_string();
    let discovery = Arc::new(HunterClient::from_config(&config.hunter, options.port_timeout)?);
    let enrichment = Arc::new(RapidApiClient::from_config(&config.rapidapi, options.port_timeout)?);

    info!(
        domain = %run_config.domain,
        role = %run_config.target_role,
        max_results = run_config.max_results,
        depth = run_config.depth(),
        concurrency = options.concurrency,
        persist = !args.no_persist,
        "starting run"
    );

    let reporter: Box<dyn ProgressReporter> = if args.json {
        Box::new(SilentProgress)
    } else {
        Box::new(CliProgress::new())
    };

    let (run_id, outcome) = if args.no_persist {
        let ports = Ports {
            discovery,
            enrichment,
            reasoning,
        };
        let outcome = Pipeline::new(ports, options)
            .run(run_config, reporter.as_ref())
            .await?;
        (None, outcome)
    } else {
        let storage = Arc::new(Storage::open(&db_path(&config)?).await?);
        let cached: Arc<dyn ReasoningPort> =
            Arc::new(CachedReasoning::new(reasoning, Arc::clone(&storage), model_id));
        let ports = Ports {
            discovery,
            enrichment,
            reasoning: cached,
        };
        let pipeline = Pipeline::new(ports, options);
        let persisted = run_and_persist(&pipeline, &storage, run_config, reporter.as_ref()).await?;
        (Some(persisted.run_id), persisted.outcome)
    };

    print_outcome(&outcome, run_id.as_deref(), &args)
}

fn print_outcome(outcome: &RunOutcome, run_id: Option<&str>, args: &RunArgs) -> Result<()> {
    let records = if args.enriched_only {
        outcome.enriched_records()
    } else {
        outcome.records.clone()
    };

    if args.json {
        let body = serde_json::json!({
            "events": outcome.events,
            "records": records,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!("  Run finished: {}", outcome.terminal);
    if let Some(run_id) = run_id {
        println!("  Run ID:   {run_id}");
    }
    println!("  Domain:   {}", outcome.config.domain);
    println!(
        "  Stages:   {}",
        outcome
            .stages_run
            .iter()
            .map(StageId::as_str)
            .collect::<Vec<_>>()
            .join(" -> ")
    );
    println!("  Records:  {}", records.len());
    println!("  Failures: {}", outcome.failure_count());
    println!("  Time:     {:.1}s", outcome.elapsed.as_secs_f64());
    println!();
    for line in output::record_table(&records) {
        println!("  {line}");
    }
    println!();
    Ok(())
}

async fn cmd_runs(domain: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let path = db_path(&config)?;
    if !path.exists() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    let storage = Storage::open_readonly(&path).await?;
    let runs = storage.list_runs(domain).await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }
    for line in output::run_table(&runs) {
        println!("{line}");
    }
    Ok(())
}

async fn cmd_events(run_id: &str) -> Result<()> {
    let config = load_config()?;
    let storage = Storage::open_readonly(&db_path(&config)?).await?;

    let run = storage
        .get_run(run_id)
        .await?
        .ok_or_else(|| eyre!("no run with id '{run_id}'"))?;
    let events = storage.list_events(&run.id).await?;

    println!(
        "Run {} ({} / {}): {} events",
        run.id,
        run.domain,
        run.target_role,
        events.len()
    );
    for line in output::event_lines(&events) {
        println!("{line}");
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
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
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: StageId, eligible: usize) {
        let label = match stage {
            StageId::Collection => "Looking up contacts".to_string(),
            StageId::Scoring => format!("Scoring {eligible} contacts"),
            StageId::Enrichment => format!("Enriching {eligible} profiles"),
        };
        self.spinner.set_message(label);
    }

    fn record_done(&self, stage: StageId, key: &RecordKey, current: usize, total: usize) {
        self.spinner
            .set_message(format!("{stage} [{current}/{total}] {key}"));
    }

    fn done(&self, _outcome: &RunOutcome) {
        self.spinner.finish_and_clear();
    }
}
