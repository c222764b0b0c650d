//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use prospector_core::{
    BatchProgress, BatchSummary, ConfidenceScorer, EnrichmentResult, EntityStatus, Orchestrator,
};
use prospector_providers::{KNOWN_PROVIDERS, ProviderFactory};
use prospector_shared::{
    AppConfig, BudgetScope, Cents, EngineConfig, Entity, SearchParams, ValidationResult,
    init_config, load_config, validate_api_key,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Prospector: validate and score business leads against external providers.
#[derive(Parser)]
#[command(
    name = "prospector",
    version,
    about = "Validate and score business leads against registry, email and website providers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Budget ledger scope.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum ScopeArg {
    PerEntity,
    PerBatch,
}

impl From<ScopeArg> for BudgetScope {
    fn from(scope: ScopeArg) -> Self {
        match scope {
            ScopeArg::PerEntity => BudgetScope::PerEntity,
            ScopeArg::PerBatch => BudgetScope::PerBatch,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run every relevant provider against the entities in a JSON file.
    Enrich {
        /// JSON array of entities.
        file: PathBuf,

        /// Two-letter state used when an entity has none.
        #[arg(short, long)]
        state: Option<String>,

        /// Budget ceiling in dollars (per entity or per batch, see --scope).
        #[arg(short, long)]
        budget: Option<f64>,

        /// Whether the budget covers each entity or the whole batch.
        #[arg(long)]
        scope: Option<ScopeArg>,

        /// Ask registry providers for live rather than cached upstream data.
        #[arg(long)]
        live: bool,

        /// Write the full results as JSON to this path.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Score entities offline, without calling any provider.
    Score {
        /// JSON array of entities.
        file: PathBuf,
    },

    /// List configured providers and whether their API keys are set.
    Providers,

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
        Command::Enrich {
            file,
            state,
            budget,
            scope,
            live,
            output,
        } => {
            let options = EnrichOptions {
                state,
                budget,
                scope,
                live,
                output,
            };
            cmd_enrich(&file, options).await
        }
        Command::Score { file } => cmd_score(&file),
        Command::Providers => cmd_providers(),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

struct EnrichOptions {
    state: Option<String>,
    budget: Option<f64>,
    scope: Option<ScopeArg>,
    live: bool,
    output: Option<PathBuf>,
}

async fn cmd_enrich(file: &Path, options: EnrichOptions) -> Result<()> {
    let config = load_config()?;
    let entities = read_entities(file)?;

    let budget_cents = match options.budget {
        Some(dollars) if !dollars.is_finite() || dollars < 0.0 => {
            return Err(eyre!("invalid budget '{dollars}': expected a non-negative amount"));
        }
        Some(dollars) => Some(Cents::from_dollars(dollars)),
        None => None,
    };

    let mut engine_config = EngineConfig::from(&config);
    if let Some(scope) = options.scope {
        engine_config.budget_scope = scope.into();
    }

    let providers = ProviderFactory::from_config(&config)?;
    if providers.is_empty() {
        return Err(eyre!(
            "no providers are enabled; run `prospector providers` to check configuration"
        ));
    }

    let mut engine = Orchestrator::new(engine_config);
    engine.register_all(providers)?;

    let params = SearchParams {
        state: options.state,
        budget_cents,
        live_data: options.live,
        ..SearchParams::default()
    };

    info!(
        file = %file.display(),
        entities = entities.len(),
        providers = ?engine.provider_names(),
        "enriching entities"
    );

    let reporter = CliProgress::new();
    let (results, summary) = engine
        .validate_batch_with_summary(&entities, &params, &reporter)
        .await;

    println!();
    println!("  {:<36} {:>5}  {:<10} {:>8}", "Entity", "Score", "Status", "Cost");
    for result in &results {
        println!(
            "  {:<36} {:>5}  {:<10} {:>8}",
            truncate(result.entity.display_name(), 36),
            result.confidence_score,
            status_label(result.status),
            result.total_cost.to_string(),
        );
    }

    let stats = engine.get_stats();
    println!();
    println!("  Validated: {}", summary.validated);
    println!("  Skipped:   {}", summary.skipped);
    println!("  Failed:    {}", summary.failed);
    println!("  Cost:      {}", summary.total_cost);
    println!("  Cache:     {:.1}% hit rate", stats.cache_hit_rate);
    println!("  Time:      {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();

    if let Some(path) = options.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(&path, json)
            .map_err(|e| eyre!("cannot write results to '{}': {e}", path.display()))?;
        println!("  Results written to {}", path.display());
    }

    Ok(())
}

fn cmd_score(file: &Path) -> Result<()> {
    let entities = read_entities(file)?;
    let scorer = ConfidenceScorer::new();

    for entity in &entities {
        let breakdown = scorer.score(entity, std::iter::empty::<&ValidationResult>());
        println!(
            "{}: {} ({}{})",
            entity.display_name(),
            breakdown.total,
            breakdown.tier.as_str(),
            if breakdown.qualified { ", qualified" } else { "" },
        );
        println!(
            "  name {}  address {}  phone {}  website {}  source {}",
            breakdown.name, breakdown.address, breakdown.phone, breakdown.website, breakdown.source
        );
        for disqualification in &breakdown.disqualifications {
            println!(
                "  ! {}: {}",
                disqualification.component, disqualification.reason
            );
        }
    }

    Ok(())
}

fn cmd_providers() -> Result<()> {
    let config: AppConfig = load_config()?;

    println!("  {:<20} {:<8} {:>6}  {:<10}", "Provider", "Enabled", "Cost", "API key");
    for (name, entry) in &config.providers {
        let key = if !KNOWN_PROVIDERS.contains(&name.as_str()) {
            "unknown"
        } else {
            match validate_api_key(&config, name) {
                Ok(Some(_)) => "set",
                Ok(None) => "not needed",
                Err(_) => "missing",
            }
        };
        println!(
            "  {:<20} {:<8} {:>6}  {:<10}",
            name,
            if entry.enabled { "yes" } else { "no" },
            Cents(entry.cost_cents).to_string(),
            key,
        );
    }

    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_entities(path: &Path) -> Result<Vec<Entity>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| eyre!("cannot read '{}': {e}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|e| eyre!("'{}' is not a JSON array of entities: {e}", path.display()))
}

fn status_label(status: EntityStatus) -> &'static str {
    match status {
        EntityStatus::Validated => "validated",
        EntityStatus::Skipped => "skipped",
        EntityStatus::Errored => "errored",
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Batch progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .expect("valid progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl BatchProgress for CliProgress {
    fn started(&self, total: usize) {
        self.spinner.set_message(format!("Enriching {total} entities"));
    }

    fn entity_done(&self, done: usize, total: usize, result: &EnrichmentResult) {
        self.spinner.set_message(format!(
            "Enriching [{done}/{total}] {}",
            result.entity.display_name()
        ));
    }

    fn finished(&self, _summary: &BatchSummary) {
        self.spinner.finish_and_clear();
    }
}
