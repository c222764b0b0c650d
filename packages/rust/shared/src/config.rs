//! Application configuration for Prospector.
//!
//! User config lives at `~/.prospector/prospector.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file; each provider names the
//! environment variable that holds its key.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProspectorError, Result};
use crate::types::Cents;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "prospector.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".prospector";

// ---------------------------------------------------------------------------
// Config structs (matching prospector.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scheduler and cache settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Monetary ceilings for paid providers.
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Polling behaviour for asynchronous providers.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Outbound HTTP settings shared by providers.
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-provider settings keyed by provider name.
    #[serde(default = "default_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineSection::default(),
            budget: BudgetConfig::default(),
            polling: PollingConfig::default(),
            http: HttpConfig::default(),
            providers: default_providers(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Maximum provider calls in flight engine-wide.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Maximum entities processed concurrently in batch mode.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: u32,

    /// Whether provider results are memoized.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,

    /// Cache entry lifetime in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Run zero-cost providers first and call paid ones only when the free
    /// results leave the entity below `sufficient_score`.
    #[serde(default = "default_true")]
    pub cost_tiering: bool,

    /// Partial confidence score at which free results are considered enough.
    #[serde(default = "default_sufficient_score")]
    pub sufficient_score: u8,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            batch_concurrency: default_batch_concurrency(),
            cache_enabled: true,
            cache_ttl_secs: default_cache_ttl(),
            cost_tiering: true,
            sufficient_score: default_sufficient_score(),
        }
    }
}

fn default_concurrency() -> u32 {
    3
}
fn default_batch_concurrency() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    3600
}
fn default_sufficient_score() -> u8 {
    90
}

/// Which orchestration run a budget ledger covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetScope {
    /// A fresh ledger for every entity.
    #[default]
    PerEntity,
    /// One ledger shared by every entity in a batch.
    PerBatch,
}

/// `[budget]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default)]
    pub scope: BudgetScope,

    /// Ceiling per entity, in cents.
    #[serde(default = "default_entity_budget")]
    pub max_cost_per_entity_cents: u64,

    /// Ceiling per batch when `scope = "per_batch"`, in cents.
    #[serde(default = "default_batch_budget")]
    pub max_cost_per_batch_cents: u64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            scope: BudgetScope::default(),
            max_cost_per_entity_cents: default_entity_budget(),
            max_cost_per_batch_cents: default_batch_budget(),
        }
    }
}

fn default_entity_budget() -> u64 {
    200
}
fn default_batch_budget() -> u64 {
    5_000
}

/// `[polling]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between poll attempts in ms.
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Re-issued calls allowed after the initial one.
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            max_attempts: default_poll_attempts(),
        }
    }
}

fn default_poll_interval() -> u64 {
    4_000
}
fn default_poll_attempts() -> u32 {
    6
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// Retries for HTTP 429/5xx and timeouts.
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            network_retries: default_network_retries(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}
fn default_network_retries() -> u32 {
    2
}

/// `[providers.<name>]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Upstream API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Estimated cost per call in cents.
    #[serde(default)]
    pub cost_cents: u64,
}

impl ProviderConfig {
    fn new(base_url: Option<&str>, api_key_env: Option<&str>, cost_cents: u64) -> Self {
        Self {
            enabled: true,
            api_key_env: api_key_env.map(String::from),
            base_url: base_url.map(String::from),
            cost_cents,
        }
    }
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    BTreeMap::from([
        (
            "state-registry".to_string(),
            ProviderConfig::new(
                Some("https://apigateway.cobaltintelligence.com/v1"),
                Some("COBALT_INTELLIGENCE_API_KEY"),
                50,
            ),
        ),
        (
            "nonprofit-registry".to_string(),
            ProviderConfig::new(
                Some("https://projects.propublica.org/nonprofits/api/v2"),
                None,
                0,
            ),
        ),
        (
            "email-discovery".to_string(),
            ProviderConfig::new(Some("https://api.hunter.io/v2"), Some("HUNTER_API_KEY"), 4),
        ),
        (
            "email-verification".to_string(),
            ProviderConfig::new(
                Some("https://api.neverbounce.com/v4"),
                Some("NEVERBOUNCE_API_KEY"),
                1,
            ),
        ),
        ("website-check".to_string(), ProviderConfig::new(None, None, 0)),
    ])
}

// ---------------------------------------------------------------------------
// Engine config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime engine configuration, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum provider calls in flight engine-wide.
    pub concurrency: usize,
    /// Maximum entities processed concurrently in batch mode.
    pub batch_concurrency: usize,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub budget_scope: BudgetScope,
    pub max_cost_per_entity: Cents,
    pub max_cost_per_batch: Cents,
    /// Zero-cost providers run as a first tier; paid ones only escalate.
    pub cost_tiering: bool,
    pub sufficient_score: u8,
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.engine.concurrency.max(1) as usize,
            batch_concurrency: config.engine.batch_concurrency.max(1) as usize,
            cache_enabled: config.engine.cache_enabled,
            cache_ttl: Duration::from_secs(config.engine.cache_ttl_secs),
            poll_interval: Duration::from_millis(config.polling.interval_ms),
            max_poll_attempts: config.polling.max_attempts,
            budget_scope: config.budget.scope,
            max_cost_per_entity: Cents(config.budget.max_cost_per_entity_cents),
            max_cost_per_batch: Cents(config.budget.max_cost_per_batch_cents),
            cost_tiering: config.engine.cost_tiering,
            sufficient_score: config.engine.sufficient_score.min(100),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.prospector/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProspectorError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.prospector/prospector.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ProspectorError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ProspectorError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ProspectorError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ProspectorError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ProspectorError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the API key for `provider` from the env var its config names.
///
/// Providers without an `api_key_env` need no key and resolve to `None`.
pub fn validate_api_key(config: &AppConfig, provider: &str) -> Result<Option<String>> {
    let entry = config
        .providers
        .get(provider)
        .ok_or_else(|| ProspectorError::config(format!("unknown provider '{provider}'")))?;

    let Some(var_name) = entry.api_key_env.as_deref() else {
        return Ok(None);
    };

    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(Some(val)),
        _ => Err(ProspectorError::config(format!(
            "API key for {provider} not found. Set the {var_name} environment variable."
        ))),
    }
}
