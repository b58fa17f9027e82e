//! Application configuration for Prospector.
//!
//! User config lives at `~/.prospector/prospector.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProspectorError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "prospector.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".prospector";

// ---------------------------------------------------------------------------
// Config structs (matching prospector.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Contact discovery (Hunter.io) settings.
    #[serde(default)]
    pub hunter: HunterConfig,

    /// Profile lookup (RapidAPI) settings.
    #[serde(default)]
    pub rapidapi: RapidApiConfig,

    /// Reasoning model (OpenRouter) settings.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default cap on records forwarded by scoring.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Default number of discovery result pages.
    #[serde(default = "default_search_depth")]
    pub search_depth: u32,

    /// Concurrent enrichment workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Timeout for one discovery page or one profile fetch, in seconds.
    #[serde(default = "default_port_timeout")]
    pub port_timeout_secs: u64,

    /// Timeout for one reasoning call (scoring or analysis), in seconds.
    #[serde(default = "default_reasoning_timeout")]
    pub reasoning_timeout_secs: u64,

    /// Attempts at analyzing one profile before the record fails.
    #[serde(default = "default_analysis_attempts")]
    pub analysis_attempts: u32,

    /// Directory holding the run database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            search_depth: default_search_depth(),
            concurrency: default_concurrency(),
            port_timeout_secs: default_port_timeout(),
            reasoning_timeout_secs: default_reasoning_timeout(),
            analysis_attempts: default_analysis_attempts(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_max_results() -> u32 {
    5
}
fn default_search_depth() -> u32 {
    1
}
fn default_concurrency() -> u32 {
    4
}
fn default_port_timeout() -> u64 {
    30
}
fn default_reasoning_timeout() -> u64 {
    120
}
fn default_analysis_attempts() -> u32 {
    2
}
fn default_data_dir() -> String {
    "~/.prospector/data".into()
}

/// `[hunter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HunterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_hunter_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_hunter_base_url")]
    pub base_url: String,

    /// Results requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_hunter_key_env(),
            base_url: default_hunter_base_url(),
            page_size: default_page_size(),
        }
    }
}

fn default_hunter_key_env() -> String {
    "HUNTER_API_KEY".into()
}
fn default_hunter_base_url() -> String {
    "https://api.hunter.io".into()
}
fn default_page_size() -> u32 {
    50
}

/// `[rapidapi]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidApiConfig {
    #[serde(default = "default_rapidapi_key_env")]
    pub api_key_env: String,

    /// Value of the `X-RapidAPI-Host` header.
    #[serde(default = "default_rapidapi_host")]
    pub host: String,

    #[serde(default = "default_rapidapi_base_url")]
    pub base_url: String,
}

impl Default for RapidApiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_rapidapi_key_env(),
            host: default_rapidapi_host(),
            base_url: default_rapidapi_base_url(),
        }
    }
}

fn default_rapidapi_key_env() -> String {
    "RAPIDAPI_KEY".into()
}
fn default_rapidapi_host() -> String {
    "fresh-linkedin-profile-data.p.rapidapi.com".into()
}
fn default_rapidapi_base_url() -> String {
    "https://fresh-linkedin-profile-data.p.rapidapi.com".into()
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    #[serde(default = "default_openrouter_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_openrouter_base_url")]
    pub base_url: String,

    /// Model used for scoring and profile analysis.
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default)]
    pub temperature: f32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openrouter_key_env(),
            base_url: default_openrouter_base_url(),
            default_model: default_model(),
            temperature: 0.0,
        }
    }
}

fn default_openrouter_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}

// ---------------------------------------------------------------------------
// Pipeline options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Engine tuning that is not part of a run's identity.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Maximum concurrent enrichment workers.
    pub concurrency: usize,
    /// Budget for one discovery page or one profile fetch. Collection gets
    /// this budget once per requested page.
    pub port_timeout: Duration,
    /// Budget for one scoring or analysis call.
    pub reasoning_timeout: Duration,
    /// Analyze attempts per record (at least 1).
    pub analysis_attempts: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.defaults.concurrency.max(1) as usize,
            port_timeout: Duration::from_secs(config.defaults.port_timeout_secs.max(1)),
            reasoning_timeout: Duration::from_secs(config.defaults.reasoning_timeout_secs.max(1)),
            analysis_attempts: config.defaults.analysis_attempts.max(1),
        }
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

/// Expand a leading `~/` in `data_dir` against the home directory.
pub fn resolve_data_dir(config: &AppConfig) -> Result<PathBuf> {
    let raw = config.defaults.data_dir.as_str();
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| ProspectorError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Read the API key from the env var named `var_name`.
pub fn api_key_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(ProspectorError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every service key env var is set and non-empty.
pub fn validate_api_keys(config: &AppConfig) -> Result<()> {
    for var_name in [
        &config.hunter.api_key_env,
        &config.rapidapi.api_key_env,
        &config.openrouter.api_key_env,
    ] {
        api_key_from_env(var_name)?;
    }
    Ok(())
}
