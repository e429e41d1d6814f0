//! Application configuration for RecallBrief.
//!
//! User config lives at `~/.recallbrief/recallbrief.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RecallBriefError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "recallbrief.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".recallbrief";

/// Placeholder written into any field no enrichment source could fill.
pub const DEFAULT_PLACEHOLDER: &str = "--";

// ---------------------------------------------------------------------------
// Config structs (matching recallbrief.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where artifacts and reports live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Remote resource downloads.
    #[serde(default)]
    pub fetch: FetchSection,

    /// Chunked upload + workflow invocation.
    #[serde(default)]
    pub batch: BatchSection,

    /// Remote processing service endpoints and credentials.
    #[serde(default)]
    pub workflow: WorkflowSection,

    /// Housekeeping sweep.
    #[serde(default)]
    pub cleanup: CleanupSection,

    /// PDF rasterization and image extraction.
    #[serde(default)]
    pub render: RenderSection,

    /// Merge defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root for all materialized artifacts.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Where merged record reports are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}
fn default_output_dir() -> String {
    "data/reports".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSection {
    /// Maximum in-flight downloads.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Pause before every download attempt.
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,

    /// Attempts per target before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts.
    #[serde(default = "default_fetch_retry_delay")]
    pub retry_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            request_delay_ms: default_request_delay(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_fetch_retry_delay(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}
fn default_request_delay() -> u64 {
    3_000
}
fn default_max_attempts() -> u32 {
    3
}
fn default_fetch_retry_delay() -> u64 {
    1_000
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Processing units per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause after every chunk.
    #[serde(default = "default_chunk_pause")]
    pub chunk_pause_ms: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_pause_ms: default_chunk_pause(),
        }
    }
}

fn default_chunk_size() -> usize {
    9
}
fn default_chunk_pause() -> u64 {
    1_000
}

/// `[workflow]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Multipart file upload endpoint.
    #[serde(default)]
    pub upload_url: String,

    /// Workflow run endpoint.
    #[serde(default)]
    pub run_url: String,

    /// Record lookup endpoint (`searchByGlobalId`).
    #[serde(default)]
    pub records_url: String,

    /// Document id sent with record lookups.
    #[serde(default)]
    pub records_doc_id: String,

    /// Env var holding the document workflow key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Env var holding the classification workflow key.
    #[serde(default = "default_classify_key_env")]
    pub classify_api_key_env: String,

    /// Optional pinned workflow version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,

    /// Attempts per workflow run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between workflow run attempts.
    #[serde(default = "default_workflow_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            upload_url: String::new(),
            run_url: String::new(),
            records_url: String::new(),
            records_doc_id: String::new(),
            api_key_env: default_api_key_env(),
            classify_api_key_env: default_classify_key_env(),
            workflow_id: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_workflow_retry_delay(),
        }
    }
}

fn default_api_key_env() -> String {
    "RECALLBRIEF_WORKFLOW_KEY".into()
}
fn default_classify_key_env() -> String {
    "RECALLBRIEF_CLASSIFY_KEY".into()
}
fn default_workflow_retry_delay() -> u64 {
    2_000
}

/// `[cleanup]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupSection {
    /// Files older than this are deleted by the sweep.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: u64,

    /// Only files with one of these suffixes are considered.
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            retention_hours: default_retention_hours(),
            suffixes: default_suffixes(),
        }
    }
}

fn default_retention_hours() -> u64 {
    1
}
fn default_suffixes() -> Vec<String> {
    [".png", ".jpg", ".jpeg", ".pdf", ".json"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSection {
    /// Resolution of rendered first pages.
    #[serde(default = "default_page_dpi")]
    pub page_dpi: u32,

    /// Embedded images narrower or shorter than this are skipped.
    #[serde(default = "default_min_image_px")]
    pub min_image_px: u32,

    /// Directory holding the pdfium shared library. Unset: system library path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdfium_dir: Option<String>,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            page_dpi: default_page_dpi(),
            min_image_px: default_min_image_px(),
            pdfium_dir: None,
        }
    }
}

fn default_page_dpi() -> u32 {
    200
}
fn default_min_image_px() -> u32 {
    50
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Value for any field no source filled.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
        }
    }
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config file + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime download settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_concurrent: usize,
    pub request_delay: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.fetch.max_concurrent.max(1),
            request_delay: Duration::from_millis(config.fetch.request_delay_ms),
            max_attempts: config.fetch.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.fetch.retry_delay_ms),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
        }
    }
}

/// Runtime batch settings.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub chunk_pause: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for BatchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            chunk_size: config.batch.chunk_size.max(1),
            chunk_pause: Duration::from_millis(config.batch.chunk_pause_ms),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.recallbrief/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RecallBriefError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.recallbrief/recallbrief.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| RecallBriefError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        RecallBriefError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RecallBriefError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RecallBriefError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RecallBriefError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read an API key from the named env var.
pub fn api_key_from_env(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(RecallBriefError::config(format!(
            "workflow API key not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the workflow endpoints are configured and both keys are present.
pub fn validate_workflow(config: &AppConfig) -> Result<()> {
    if config.workflow.upload_url.is_empty() || config.workflow.run_url.is_empty() {
        return Err(RecallBriefError::config(
            "[workflow] upload_url and run_url must be set",
        ));
    }
    api_key_from_env(&config.workflow.api_key_env)?;
    api_key_from_env(&config.workflow.classify_api_key_env)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("RECALLBRIEF_WORKFLOW_KEY"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[fetch]
max_concurrent = 2

[batch]
chunk_size = 4
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.fetch.max_concurrent, 2);
        assert_eq!(config.fetch.max_attempts, 3);
        assert_eq!(config.batch.chunk_size, 4);
        assert_eq!(config.batch.chunk_pause_ms, 1_000);
        assert_eq!(config.defaults.placeholder, "--");
        assert_eq!(config.cleanup.retention_hours, 1);
        assert_eq!(config.render.page_dpi, 200);
        assert_eq!(config.render.min_image_px, 50);
        assert!(config.render.pdfium_dir.is_none());
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let fetch = FetchConfig::from(&app);
        assert_eq!(fetch.max_concurrent, 5);
        assert_eq!(fetch.request_delay, Duration::from_secs(3));
        assert_eq!(fetch.timeout, Duration::from_secs(30));

        let batch = BatchConfig::from(&app);
        assert_eq!(batch.chunk_size, 9);
    }

    #[test]
    fn zero_sizes_are_clamped() {
        let mut app = AppConfig::default();
        app.fetch.max_concurrent = 0;
        app.batch.chunk_size = 0;
        assert_eq!(FetchConfig::from(&app).max_concurrent, 1);
        assert_eq!(BatchConfig::from(&app).chunk_size, 1);
    }

    #[test]
    fn missing_api_key_is_reported() {
        let result = api_key_from_env("RB_TEST_NONEXISTENT_KEY_12345");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn workflow_requires_endpoints() {
        let config = AppConfig::default();
        let err = validate_workflow(&config).unwrap_err();
        assert!(err.to_string().contains("upload_url"));
    }
}
