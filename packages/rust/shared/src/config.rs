//! Application configuration for SkillSync.
//!
//! User config lives at `~/.skillsync/skillsync.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file; it only names the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkillSyncError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "skillsync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".skillsync";

// ---------------------------------------------------------------------------
// Config structs (matching skillsync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

/// `[github]` section: source API, quota policy and retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Name of the env var holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Unmetered raw-content host.
    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// Browsable web host used for author and source links.
    #[serde(default = "default_web_base")]
    pub web_base: String,

    /// Below this many remaining calls, wait for the quota window to reset.
    #[serde(default = "default_safety_threshold")]
    pub safety_threshold: u32,

    /// Seconds added on top of the reset time before resuming.
    #[serde(default = "default_wait_margin")]
    pub wait_margin_secs: u64,

    /// Seconds added on top of the reset time after a quota-exhaustion response.
    #[serde(default = "default_exhausted_margin")]
    pub exhausted_margin_secs: u64,

    /// Longest single quota wait; anything longer fails instead.
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    /// Minimum remaining quota required to start a run.
    #[serde(default = "default_min_start_quota")]
    pub min_start_quota: u32,

    /// Retries for 5xx responses (on top of the first attempt).
    #[serde(default = "default_server_retries")]
    pub server_retries: u32,

    #[serde(default = "default_github_timeout")]
    pub timeout_secs: u64,

    /// Branches tried, in order, when resolving a repository's tree.
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            web_base: default_web_base(),
            safety_threshold: default_safety_threshold(),
            wait_margin_secs: default_wait_margin(),
            exhausted_margin_secs: default_exhausted_margin(),
            max_wait_secs: default_max_wait(),
            min_start_quota: default_min_start_quota(),
            server_retries: default_server_retries(),
            timeout_secs: default_github_timeout(),
            branches: default_branches(),
        }
    }
}

fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}
fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".into()
}
fn default_web_base() -> String {
    "https://github.com".into()
}
fn default_safety_threshold() -> u32 {
    50
}
fn default_wait_margin() -> u64 {
    5
}
fn default_exhausted_margin() -> u64 {
    10
}
fn default_max_wait() -> u64 {
    3700
}
fn default_min_start_quota() -> u32 {
    20
}
fn default_server_retries() -> u32 {
    3
}
fn default_github_timeout() -> u64 {
    30
}
fn default_branches() -> Vec<String> {
    vec!["main".into(), "master".into()]
}

/// `[generation]` section: the external text-generation service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// Chat-completions endpoint.
    #[serde(default = "default_llm_url")]
    pub api_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Maximum concurrent generation calls.
    #[serde(default = "default_llm_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// How many characters of the raw body are sent with each request.
    #[serde(default = "default_prompt_chars")]
    pub prompt_chars: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            api_url: default_llm_url(),
            model: default_llm_model(),
            concurrency: default_llm_concurrency(),
            timeout_secs: default_llm_timeout(),
            prompt_chars: default_prompt_chars(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_key_env() -> String {
    "LLM_API_KEY".into()
}
fn default_llm_url() -> String {
    "https://api.deepseek.com/chat/completions".into()
}
fn default_llm_model() -> String {
    "deepseek-chat".into()
}
fn default_llm_concurrency() -> usize {
    5
}
fn default_llm_timeout() -> u64 {
    90
}
fn default_prompt_chars() -> usize {
    4000
}
fn default_temperature() -> f32 {
    0.5
}

/// `[catalog]` section: record building, merge rules and checkpointing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Seeds whose entries live in the `official-` id namespace.
    #[serde(default = "default_canonical_repos")]
    pub canonical_repos: Vec<String>,

    /// Accepted documentation file names, highest priority first (case-insensitive).
    #[serde(default = "default_doc_files")]
    pub doc_files: Vec<String>,

    /// Maximum long-description length in characters (0 = unlimited).
    #[serde(default = "default_long_desc_max")]
    pub long_desc_max: usize,

    /// Short descriptions shorter than this are placeholders.
    #[serde(default = "default_placeholder_min_len")]
    pub placeholder_min_len: usize,

    /// Regex matching generic fallback short descriptions.
    #[serde(default = "default_placeholder_pattern")]
    pub placeholder_pattern: String,

    /// Generated long descriptions must be longer than this to be adopted.
    #[serde(default = "default_long_desc_min_len")]
    pub long_desc_min_len: usize,

    /// Install command prefix shown on each record.
    #[serde(default = "default_install_command")]
    pub install_command: String,

    /// Records processed between progress snapshots.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,

    /// Snapshots older than this are discarded.
    #[serde(default = "default_snapshot_max_age")]
    pub snapshot_max_age_hours: i64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            canonical_repos: default_canonical_repos(),
            doc_files: default_doc_files(),
            long_desc_max: default_long_desc_max(),
            placeholder_min_len: default_placeholder_min_len(),
            placeholder_pattern: default_placeholder_pattern(),
            long_desc_min_len: default_long_desc_min_len(),
            install_command: default_install_command(),
            checkpoint_every: default_checkpoint_every(),
            snapshot_max_age_hours: default_snapshot_max_age(),
        }
    }
}

fn default_canonical_repos() -> Vec<String> {
    vec!["openclaw/skills".into(), "openclaw/openclaw".into()]
}
fn default_doc_files() -> Vec<String> {
    vec!["skill.md".into(), "readme.md".into()]
}
fn default_long_desc_max() -> usize {
    3000
}
fn default_placeholder_min_len() -> usize {
    20
}
fn default_placeholder_pattern() -> String {
    "^Skill by ".into()
}
fn default_long_desc_min_len() -> usize {
    50
}
fn default_install_command() -> String {
    "clawhub install".into()
}
fn default_checkpoint_every() -> usize {
    500
}
fn default_snapshot_max_age() -> i64 {
    24
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding seeds, the catalog, the snapshot and backups.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "data".into()
}

/// `[sync]` section: optional downstream catalog endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Endpoint URL; empty disables the sync phase.
    #[serde(default)]
    pub url: String,

    /// Name of the env var holding the bearer key.
    #[serde(default = "default_sync_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_sync_batch")]
    pub batch_size: usize,

    #[serde(default = "default_sync_timeout")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key_env: default_sync_key_env(),
            batch_size: default_sync_batch(),
            timeout_secs: default_sync_timeout(),
        }
    }
}

fn default_sync_key_env() -> String {
    "SYNC_API_KEY".into()
}
fn default_sync_batch() -> usize {
    200
}
fn default_sync_timeout() -> u64 {
    120
}

// ---------------------------------------------------------------------------
// Data paths
// ---------------------------------------------------------------------------

/// Files derived from `[paths].data_dir`.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn seeds_file(&self) -> PathBuf {
        self.root.join("seeds.json")
    }

    pub fn catalog_file(&self) -> PathBuf {
        self.root.join("skills.json")
    }

    pub fn snapshot_file(&self) -> PathBuf {
        self.root.join(".sync_progress.json")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backups")
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.skillsync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SkillSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.skillsync/skillsync.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| SkillSyncError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SkillSyncError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SkillSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| SkillSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SkillSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named env var; empty values count as unset.
pub fn read_secret(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

/// The GitHub token is the one credential a run cannot start without.
pub fn require_github_token(config: &AppConfig) -> Result<String> {
    let var_name = &config.github.token_env;
    read_secret(var_name).ok_or_else(|| {
        SkillSyncError::config(format!(
            "GitHub token not found. Set the {var_name} environment variable."
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize default config");
        assert!(toml_str.contains("GITHUB_TOKEN"));
        assert!(toml_str.contains("placeholder_pattern"));
        assert!(toml_str.contains("canonical_repos"));
    }

    #[test]
    fn config_roundtrip() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.github.safety_threshold, 50);
        assert_eq!(parsed.github.max_wait_secs, 3700);
        assert_eq!(parsed.generation.concurrency, 5);
        assert_eq!(parsed.catalog.snapshot_max_age_hours, 24);
        assert_eq!(parsed.catalog.doc_files, vec!["skill.md", "readme.md"]);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let toml_str = r#"
[github]
safety_threshold = 100

[catalog]
canonical_repos = ["org/skills"]

[sync]
url = "https://example.com/api/skills/sync"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.github.safety_threshold, 100);
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert_eq!(config.catalog.canonical_repos, vec!["org/skills"]);
        assert_eq!(config.catalog.long_desc_max, 3000);
        assert_eq!(config.sync.batch_size, 200);
        assert_eq!(config.paths.data_dir, "data");
    }

    #[test]
    fn data_paths_layout() {
        let paths = DataPaths::new("/tmp/skills-data");
        assert_eq!(paths.seeds_file(), PathBuf::from("/tmp/skills-data/seeds.json"));
        assert_eq!(paths.catalog_file(), PathBuf::from("/tmp/skills-data/skills.json"));
        assert_eq!(paths.backup_dir(), PathBuf::from("/tmp/skills-data/backups"));
    }

    #[test]
    fn missing_token_is_config_error() {
        let mut config = AppConfig::default();
        // Unique name so other tests cannot interfere
        config.github.token_env = "SKILLSYNC_TEST_NONEXISTENT_TOKEN_7781".into();
        let err = require_github_token(&config).unwrap_err();
        assert!(matches!(err, SkillSyncError::Config { .. }));
        assert!(err.to_string().contains("SKILLSYNC_TEST_NONEXISTENT_TOKEN_7781"));
    }
}
