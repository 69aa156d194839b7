use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::termination::DEFAULT_MAX_ROUNDS;

/// Main configuration structure for Redline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum number of tasks executing at once (1-64)
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,

    /// Round engine configuration
    #[serde(default)]
    pub engine: EngineConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-task working directories
    #[serde(default)]
    pub storage: StorageConfig,

    /// Exploit and patch generator backend
    #[serde(default)]
    pub llm: LlmConfig,

    /// Containerised analysis toolchain
    #[serde(default)]
    pub toolchain: ToolchainConfig,
}

const fn default_max_concurrent_tasks() -> usize {
    3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
            engine: EngineConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            toolchain: ToolchainConfig::default(),
        }
    }
}

/// What to do when a generated exploit candidate does not compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponizeFailurePolicy {
    /// Abort the run with a tool failure
    Fatal,
    /// Discard the candidate and continue with no adversarial findings
    SkipRound,
}

impl Default for WeaponizeFailurePolicy {
    fn default() -> Self {
        Self::Fatal
    }
}

/// Round engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Fix invocations allowed before the run is declared exhausted
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Failing cases handed to the patch generator per round
    #[serde(default = "default_fix_sample_size")]
    pub fix_sample_size: usize,

    /// Upper bound for every external tool call, in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    #[serde(default)]
    pub weaponize_failure: WeaponizeFailurePolicy,
}

const fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

const fn default_fix_sample_size() -> usize {
    3
}

const fn default_tool_timeout_secs() -> u64 {
    900
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            fix_sample_size: default_fix_sample_size(),
            tool_timeout_secs: default_tool_timeout_secs(),
            weaponize_failure: WeaponizeFailurePolicy::default(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".redline/redline.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self::Daily
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Directory for log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub rotation: RotationPolicy,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
            enable_stdout: default_true(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Root under which `tasks/<task_id>/` working directories live
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from(".redline/storage")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root: default_storage_root() }
    }
}

/// OpenAI-compatible chat completion backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (falls back to REDLINE_LLM_API_KEY, then OPENAI_API_KEY)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_exploit_temperature")]
    pub exploit_temperature: f32,

    #[serde(default = "default_patch_temperature")]
    pub patch_temperature: f32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}

fn default_llm_model() -> String {
    "qwen-plus".to_string()
}

const fn default_exploit_temperature() -> f32 {
    0.7
}

const fn default_patch_temperature() -> f32 {
    0.2
}

const fn default_llm_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_llm_model(),
            api_key: None,
            exploit_temperature: default_exploit_temperature(),
            patch_temperature: default_patch_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Get API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("REDLINE_LLM_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Container images and knobs for the analysis toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolchainConfig {
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    #[serde(default = "default_foundry_image")]
    pub foundry_image: String,

    #[serde(default = "default_slither_image")]
    pub slither_image: String,

    #[serde(default = "default_fuzz_runs")]
    pub fuzz_runs: u32,

    #[serde(default = "default_forge_std_remapping")]
    pub forge_std_remapping: String,
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_foundry_image() -> String {
    "ghcr.io/foundry-rs/foundry:latest".to_string()
}

fn default_slither_image() -> String {
    "trailofbits/eth-security-toolbox:latest".to_string()
}

const fn default_fuzz_runs() -> u32 {
    500
}

fn default_forge_std_remapping() -> String {
    "forge-std/=/opt/foundry/lib/forge-std/src/".to_string()
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            docker_binary: default_docker_binary(),
            foundry_image: default_foundry_image(),
            slither_image: default_slither_image(),
            fuzz_runs: default_fuzz_runs(),
            forge_std_remapping: default_forge_std_remapping(),
        }
    }
}
