//! Configuration management
//!
//! This module handles loading, validation, and management of the Bindery configuration.
//! Configuration is stored in TOML format at ~/.bindery/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **llm**: Provider endpoint, model ids per tier, output and reasoning budgets
//! - **agent**: Agent loop limits
//! - **jobs**: External design program, directories, timeouts
//! - **registry**: Structure registry endpoint
//!
//! # Path Expansion
//!
//! `~` is expanded to the user's home directory for every configured path,
//! and the data, upload and output directories are created if missing.
//!
//! # Examples
//!
//! ```no_run
//! use bindery_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Standard model: {}", config.llm.standard_model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Core engine settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Language-model provider configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Agent loop limits
    #[serde(default)]
    pub agent: AgentConfig,

    /// External design job settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Structure registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Language-model provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Base URL for the Messages API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model for greetings and short messages
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Model for tool orchestration and ordinary requests
    #[serde(default = "default_standard_model")]
    pub standard_model: String,

    /// Model for interpretation and design reasoning
    #[serde(default = "default_deep_model")]
    pub deep_model: String,

    /// Maximum output tokens per call
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Extended-reasoning budget for the deep tier
    #[serde(default = "default_reasoning_budget")]
    pub reasoning_budget_tokens: u32,

    /// Timeout for a single provider call, in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum provider calls per conversation turn
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

/// External design job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Executable to launch (never through a shell)
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments placed before the generated named arguments
    #[serde(default = "default_base_args")]
    pub base_args: Vec<String>,

    /// Working directory for the process (supports ~ expansion)
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Model weights directory passed to the program
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Where fetched structures are stored
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Root of per-job output directories
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Wall-clock limit for one job, in seconds
    #[serde(default = "default_job_timeout")]
    pub timeout_secs: u64,

    /// Time the process gets to exit after closing its output
    #[serde(default = "default_exit_grace")]
    pub exit_grace_secs: u64,

    /// File-name prefix of result artifacts
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
}

/// Structure registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Download root; structures are fetched from `<base_url>/<ID>.pdb`
    #[serde(default = "default_registry_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_registry_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.bindery")
}

fn default_llm_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_fast_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_standard_model() -> String {
    "claude-sonnet-4-6".to_string()
}

fn default_deep_model() -> String {
    "claude-opus-4-6".to_string()
}

fn default_max_output_tokens() -> u32 {
    16_000
}

fn default_reasoning_budget() -> u32 {
    10_000
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_max_iterations() -> usize {
    15
}

fn default_program() -> PathBuf {
    PathBuf::from("python3")
}

fn default_base_args() -> Vec<String> {
    vec!["scripts/run_inference.py".to_string()]
}

fn default_working_dir() -> PathBuf {
    PathBuf::from("~/RFdiffusion")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("~/RFdiffusion/models")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("~/.bindery/uploads")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("~/.bindery/outputs")
}

fn default_job_timeout() -> u64 {
    600
}

fn default_exit_grace() -> u64 {
    30
}

fn default_artifact_prefix() -> String {
    "design".to_string()
}

fn default_registry_base_url() -> String {
    "https://files.rcsb.org/download".to_string()
}

fn default_registry_timeout() -> u64 {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            fast_model: default_fast_model(),
            standard_model: default_standard_model(),
            deep_model: default_deep_model(),
            max_output_tokens: default_max_output_tokens(),
            reasoning_budget_tokens: default_reasoning_budget(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            base_args: default_base_args(),
            working_dir: default_working_dir(),
            model_dir: default_model_dir(),
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
            timeout_secs: default_job_timeout(),
            exit_grace_secs: default_exit_grace(),
            artifact_prefix: default_artifact_prefix(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: default_registry_base_url(),
            timeout_secs: default_registry_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.bindery/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, validate and process configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();

        // Write the unexpanded defaults so the file stays portable
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = config;
        config.validate_and_process()?;
        Ok(config)
    }

    /// Get the default configuration file path (~/.bindery/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".bindery").join("config.toml"))
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("bindery.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated and numeric fields
    /// - Expands ~ in paths
    /// - Creates the data, upload and output directories
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for (name, model) in [
            ("fast_model", &self.llm.fast_model),
            ("standard_model", &self.llm.standard_model),
            ("deep_model", &self.llm.deep_model),
        ] {
            if model.trim().is_empty() {
                return Err(EngineError::Config(format!("llm.{} must not be empty", name)));
            }
        }

        if self.llm.reasoning_budget_tokens >= self.llm.max_output_tokens {
            return Err(EngineError::Config(
                "reasoning_budget_tokens must be smaller than max_output_tokens".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(EngineError::Config(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }

        if self.jobs.timeout_secs == 0 {
            return Err(EngineError::Config(
                "jobs.timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.jobs.artifact_prefix.is_empty() {
            return Err(EngineError::Config(
                "jobs.artifact_prefix must not be empty".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.jobs.program = expand_path(&self.jobs.program)?;
        self.jobs.working_dir = expand_path(&self.jobs.working_dir)?;
        self.jobs.model_dir = expand_path(&self.jobs.model_dir)?;
        self.jobs.upload_dir = expand_path(&self.jobs.upload_dir)?;
        self.jobs.output_dir = expand_path(&self.jobs.output_dir)?;

        for dir in [
            &self.core.data_dir,
            &self.jobs.upload_dir,
            &self.jobs.output_dir,
        ] {
            create_dir(dir)?;
        }

        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<(), EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }
    if !path.is_dir() {
        return Err(EngineError::PathCanonicalization(
            path.to_path_buf(),
            "not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
