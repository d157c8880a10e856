//! Configuration management
//!
//! This module handles loading, validation, and management of the Forge configuration.
//! Configuration is stored in TOML format at ~/.forge/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Workspace path, log level, data directory
//! - **llm**: Provider selection and per-backend settings
//! - **agent**: Orchestration loop budget, timeouts and busy policy
//! - **workspace**: Category ordering for tree rendering
//! - **memory**: Retrieval weights and the edit capture hook
//!
//! # Path Expansion
//!
//! The configuration system automatically:
//! - Expands ~ to the user's home directory
//! - Canonicalizes the workspace path, creating it when missing
//! - Creates the data directory if it doesn't exist
//!
//! # Examples
//!
//! ```no_run
//! use forge_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Workspace: {:?}", config.core.workspace);
//! println!("Default provider: {}", config.llm.default_provider);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Providers the router knows how to build
pub const SUPPORTED_PROVIDERS: [&str; 2] = ["anthropic", "gemini"];

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Core engine settings
    pub core: CoreConfig,

    /// LLM provider configuration
    pub llm: LLMConfig,

    /// Orchestration loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Workspace presentation settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Memory retrieval and capture settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    /// Workspace directory path (supports ~ expansion)
    pub workspace: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LLMConfig {
    /// Default LLM provider (anthropic, gemini)
    pub default_provider: String,

    /// Upper bound on tokens generated per model turn
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Anthropic provider settings
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Gemini provider settings
    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// Anthropic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnthropicConfig {
    /// Base URL for Anthropic API
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_anthropic_model")]
    pub model: String,
    // Note: API key stored in OS keychain, not in config
}

/// Gemini provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeminiConfig {
    /// Base URL for Gemini API
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_gemini_model")]
    pub model: String,
    // Note: API key stored in OS keychain, not in config
}

/// What to do when a message arrives for a session that is mid-turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait for the running turn to finish
    #[default]
    Queue,

    /// Fail immediately with `SessionBusy`
    Reject,
}

/// Orchestration loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Model turns allowed per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for a single provider call (seconds)
    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,

    /// Behaviour for concurrent messages on one session
    #[serde(default)]
    pub busy_policy: BusyPolicy,

    /// Dispatch the tool calls of one model turn concurrently
    #[serde(default)]
    pub parallel_tools: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            llm_timeout_secs: default_llm_timeout(),
            busy_policy: BusyPolicy::default(),
            parallel_tools: false,
        }
    }
}

/// Workspace presentation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Top-level folders listed first in the tree, in this order
    #[serde(default = "default_category_order")]
    pub category_order: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            category_order: default_category_order(),
        }
    }
}

/// Memory system configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryConfig {
    /// Default number of memories returned by retrieval
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Decay scale of the recency signal (days)
    #[serde(default = "default_recency_scale_days")]
    pub recency_scale_days: f64,

    /// Entity score added per matching active idea
    #[serde(default = "default_entity_match_increment")]
    pub entity_match_increment: f64,

    /// Create memories from files written into category folders
    #[serde(default = "default_true")]
    pub capture_on_edit: bool,

    /// Weights of the four relevance signals
    #[serde(default)]
    pub weights: RelevanceWeights,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            recency_scale_days: default_recency_scale_days(),
            entity_match_increment: default_entity_match_increment(),
            capture_on_edit: true,
            weights: RelevanceWeights::default(),
        }
    }
}

/// Weights applied to each relevance signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RelevanceWeights {
    #[serde(default = "default_importance_weight")]
    pub importance: f64,
    #[serde(default = "default_recency_weight")]
    pub recency: f64,
    #[serde(default = "default_lexical_weight")]
    pub lexical: f64,
    #[serde(default = "default_entity_weight")]
    pub entity: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            importance: default_importance_weight(),
            recency: default_recency_weight(),
            lexical: default_lexical_weight(),
            entity: default_entity_weight(),
        }
    }
}

impl RelevanceWeights {
    fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> {
        [
            ("importance", self.importance),
            ("recency", self.recency),
            ("lexical", self.lexical),
            ("entity", self.entity),
        ]
        .into_iter()
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.forge")
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_gemini_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_max_iterations() -> usize {
    10
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_category_order() -> Vec<String> {
    ["inbox", "ideas", "customers", "research", "decisions", "archive"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_results() -> usize {
    15
}

fn default_recency_scale_days() -> f64 {
    30.0
}

fn default_entity_match_increment() -> f64 {
    0.5
}

fn default_importance_weight() -> f64 {
    0.3
}

fn default_recency_weight() -> f64 {
    0.2
}

fn default_lexical_weight() -> f64 {
    0.3
}

fn default_entity_weight() -> f64 {
    0.2
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            base_url: default_anthropic_base_url(),
            model: default_anthropic_model(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.forge/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (invalid paths, out-of-range values)
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;
        Self::load_or_create_at(&config_path)
    }

    /// Load configuration from `path`, writing defaults there first if missing
    pub fn load_or_create_at(path: &Path) -> Result<Self, EngineError> {
        if path.exists() {
            Self::load_from_path(path)
        } else {
            Self::create_default(path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
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

        // Serialize before processing so the file keeps the portable ~ paths
        let template = Self::default_config();
        let toml_string = toml::to_string_pretty(&template)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        let mut config = template;
        config.validate_and_process()?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.forge/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".forge").join("config.toml"))
    }

    /// Create a default configuration (paths not yet expanded)
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                workspace: PathBuf::from("~/forge-workspace"),
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig {
                default_provider: "anthropic".to_string(),
                max_tokens: default_max_tokens(),
                anthropic: AnthropicConfig::default(),
                gemini: GeminiConfig::default(),
            },
            agent: AgentConfig::default(),
            workspace: WorkspaceConfig::default(),
            memory: MemoryConfig::default(),
        }
    }

    /// Default configuration rooted at explicit directories, already validated
    pub fn for_directories(workspace: &Path, data_dir: &Path) -> Result<Self, EngineError> {
        let mut config = Self::default_config();
        config.core.workspace = workspace.to_path_buf();
        config.core.data_dir = data_dir.to_path_buf();
        config.validate_and_process()?;
        Ok(config)
    }

    /// Path of the SQLite database inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("forge.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerations and numeric ranges
    /// - Expands ~ in paths
    /// - Canonicalizes the workspace, creating it if needed
    /// - Creates the data directory if needed
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if !SUPPORTED_PROVIDERS.contains(&self.llm.default_provider.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid default provider '{}'. Must be one of: {}",
                self.llm.default_provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if self.llm.max_tokens == 0 {
            return Err(EngineError::Config(
                "max_tokens must be at least 1".to_string(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(EngineError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.agent.llm_timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.memory.max_results == 0 {
            return Err(EngineError::Config(
                "memory.max_results must be at least 1".to_string(),
            ));
        }
        if self.memory.recency_scale_days.is_nan() || self.memory.recency_scale_days <= 0.0 {
            return Err(EngineError::Config(
                "memory.recency_scale_days must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.memory.entity_match_increment) {
            return Err(EngineError::Config(
                "memory.entity_match_increment must be between 0.0 and 1.0".to_string(),
            ));
        }
        for (name, weight) in self.memory.weights.iter() {
            if !(0.0..=1.0).contains(&weight) {
                return Err(EngineError::Config(format!(
                    "memory.weights.{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        self.workspace.category_order = self
            .workspace
            .category_order
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();

        // Expand and validate workspace path
        self.core.workspace = expand_path(&self.core.workspace)?;
        self.core.workspace = canonicalize_or_create(&self.core.workspace)?;

        if !self.core.workspace.is_dir() {
            return Err(EngineError::Config(format!(
                "Workspace path is not a directory: {:?}",
                self.core.workspace
            )));
        }

        // Expand and validate data directory
        self.core.data_dir = expand_path(&self.core.data_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
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

/// Canonicalize path, creating it if it doesn't exist
fn canonicalize_or_create(path: &Path) -> Result<PathBuf, EngineError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| {
            EngineError::Config(format!("Failed to create directory {:?}: {}", path, e))
        })?;
    }

    path.canonicalize()
        .map_err(|e| EngineError::PathCanonicalization(path.to_path_buf(), e.to_string()))
}
