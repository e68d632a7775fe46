use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::pipeline::ConfigError;

const CONFIG_DIR: &str = ".testgen";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub functions: FunctionConfig,

    #[serde(default)]
    pub streaming: StreamingConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Source file extensions to process
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Path substrings to exclude (in addition to .gitignore)
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,

    /// Maximum source file size in megabytes
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            exclude_patterns: default_exclude_patterns(),
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    vec![
        "c".to_string(),
        "cc".to_string(),
        "cpp".to_string(),
        "cxx".to_string(),
        "h".to_string(),
        "hpp".to_string(),
        "hxx".to_string(),
    ]
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "build".to_string(),
        "third_party".to_string(),
        "vendor".to_string(),
        ".git".to_string(),
    ]
}

fn default_max_file_size_mb() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionConfig {
    /// Skip functions with static linkage
    #[serde(default = "default_true")]
    pub skip_static: bool,

    /// Skip functions whose names look like existing tests
    #[serde(default = "default_true")]
    pub skip_test_functions: bool,

    /// Minimum parameter count for a function to be considered
    #[serde(default)]
    pub min_parameters: usize,

    /// Maximum parameter count for a function to be considered
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            skip_static: true,
            skip_test_functions: true,
            min_parameters: 0,
            max_parameters: default_max_parameters(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_parameters() -> usize {
    12
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Capacity of each inter-stage queue
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Concurrent file extraction workers
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,

    /// Concurrent generation workers
    #[serde(default = "default_max_concurrent_functions")]
    pub max_concurrent_functions: usize,

    /// Simultaneous in-flight LLM calls
    #[serde(default = "default_max_concurrent_llm_calls")]
    pub max_concurrent_llm_calls: usize,

    /// Whole-run safety timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Retries after a failed generation attempt
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Feed pipeline events into the Prometheus registry
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_concurrent_files: default_max_concurrent_files(),
            max_concurrent_functions: default_max_concurrent_functions(),
            max_concurrent_llm_calls: default_max_concurrent_llm_calls(),
            timeout_seconds: default_timeout_seconds(),
            retry_attempts: default_retry_attempts(),
            enable_metrics: true,
        }
    }
}

impl StreamingConfig {
    /// Reject zero bounds before any queue or worker pool is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_queue_size == 0 {
            return Err(ConfigError::InvalidQueueSize);
        }
        if self.max_concurrent_files == 0 {
            return Err(ConfigError::InvalidFileConcurrency);
        }
        if self.max_concurrent_functions == 0 {
            return Err(ConfigError::InvalidFunctionConcurrency);
        }
        if self.max_concurrent_llm_calls == 0 {
            return Err(ConfigError::InvalidLlmConcurrency);
        }
        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_max_queue_size() -> usize {
    100
}

fn default_max_concurrent_files() -> usize {
    4
}

fn default_max_concurrent_functions() -> usize {
    8
}

fn default_max_concurrent_llm_calls() -> usize {
    4
}

fn default_timeout_seconds() -> u64 {
    600
}

fn default_retry_attempts() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat completion model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Override the provider endpoint (for proxies or local servers)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the configured environment variable.
    /// The key itself never lives in the config file.
    pub fn load_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).with_context(|| {
            format!(
                "API key environment variable {} is not set",
                self.api_key_env
            )
        })
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for generated test files, relative to the project root
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "generated_tests".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to a rotating file under the log directory
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Also log to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,

    /// File log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory, relative to the project root unless absolute
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,

    /// Rotation strategy: hourly, daily, minutely, never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stderr: true,
            level: default_log_level(),
            directory: default_log_directory(),
            file_prefix: default_log_prefix(),
            rotation: default_log_rotation(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".testgen/logs")
}

fn default_log_prefix() -> String {
    "testgen.log".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Config {
    /// Load configuration from the .testgen directory
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to the .testgen directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Get the path to the .testgen directory
    pub fn testgen_dir(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR)
    }

    /// Resolve the output directory against the project root
    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.output.directory)
    }

    /// Check if testgen is initialized in the given directory
    pub fn is_initialized(root: &Path) -> bool {
        Self::testgen_dir(root).exists()
    }
}
