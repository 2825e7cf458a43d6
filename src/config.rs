//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::query::{ExecuteOptions, PollConfig};
use crate::sql::SqlPollConfig;
use crate::transport::{TransportConfig, TransportError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub sql_runner: SqlRunnerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,

    pub project_uuid: Option<String>,

    pub access_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            project_uuid: None,
            access_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            base_url: self.url.clone(),
            access_token: self.access_token.clone(),
            request_timeout_ms: self.request_timeout_secs * 1000,
        }
    }
}

/// Metric query execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_query_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_backoff_start")]
    pub poll_backoff_start_ms: u64,

    #[serde(default = "default_backoff_max")]
    pub poll_backoff_max_ms: u64,
}

fn default_query_timeout() -> u64 {
    300 // 5 minutes
}

fn default_page_size() -> u32 {
    500
}

fn default_backoff_start() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    2000
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_query_timeout(),
            page_size: default_page_size(),
            poll_backoff_start_ms: default_backoff_start(),
            poll_backoff_max_ms: default_backoff_max(),
        }
    }
}

impl QueryConfig {
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            backoff_start: Duration::from_millis(self.poll_backoff_start_ms),
            backoff_max: Duration::from_millis(self.poll_backoff_max_ms),
            page_size: self.page_size,
        }
    }

    /// Execution options with the configured timeout and no cache invalidation
    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions::default().timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// Raw SQL runner settings
#[derive(Debug, Clone, Deserialize)]
pub struct SqlRunnerConfig {
    #[serde(default = "default_sql_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_sql_max_poll")]
    pub max_poll_secs: u64,
}

fn default_sql_poll_interval() -> u64 {
    500
}

fn default_sql_max_poll() -> u64 {
    300
}

impl Default for SqlRunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_sql_poll_interval(),
            max_poll_secs: default_sql_max_poll(),
        }
    }
}

impl SqlRunnerConfig {
    pub fn poll_config(&self) -> SqlPollConfig {
        SqlPollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_secs(self.max_poll_secs),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("lightquery").join("config.toml")),
            Some(PathBuf::from("./lightquery.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Project the client is bound to
    pub fn project_uuid(&self) -> Result<&str, ConfigError> {
        self.client
            .project_uuid
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::Missing("client.project_uuid"))
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LIGHTQUERY_URL") {
            self.client.url = url;
        }
        if let Some(project) = lookup("LIGHTQUERY_PROJECT_UUID") {
            self.client.project_uuid = Some(project);
        }
        if let Some(token) = lookup("LIGHTQUERY_ACCESS_TOKEN") {
            self.client.access_token = Some(token);
        }

        if let Some(level) = lookup("LIGHTQUERY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LIGHTQUERY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to build HTTP transport: {0}")]
    Transport(#[from] TransportError),
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. `format = "json"`
/// selects structured output; anything else is human-readable.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    let json = config.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# lightquery Configuration
#
# Environment variables override these settings:
# - LIGHTQUERY_URL
# - LIGHTQUERY_PROJECT_UUID
# - LIGHTQUERY_ACCESS_TOKEN
# - LIGHTQUERY_LOG_LEVEL
# - LIGHTQUERY_LOG_FORMAT

[client]
# Analytics server URL
url = "http://localhost:8080"

# Project to query
# project_uuid = "3675b69e-8324-4110-bdca-059031aa8da3"

# Personal access token, sent as "Authorization: ApiKey <token>"
# access_token = ""

# Per-request timeout in seconds
request_timeout_secs = 30

[query]
# How long to wait for a metric query to finish (seconds)
timeout_secs = 300

# Rows per result page
page_size = 500

# Status poll backoff: first wait and cap (ms)
poll_backoff_start_ms = 100
poll_backoff_max_ms = 2000

[sql_runner]
# Fixed interval between SQL job status polls (ms)
poll_interval_ms = 500

# How long to wait for a SQL job (seconds)
max_poll_secs = 300

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.client.url, "http://localhost:8080");
        assert_eq!(config.query.timeout_secs, 300);
        assert_eq!(config.query.page_size, 500);
        assert_eq!(config.sql_runner.poll_interval_ms, 500);
        assert_eq!(config.logging.format, "pretty");
        assert!(matches!(config.project_uuid(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_load_partial_file() {
        let file = write_config(
            r#"
[client]
url = "https://analytics.example.com"
project_uuid = "proj-1"

[query]
timeout_secs = 60
"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.client.url, "https://analytics.example.com");
        assert_eq!(config.project_uuid().unwrap(), "proj-1");
        assert_eq!(config.client.request_timeout_secs, 30);
        assert_eq!(config.query.timeout_secs, 60);
        assert_eq!(config.query.poll_backoff_max_ms, 2000);

        let options = config.query.execute_options();
        assert_eq!(options.timeout, Duration::from_secs(60));
        assert!(!options.invalidate_cache);
    }

    #[test]
    fn test_parse_error() {
        let file = write_config("[client\nurl = ");
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/lightquery.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_generated_config_parses() {
        let file = write_config(&generate_default_config());
        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.query.poll_backoff_start_ms, 100);
        assert_eq!(config.sql_runner.max_poll_secs, 300);
        assert_eq!(config.logging.level, "info");
        assert!(config.client.project_uuid.is_none());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LIGHTQUERY_URL", "http://other:9000"),
            ("LIGHTQUERY_PROJECT_UUID", "proj-2"),
            ("LIGHTQUERY_ACCESS_TOKEN", "secret"),
            ("LIGHTQUERY_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.client.url, "http://other:9000");
        assert_eq!(config.project_uuid().unwrap(), "proj-2");
        assert_eq!(config.client.access_token.as_deref(), Some("secret"));
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_derived_settings() {
        let mut config = Config::default();
        config.client.access_token = Some("t".to_string());
        config.client.request_timeout_secs = 5;
        config.query.page_size = 100;

        let transport = config.client.transport_config();
        assert_eq!(transport.request_timeout_ms, 5000);
        assert_eq!(transport.access_token.as_deref(), Some("t"));

        let poll = config.query.poll_config();
        assert_eq!(poll.backoff_start, Duration::from_millis(100));
        assert_eq!(poll.page_size, 100);

        let sql = config.sql_runner.poll_config();
        assert_eq!(sql.interval, Duration::from_millis(500));
        assert_eq!(sql.max_wait, Duration::from_secs(300));
    }
}
