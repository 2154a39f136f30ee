use serde::{Deserialize, Serialize};
use std::{env, fmt, fs, path::Path, path::PathBuf, str::FromStr};
use thiserror::Error;

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported configuration format for {0}; use yaml, json or toml")]
    UnsupportedFormat(PathBuf),
    #[error("invalid {name} value: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
            allow_credentials: false,
            max_age_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL clients use to reach the server.
    pub public_base_url: String,
    pub request_id_header: String,
    pub cors: CorsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
            request_id_header: "x-request-id".to_string(),
            cors: CorsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL; messages are kept in memory when unset.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Server-side change fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Events buffered per conversation before slow subscribers lag.
    pub channel_capacity: usize,
    pub heartbeat_seconds: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            heartbeat_seconds: 15,
        }
    }
}

/// Client-side synchronizer tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    /// Reconnect attempts before giving up; unlimited when unset.
    pub max_retries: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            retry_base_ms: 1_000,
            retry_cap_ms: 30_000,
            max_retries: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static bearer token required on API routes when set.
    pub bearer_token: Option<String>,
}

/// The main configuration structure for LiveSync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Generates a default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// Loads the configuration from a file, environment variables, or defaults.
    ///
    /// Environment variables only apply to values the file left at their
    /// default; `port_override` always wins.
    ///
    /// # Errors
    /// Returns [`ConfigError`] when the file cannot be read or parsed, an
    /// environment variable is malformed, or the result fails validation.
    pub fn load_config(
        config_path: Option<PathBuf>,
        port_override: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_file(&path)?,
            None => Self::with_defaults(),
        };

        config.apply_env_overrides()?;

        if let Some(port) = port_override {
            config.server.port = port;
        }

        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Parses a configuration file, choosing the format by extension.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for unreadable files, parse failures and
    /// unknown extensions.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml" | "yml") => Ok(serde_yml::from_str(&content)?),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let defaults = Self::with_defaults();

        if self.server.port == defaults.server.port
            && let Ok(port) = env::var("LIVESYNC_SERVER_PORT")
        {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "LIVESYNC_SERVER_PORT",
                reason: "must be a number between 1 and 65535".to_string(),
            })?;
        }
        if self.server.public_base_url == defaults.server.public_base_url
            && let Ok(url) = env::var("LIVESYNC_SERVER_URL")
        {
            self.server.public_base_url = url;
        }
        if self.database.url.is_none()
            && let Ok(url) = env::var("LIVESYNC_DATABASE_URL")
        {
            self.database.url = Some(url);
        }
        if self.logging.level == defaults.logging.level
            && let Ok(level) = env::var("LIVESYNC_LOG_LEVEL")
        {
            self.logging.level = level;
        }
        if self.logging.format == defaults.logging.format
            && let Ok(format) = env::var("LIVESYNC_LOG_FORMAT")
        {
            self.logging.format = format.parse().map_err(|reason| ConfigError::InvalidEnv {
                name: "LIVESYNC_LOG_FORMAT",
                reason,
            })?;
        }
        if self.auth.bearer_token.is_none()
            && let Ok(token) = env::var("LIVESYNC_BEARER_TOKEN")
        {
            self.auth.bearer_token = Some(token);
        }

        Ok(())
    }

    /// Validate the complete configuration.
    ///
    /// # Errors
    /// Returns every problem found, one message per entry.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("Invalid server port. Must be greater than 0.".to_string());
        }
        if self.server.host.trim().is_empty() {
            errors.push("server.host must not be empty".to_string());
        }
        if !(self.server.public_base_url.starts_with("http://")
            || self.server.public_base_url.starts_with("https://"))
        {
            errors.push(format!(
                "server.public_base_url must be an http(s) URL, got '{}'",
                self.server.public_base_url
            ));
        }
        if self.server.request_id_header.trim().is_empty() {
            errors.push("server.request_id_header must not be empty".to_string());
        }
        if self.server.cors.allow_credentials
            && self.server.cors.allowed_origins.iter().any(|o| o == "*")
        {
            errors.push("server.cors cannot allow credentials with a wildcard origin".to_string());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be greater than 0".to_string());
        }
        if self.logging.level.trim().is_empty() {
            errors.push("logging.level must not be empty".to_string());
        }
        if self.feed.channel_capacity == 0 {
            errors.push("feed.channel_capacity must be greater than 0".to_string());
        }
        if self.feed.heartbeat_seconds == 0 {
            errors.push("feed.heartbeat_seconds must be greater than 0".to_string());
        }
        if self.sync.page_size == 0 {
            errors.push("sync.page_size must be greater than 0".to_string());
        }
        if self.sync.retry_base_ms == 0 {
            errors.push("sync.retry_base_ms must be greater than 0".to_string());
        }
        if self.sync.retry_cap_ms < self.sync.retry_base_ms {
            errors.push("sync.retry_cap_ms must not be below sync.retry_base_ms".to_string());
        }
        if self
            .auth
            .bearer_token
            .as_deref()
            .is_some_and(|token| token.trim().is_empty())
        {
            errors.push("auth.bearer_token must not be blank when set".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn cleanup_env_vars() {
        unsafe {
            env::remove_var("LIVESYNC_SERVER_PORT");
            env::remove_var("LIVESYNC_SERVER_URL");
            env::remove_var("LIVESYNC_DATABASE_URL");
            env::remove_var("LIVESYNC_LOG_LEVEL");
            env::remove_var("LIVESYNC_LOG_FORMAT");
            env::remove_var("LIVESYNC_BEARER_TOKEN");
        }
    }

    #[test]
    fn test_config_with_defaults() {
        let config = Config::with_defaults();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_id_header, "x-request-id");
        assert!(config.database.url.is_none());
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.sync.retry_base_ms, 1_000);
        assert_eq!(config.sync.retry_cap_ms, 30_000);
        assert!(config.sync.max_retries.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_config_with_port_override() {
        cleanup_env_vars();
        let config = Config::load_config(None, Some(3000)).unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    #[serial]
    fn test_load_config_with_environment_variables() {
        cleanup_env_vars();
        unsafe {
            env::set_var("LIVESYNC_SERVER_PORT", "9090");
            env::set_var("LIVESYNC_DATABASE_URL", "postgres://custom@host/db");
            env::set_var("LIVESYNC_LOG_LEVEL", "debug");
            env::set_var("LIVESYNC_LOG_FORMAT", "json");
            env::set_var("LIVESYNC_BEARER_TOKEN", "secret");
        }

        let config = Config::load_config(None, None).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(
            config.database.url.as_deref(),
            Some("postgres://custom@host/db")
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.auth.bearer_token.as_deref(), Some("secret"));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_port_override_beats_environment() {
        cleanup_env_vars();
        unsafe {
            env::set_var("LIVESYNC_SERVER_PORT", "5555");
        }

        let config = Config::load_config(None, Some(7777)).unwrap();
        assert_eq!(config.server.port, 7777);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_invalid_port_environment() {
        cleanup_env_vars();
        unsafe {
            env::set_var("LIVESYNC_SERVER_PORT", "not-a-port");
        }

        let err = Config::load_config(None, None).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                name: "LIVESYNC_SERVER_PORT",
                ..
            }
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_file_values_win_over_environment() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;
        let config_file = temp_dir.path().join("livesync.yaml");
        fs::write(
            &config_file,
            r"
server:
  port: 4000
logging:
  level: trace
sync:
  page_size: 50
  max_retries: 3
",
        )?;
        unsafe {
            env::set_var("LIVESYNC_SERVER_PORT", "9999");
            env::set_var("LIVESYNC_LOG_LEVEL", "warn");
        }

        let config = Config::load_config(Some(config_file), None)?;

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.sync.page_size, 50);
        assert_eq!(config.sync.max_retries, Some(3));
        assert_eq!(config.feed, FeedConfig::default());

        cleanup_env_vars();
        Ok(())
    }

    #[test]
    #[serial]
    fn test_load_config_from_json_and_toml() -> Result<(), Box<dyn std::error::Error>> {
        cleanup_env_vars();
        let temp_dir = TempDir::new()?;

        let json_file = temp_dir.path().join("livesync.json");
        fs::write(
            &json_file,
            r#"{"server":{"port":4100},"feed":{"channel_capacity":8,"heartbeat_seconds":5}}"#,
        )?;
        let config = Config::load_config(Some(json_file), None)?;
        assert_eq!(config.server.port, 4100);
        assert_eq!(config.feed.channel_capacity, 8);

        let toml_file = temp_dir.path().join("livesync.toml");
        fs::write(
            &toml_file,
            "[server]\nport = 4200\n\n[auth]\nbearer_token = \"abc\"\n",
        )?;
        let config = Config::load_config(Some(toml_file), None)?;
        assert_eq!(config.server.port, 4200);
        assert_eq!(config.auth.bearer_token.as_deref(), Some("abc"));

        Ok(())
    }

    #[test]
    fn test_load_config_unsupported_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("livesync.ini");
        fs::write(&config_file, "port=1").unwrap();

        let err = Config::load_config(Some(config_file), None).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_config_nonexistent_file() {
        let err =
            Config::load_config(Some(PathBuf::from("/nonexistent/livesync.yaml")), None)
                .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_config_malformed_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("broken.yaml");
        fs::write(&config_file, "server: [unclosed").unwrap();

        let err = Config::load_config(Some(config_file), None).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = Config::with_defaults();
        config.server.port = 0;
        config.sync.retry_cap_ms = 10;
        config.server.cors.allow_credentials = true;
        config.auth.bearer_token = Some("  ".to_string());

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors[0].contains("Invalid server port"));
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert!("xml".parse::<LogFormat>().is_err());
        assert_eq!(LogFormat::Text.to_string(), "text");
    }
}
