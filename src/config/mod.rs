//! Configuration management for release-gate
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables. The resulting [`Config`] is built
//! once at startup and handed to every component.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable prefix used by [`Config::from_env`]
const ENV_PREFIX: &str = "RELEASE_GATE_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream (GitHub) configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Durable store for rate limit records. `None` disables rate limiting.
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// OpenTelemetry configuration
    #[serde(default)]
    pub otel: OtelConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix `RELEASE_GATE_`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = env("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env("SERVER_PORT") {
            config.server.port = parse_env("SERVER_PORT", &port)?;
        }

        if let Some(token) = env("GITHUB_TOKEN") {
            config.upstream.token = token;
        }
        if let Some(repo) = env("GITHUB_REPO") {
            config.upstream.repo = repo;
        }
        if let Some(api_url) = env("GITHUB_API_URL") {
            config.upstream.api_url = api_url;
        }
        if let Some(timeout) = env("UPSTREAM_TIMEOUT_SECS") {
            config.upstream.timeout_secs = parse_env("UPSTREAM_TIMEOUT_SECS", &timeout)?;
        }

        if let Some(password) = env("PASSWORD") {
            config.auth.password = password;
        }
        if let Some(max) = env("MAX_FAILED_ATTEMPTS") {
            config.auth.rate_limit.max_failed_attempts = parse_env("MAX_FAILED_ATTEMPTS", &max)?;
        }
        if let Some(secs) = env("BLOCK_DURATION_SECS") {
            let secs: u64 = parse_env("BLOCK_DURATION_SECS", &secs)?;
            config.auth.rate_limit.block_duration_secs = secs;
            config.auth.rate_limit.record_ttl_secs = secs;
        }
        if let Some(secs) = env("RECORD_TTL_SECS") {
            config.auth.rate_limit.record_ttl_secs = parse_env("RECORD_TTL_SECS", &secs)?;
        }

        if let Some(url) = env("STORE_URL") {
            config.store = Some(StoreConfig::from_url(&url)?);
        }

        if let Some(level) = env("LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Some(enabled) = env("OTEL_ENABLED") {
            config.otel.enabled = enabled.parse().unwrap_or(false);
        }
        if let Some(endpoint) = env("OTEL_ENDPOINT") {
            config.otel.endpoint = Some(endpoint);
        }

        Ok(config)
    }

    /// Check that the values the proxy cannot run without are present and well-formed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.password.is_empty() {
            return Err(ConfigError::MissingRequired("auth.password".to_string()));
        }
        if self.upstream.token.is_empty() {
            return Err(ConfigError::MissingRequired("upstream.token".to_string()));
        }
        if self.upstream.repo.is_empty() {
            return Err(ConfigError::MissingRequired("upstream.repo".to_string()));
        }

        let well_formed = matches!(
            self.upstream.repo.split_once('/'),
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
        );
        if !well_formed {
            return Err(ConfigError::InvalidValue(format!(
                "upstream.repo must be owner/name, got '{}'",
                self.upstream.repo
            )));
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "upstream.timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.auth.rate_limit.max_failed_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.rate_limit.max_failed_attempts must be at least 1".to_string(),
            ));
        }

        let limits = &self.auth.rate_limit;
        if limits.block_duration_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.rate_limit.block_duration_secs must be at least 1".to_string(),
            ));
        }
        if limits.record_ttl_secs < limits.block_duration_secs {
            return Err(ConfigError::InvalidValue(
                "auth.rate_limit.record_ttl_secs must not be shorter than block_duration_secs"
                    .to_string(),
            ));
        }

        if let Some(store) = &self.store {
            if store.backend == StoreBackend::Redis && store.url.is_none() {
                return Err(ConfigError::MissingRequired("store.url".to_string()));
            }
            if store.sweep_interval_secs == 0 {
                return Err(ConfigError::InvalidValue(
                    "store.sweep_interval_secs must be at least 1".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn env(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid value for {}{}", ENV_PREFIX, name)))
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Upstream release API configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Server-held access token. Never sent to callers.
    #[serde(default)]
    pub token: String,

    /// Target repository in `owner/name` form
    #[serde(default)]
    pub repo: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_upstream_timeout")]
    pub timeout_secs: u64,

    /// User-Agent sent upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: String::new(),
            repo: String::new(),
            timeout_secs: default_upstream_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_upstream_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    concat!("release-gate/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Shared secret expected in the `X-Password` header
    #[serde(default)]
    pub password: String,

    /// Request headers consulted, in order, to derive the client identity
    #[serde(default = "default_identity_headers")]
    pub identity_headers: Vec<String>,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: AuthRateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            identity_headers: default_identity_headers(),
            rate_limit: AuthRateLimitConfig::default(),
        }
    }
}

fn default_identity_headers() -> Vec<String> {
    vec![
        "CF-Connecting-IP".to_string(),
        "X-Forwarded-For".to_string(),
        "X-Real-IP".to_string(),
    ]
}

/// Rate limiting configuration for authentication failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthRateLimitConfig {
    /// Number of failed attempts after which an identity is blocked
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    /// Block window, refreshed on every failure (in seconds)
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,

    /// Store-side expiry of a record (in seconds)
    #[serde(default = "default_record_ttl")]
    pub record_ttl_secs: u64,
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: default_max_failed_attempts(),
            block_duration_secs: default_block_duration(),
            record_ttl_secs: default_record_ttl(),
        }
    }
}

fn default_max_failed_attempts() -> u32 {
    5
}

fn default_block_duration() -> u64 {
    900
}

fn default_record_ttl() -> u64 {
    900
}

/// Durable store backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; single instance only
    #[default]
    Memory,
    /// Redis / KeyDB
    Redis,
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Backend kind
    #[serde(default)]
    pub backend: StoreBackend,

    /// Connection URL (required for `redis`)
    #[serde(default)]
    pub url: Option<String>,

    /// Key prefix
    #[serde(default = "default_store_prefix")]
    pub prefix: String,

    /// How often the memory backend purges expired records (in seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: None,
            prefix: default_store_prefix(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StoreConfig {
    /// Select the backend from a URL scheme
    ///
    /// `memory://` selects the in-process store; `redis://` and `rediss://`
    /// select Redis. Any other scheme is rejected.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        let backend = match url.split_once("://").map(|(scheme, _)| scheme) {
            Some("memory") => StoreBackend::Memory,
            Some("redis") | Some("rediss") => StoreBackend::Redis,
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "store URL must use memory://, redis:// or rediss://, got '{}'",
                    url
                )))
            }
        };

        Ok(Self {
            backend,
            url: (backend == StoreBackend::Redis).then(|| url.to_string()),
            ..Default::default()
        })
    }
}

fn default_store_prefix() -> String {
    "ratelimit:".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

/// OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtelConfig {
    /// Whether OpenTelemetry is enabled
    #[serde(default)]
    pub enabled: bool,

    /// OTLP endpoint URL
    pub endpoint: Option<String>,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            service_name: default_service_name(),
        }
    }
}

fn default_service_name() -> String {
    "release-gate".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`json` or `pretty`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
