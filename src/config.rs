use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub watcher: WatcherConfig,
    pub payments: PaymentConfig,
    pub logging: LoggingConfig,
}

/// toncenter client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// toncenter v2 base URL, with trailing slash
    pub endpoint: String,
    /// Sent as X-API-Key when present
    pub api_key: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Attempts per request for transient failures (1 = no retry)
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path
    pub path: String,
    /// Enable WAL mode for better concurrency
    pub enable_wal_mode: bool,
    /// Database busy timeout in milliseconds
    pub busy_timeout_ms: u32,
}

/// Block watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Delay between masterchain polls in milliseconds
    pub poll_interval_ms: u64,
    /// Start after this seqno instead of the stored cursor or the current head
    pub start_seqno: Option<u32>,
    /// Dispatch shard blocks in addition to masterchain blocks
    pub dispatch_shards: bool,
}

/// Payment watcher and pending-payment book configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Address to watch for inbound payments; payment watching is off when unset
    pub address: Option<String>,
    /// Delay between transaction-history polls in milliseconds
    pub poll_interval_ms: u64,
    /// Number of most recent transactions fetched per poll
    pub result_limit: u32,
    /// Interval of the expired-entry sweep in seconds
    pub sweep_interval_seconds: u64,
    /// Default lifetime of an expected payment in seconds (0 = never expires)
    pub default_ttl_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://toncenter.com/api/v2/".to_string(),
            api_key: None,
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 500,
            max_retry_delay_ms: 5_000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./watcher.db".to_string(),
            enable_wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            start_seqno: None,
            dispatch_shards: true,
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            address: None,
            poll_interval_ms: 1_000,
            result_limit: 30,
            sweep_interval_seconds: 10,
            default_ttl_seconds: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl PaymentConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        (self.default_ttl_seconds > 0).then(|| Duration::from_secs(self.default_ttl_seconds))
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

impl AppConfig {
    /// Load configuration from file and environment variables
    /// Environment variables take precedence over file values
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the TOML file named by CONFIG_FILE (default config.toml)
    pub fn load_from_file() -> Result<Self, ConfigError> {
        let config_path = env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_path(&config_path)
    }

    /// Missing files yield the defaults; unreadable or malformed files are errors
    pub fn load_from_path(config_path: &str) -> Result<Self, ConfigError> {
        if !Path::new(config_path).exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .map_err(|_| ConfigError::FileNotFound(config_path.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // API configuration
        if let Ok(endpoint) = env::var("TONCENTER_URL") {
            self.api.endpoint = endpoint;
        }
        if let Ok(api_key) = env::var("TONCENTER_API_KEY") {
            self.api.api_key = Some(api_key);
        }
        if let Ok(timeout) = env::var("TONCENTER_TIMEOUT_SECONDS") {
            self.api.timeout_seconds = parse_env("TONCENTER_TIMEOUT_SECONDS", timeout)?;
        }
        if let Ok(retries) = env::var("TONCENTER_MAX_RETRIES") {
            self.api.max_retries = parse_env("TONCENTER_MAX_RETRIES", retries)?;
        }

        // Database configuration
        if let Ok(path) = env::var("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(wal_mode) = env::var("DATABASE_WAL_MODE") {
            self.database.enable_wal_mode = parse_env("DATABASE_WAL_MODE", wal_mode)?;
        }

        // Block watcher configuration
        if let Ok(interval) = env::var("BLOCK_POLL_INTERVAL_MS") {
            self.watcher.poll_interval_ms = parse_env("BLOCK_POLL_INTERVAL_MS", interval)?;
        }
        if let Ok(seqno) = env::var("START_SEQNO") {
            self.watcher.start_seqno = Some(parse_env("START_SEQNO", seqno)?);
        }

        // Payment configuration
        if let Ok(address) = env::var("PAYMENT_ADDRESS") {
            self.payments.address = Some(address);
        }
        if let Ok(interval) = env::var("PAYMENT_POLL_INTERVAL_MS") {
            self.payments.poll_interval_ms = parse_env("PAYMENT_POLL_INTERVAL_MS", interval)?;
        }
        if let Ok(limit) = env::var("PAYMENT_RESULT_LIMIT") {
            self.payments.result_limit = parse_env("PAYMENT_RESULT_LIMIT", limit)?;
        }

        // Logging configuration
        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api.endpoint.starts_with("http://") && !self.api.endpoint.starts_with("https://") {
            return Err(ConfigError::InvalidUrl(self.api.endpoint.clone()));
        }

        if self.api.timeout_seconds == 0 || self.api.timeout_seconds > 300 {
            return Err(ConfigError::InvalidValue {
                key: "api.timeout_seconds".to_string(),
                value: self.api.timeout_seconds.to_string(),
            });
        }

        if self.api.max_retries == 0 || self.api.max_retries > 20 {
            return Err(ConfigError::InvalidValue {
                key: "api.max_retries".to_string(),
                value: self.api.max_retries.to_string(),
            });
        }

        if self.watcher.poll_interval_ms == 0 || self.watcher.poll_interval_ms > 300_000 {
            return Err(ConfigError::InvalidValue {
                key: "watcher.poll_interval_ms".to_string(),
                value: self.watcher.poll_interval_ms.to_string(),
            });
        }

        if self.payments.poll_interval_ms == 0 || self.payments.poll_interval_ms > 300_000 {
            return Err(ConfigError::InvalidValue {
                key: "payments.poll_interval_ms".to_string(),
                value: self.payments.poll_interval_ms.to_string(),
            });
        }

        // toncenter caps getTransactions at 100 per call
        if self.payments.result_limit == 0 || self.payments.result_limit > 100 {
            return Err(ConfigError::InvalidValue {
                key: "payments.result_limit".to_string(),
                value: self.payments.result_limit.to_string(),
            });
        }

        if self.payments.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "payments.sweep_interval_seconds".to_string(),
                value: self.payments.sweep_interval_seconds.to_string(),
            });
        }

        if let Some(address) = &self.payments.address {
            if address.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "payments.address".to_string(),
                    value: address.clone(),
                });
            }
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: self.logging.level.clone(),
            });
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: self.logging.format.clone(),
            });
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "database.path".to_string(),
                value: self.database.path.clone(),
            });
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample_config() -> Result<String, ConfigError> {
        toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Parsing(e.to_string()))
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parsing(e.to_string()))?;
        fs::write(path, content)
            .map_err(|_| ConfigError::FileNotFound(path.to_string()))?;
        Ok(())
    }
}
