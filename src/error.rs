use thiserror::Error;

pub use crate::database::DbError;

/// Main error type for the TON watcher
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Remote API error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Storage error: {0}")]
    Database(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Invalid watcher state: {0}")]
    Lifecycle(String),
}

/// Failures reported by the toncenter API or the transport underneath it
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request rejected by the API: {0}")]
    Validation(String),

    #[error("Lite server timeout")]
    Timeout,

    #[error("Rate limit exceeded, retry after {seconds} seconds")]
    RateLimit { seconds: u64 },

    #[error("API failure (status {status}): {message}")]
    Generic { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Configuration parsing failed: {0}")]
    Parsing(String),

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, WatcherError>;

/// How the polling loops react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network timeout, remote 5xx, rate limiting. Retried on the next tick.
    TransientRemote,
    /// The remote rejected the request shape. Logged as a latent bug.
    MalformedRequest,
    /// A handler returned an error or panicked. Isolated to that handler.
    Handler,
    /// The durable store failed. The tick aborts without advancing.
    Storage,
    /// Bad configuration or lifecycle misuse.
    Configuration,
}

/// Error severity levels for logging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl RpcError {
    /// Whether the same request may succeed if simply issued again later
    pub fn is_transient(&self) -> bool {
        match self {
            RpcError::Timeout | RpcError::RateLimit { .. } | RpcError::Generic { .. } => true,
            RpcError::Http(e) => !e.is_decode() && !e.is_builder(),
            RpcError::Validation(_) | RpcError::Json(_) | RpcError::InvalidResponse(_) => false,
        }
    }
}

impl WatcherError {
    pub fn class(&self) -> FailureClass {
        match self {
            WatcherError::Rpc(e) if e.is_transient() => FailureClass::TransientRemote,
            WatcherError::Rpc(_) => FailureClass::MalformedRequest,
            WatcherError::Database(_) => FailureClass::Storage,
            WatcherError::Handler(_) => FailureClass::Handler,
            WatcherError::Config(_) | WatcherError::Lifecycle(_) => FailureClass::Configuration,
        }
    }

    /// Get the severity level of an error
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WatcherError::Config(_) => ErrorSeverity::Critical,
            WatcherError::Database(DbError::Connection(_)) => ErrorSeverity::Critical,

            WatcherError::Database(_) => ErrorSeverity::High,
            WatcherError::Rpc(RpcError::Validation(_)) => ErrorSeverity::High,
            WatcherError::Lifecycle(_) => ErrorSeverity::High,

            WatcherError::Rpc(RpcError::Timeout) => ErrorSeverity::Medium,
            WatcherError::Rpc(RpcError::RateLimit { .. }) => ErrorSeverity::Medium,
            WatcherError::Handler(_) => ErrorSeverity::Medium,

            _ => ErrorSeverity::Medium,
        }
    }

    /// Check if the error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), FailureClass::TransientRemote)
    }

    /// Get suggested retry delay in seconds for recoverable errors
    pub fn retry_delay(&self) -> Option<u64> {
        if !self.is_recoverable() {
            return None;
        }

        match self {
            WatcherError::Rpc(RpcError::RateLimit { seconds }) => Some(*seconds),
            WatcherError::Rpc(RpcError::Timeout) => Some(1),
            _ => Some(2),
        }
    }
}
