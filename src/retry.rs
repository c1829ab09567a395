use std::time::Duration;
use tokio::time::sleep;

use crate::config::ApiConfig;
use crate::error::{FailureClass, RpcError, WatcherError};
use crate::logging::{ErrorLogger, LogContext};

/// Errors the retry loop knows how to classify
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;

    fn failure_class(&self) -> FailureClass;

    /// Minimum wait requested by the remote before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for RpcError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }

    fn failure_class(&self) -> FailureClass {
        if self.is_transient() {
            FailureClass::TransientRemote
        } else {
            FailureClass::MalformedRequest
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RpcError::RateLimit { seconds } => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

impl Retryable for WatcherError {
    fn is_retryable(&self) -> bool {
        self.is_recoverable()
    }

    fn failure_class(&self) -> FailureClass {
        self.class()
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            WatcherError::Rpc(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn from_api_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            initial_delay: Duration::from_millis(config.retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
            ..Self::default()
        }
    }

    /// A single attempt; failures surface immediately
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

/// Retry mechanism with exponential backoff and jitter
pub struct RetryManager {
    config: RetryConfig,
    operation_name: String,
}

impl RetryManager {
    pub fn new(operation_name: &str, config: RetryConfig) -> Self {
        Self {
            config,
            operation_name: operation_name.to_string(),
        }
    }

    /// Execute an operation, retrying recoverable failures up to
    /// `max_attempts` times
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Retryable,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.run(operation, Some(self.config.max_attempts)).await
    }

    /// Execute an operation, retrying recoverable failures until it succeeds.
    ///
    /// The backoff stays capped at `max_delay`; a non-recoverable failure
    /// is returned at once.
    pub async fn execute_until_ok<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        E: Retryable,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.run(operation, None).await
    }

    async fn run<T, E, F, Fut>(&self, operation: F, max_attempts: Option<u32>) -> Result<T, E>
    where
        E: Retryable,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let started = std::time::Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let error = match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        ErrorLogger::log_recovery_success(
                            &self.operation_name,
                            attempt,
                            started.elapsed().as_millis() as u64,
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                LogContext::new("retry", &self.operation_name)
                    .with_retry_count(attempt)
                    .with_metadata("reason", serde_json::json!("non_recoverable"))
                    .debug(&format!("Non-recoverable error, not retrying: {}", error));
                return Err(error);
            }

            match max_attempts {
                Some(max) if attempt >= max => {
                    if max > 1 {
                        ErrorLogger::log_recovery_attempt(&error, error.failure_class(), attempt, max);
                    }
                    return Err(error);
                }
                // 0 marks an unbounded retry in the log record
                _ => ErrorLogger::log_recovery_attempt(
                    &error,
                    error.failure_class(),
                    attempt,
                    max_attempts.unwrap_or(0),
                ),
            }

            let delay = self.calculate_delay(attempt);
            sleep(error.retry_after().map_or(delay, |wait| wait.max(delay))).await;
        }
    }

    /// Calculate delay for the given attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_secs_f64();
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let exponential_delay = base_delay * self.config.backoff_multiplier.powi(exponent);

        let capped_delay = exponential_delay.min(self.config.max_delay.as_secs_f64());

        let final_delay = if self.config.jitter {
            let jitter_factor = 0.1; // 10% jitter
            let jitter = capped_delay * jitter_factor * (rand::random::<f64>() - 0.5);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_secs_f64(final_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_from_api_config() {
        let api = ApiConfig {
            max_retries: 4,
            retry_delay_ms: 200,
            max_retry_delay_ms: 800,
            ..ApiConfig::default()
        };
        let config = RetryConfig::from_api_config(&api);
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.initial_delay, Duration::from_millis(200));
        assert_eq!(config.max_delay, Duration::from_millis(800));
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_success_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new("test_operation", fast_config(3));

        let result = manager
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(WatcherError::Rpc(RpcError::Timeout))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_at_least_retry_after() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new("rate_limited", fast_config(2));
        let started = tokio::time::Instant::now();

        let result = manager
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RpcError::RateLimit { seconds: 3 })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_non_recoverable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new("test_operation", fast_config(5));

        let result: Result<(), _> = manager
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WatcherError::Rpc(RpcError::Validation("bad address".to_string())))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new("test_operation", fast_config(2));

        let result: Result<(), _> = manager
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WatcherError::Rpc(RpcError::Timeout))
            })
            .await;

        assert!(matches!(result, Err(WatcherError::Rpc(RpcError::Timeout))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_ok_outlasts_max_attempts() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new("startup", fast_config(2));

        let result = manager
            .execute_until_ok(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 10 {
                    Err(WatcherError::Rpc(RpcError::Timeout))
                } else {
                    Ok("started")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "started");
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_until_ok_returns_non_recoverable_error() {
        let calls = AtomicU32::new(0);
        let manager = RetryManager::new("startup", fast_config(2));

        let result: Result<(), _> = manager
            .execute_until_ok(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(WatcherError::Lifecycle("watcher already stopped".to_string()))
            })
            .await;

        assert!(matches!(result, Err(WatcherError::Lifecycle(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_delay_calculation() {
        let manager = RetryManager::new(
            "test",
            RetryConfig {
                max_attempts: 5,
                initial_delay: Duration::from_secs(2),
                max_delay: Duration::from_secs(30),
                backoff_multiplier: 2.0,
                jitter: false,
            },
        );

        assert_eq!(manager.calculate_delay(1).as_secs(), 2);
        assert_eq!(manager.calculate_delay(2).as_secs(), 4);
        assert_eq!(manager.calculate_delay(3).as_secs(), 8);
        // 2 * 2^5 = 64, capped at 30
        assert_eq!(manager.calculate_delay(6).as_secs(), 30);
    }
}
