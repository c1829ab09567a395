use log::{debug, error, info, trace, warn, LevelFilter};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, FailureClass, WatcherError};

/// Structured logging context for the watcher
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_seqno(self, seqno: u32) -> Self {
        self.with_metadata("seqno", json!(seqno))
    }

    pub fn with_block(self, block: &crate::models::BlockIdentifier) -> Self {
        self.with_metadata("block", json!(block.to_string()))
    }

    pub fn with_logical_time(self, lt: u64) -> Self {
        self.with_metadata("lt", json!(lt))
    }

    pub fn with_transaction_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("transaction_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    pub fn with_retry_count(self, retry_count: u32) -> Self {
        self.with_metadata("retry_count", json!(retry_count))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Performance monitoring utilities
pub struct PerformanceMonitor {
    pub start_time: SystemTime,
    operation: String,
    metadata: HashMap<String, Value>,
}

impl PerformanceMonitor {
    pub fn new(operation: &str) -> Self {
        Self {
            start_time: SystemTime::now(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    fn elapsed_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_millis() as u64
    }

    fn context(self, duration: u64) -> LogContext {
        let mut context = LogContext::new("performance", &self.operation).with_duration_ms(duration);
        for (key, value) in self.metadata {
            context = context.with_metadata(&key, value);
        }
        context
    }

    pub fn finish(self) -> u64 {
        let duration = self.elapsed_ms();
        self.context(duration)
            .debug(&format!("Operation completed in {}ms", duration));
        duration
    }

    pub fn finish_with_result<T, E>(self, result: &Result<T, E>) -> u64
    where
        E: std::fmt::Display,
    {
        let duration = self.elapsed_ms();
        let context = self.context(duration);

        match result {
            Ok(_) => context.debug(&format!("Operation completed successfully in {}ms", duration)),
            Err(e) => context
                .with_metadata("error", json!(e.to_string()))
                .warn(&format!("Operation failed after {}ms: {}", duration, e)),
        }

        duration
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &WatcherError, context: Option<LogContext>) {
        let severity = error.severity();

        let mut log_context = context.unwrap_or_else(|| LogContext::new("error", "unknown"));
        log_context = log_context
            .with_metadata("failure_class", json!(format!("{:?}", error.class())))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        if let Some(delay) = error.retry_delay() {
            log_context = log_context.with_metadata("retry_delay_seconds", json!(delay));
        }

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.info(&message),
        }
    }

    pub fn log_recovery_attempt(
        error: &dyn std::fmt::Display,
        class: FailureClass,
        attempt: u32,
        max_attempts: u32,
    ) {
        let context = LogContext::new("recovery", "retry_attempt")
            .with_retry_count(attempt)
            .with_metadata("max_attempts", json!(max_attempts))
            .with_metadata("failure_class", json!(format!("{:?}", class)));

        if max_attempts == 0 {
            context.warn(&format!("Retry attempt {}: {}", attempt, error));
        } else if attempt == max_attempts {
            context.error(&format!("Final retry attempt failed: {}", error));
        } else {
            context.warn(&format!("Retry attempt {} of {}: {}", attempt, max_attempts, error));
        }
    }

    pub fn log_recovery_success(operation: &str, attempts: u32, total_duration_ms: u64) {
        LogContext::new("recovery", "success")
            .with_metadata("operation", json!(operation))
            .with_retry_count(attempts)
            .with_duration_ms(total_duration_ms)
            .info(&format!("Operation recovered after {} attempts in {}ms", attempts, total_duration_ms));
    }
}

/// Application metrics and monitoring
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_seqno_processed(seqno: u32, shard_count: usize, handler_count: usize, processing_time_ms: u64) {
        LogContext::new("metrics", "seqno_processed")
            .with_seqno(seqno)
            .with_metadata("shard_count", json!(shard_count))
            .with_metadata("handler_count", json!(handler_count))
            .with_duration_ms(processing_time_ms)
            .debug(&format!("Masterchain seqno {} processed with {} shard blocks", seqno, shard_count));
    }

    pub fn log_payment_detected(address: &str, lt: u64, hash: &str, value: Option<u64>) {
        LogContext::new("metrics", "payment_detected")
            .with_address(address)
            .with_logical_time(lt)
            .with_transaction_hash(hash)
            .with_metadata("value", json!(value))
            .info(&format!("Inbound payment at lt {} to {}", lt, address));
    }

    pub fn log_api_call(method: &str, duration_ms: u64, success: bool) {
        let context = LogContext::new("metrics", "api_call")
            .with_metadata("method", json!(method))
            .with_duration_ms(duration_ms)
            .with_metadata("success", json!(success));

        if success {
            context.debug(&format!("API call {} completed in {}ms", method, duration_ms));
        } else {
            context.warn(&format!("API call {} failed after {}ms", method, duration_ms));
        }
    }

    pub fn log_database_operation(operation: &str, duration_ms: u64, rows_affected: Option<usize>) {
        let mut context = LogContext::new("metrics", "database_operation")
            .with_metadata("operation", json!(operation))
            .with_duration_ms(duration_ms);

        if let Some(rows) = rows_affected {
            context = context.with_metadata("rows_affected", json!(rows));
        }

        context.debug(&format!("Database {} completed in {}ms", operation, duration_ms));
    }

    pub fn log_watcher_status(head_seqno: u32, last_checked_seqno: u32) {
        let behind = head_seqno.saturating_sub(last_checked_seqno);
        let context = LogContext::new("metrics", "watcher_status")
            .with_metadata("head_seqno", json!(head_seqno))
            .with_metadata("last_checked_seqno", json!(last_checked_seqno))
            .with_metadata("seqnos_behind", json!(behind));

        if behind > 10 {
            context.warn(&format!("Watcher is {} seqnos behind (head: {}, checked: {})",
                behind, head_seqno, last_checked_seqno));
        } else {
            context.debug(&format!("Watcher is {} seqnos behind", behind));
        }
    }
}

fn level_filter(level: &str) -> LevelFilter {
    match level {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Initialize structured logging for the application.
///
/// RUST_LOG still refines the filter on top of the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level_filter(&config.level));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if config.format == "json" {
        // Structured records are already JSON; wrap plain ones so every line parses
        builder.format(|buf, record| {
            use std::io::Write;

            let line = record.args().to_string();
            if serde_json::from_str::<Value>(&line).is_ok() {
                writeln!(buf, "{}", line)
            } else {
                writeln!(
                    buf,
                    "{}",
                    json!({
                        "timestamp": chrono::Utc::now().timestamp(),
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "message": line,
                    })
                )
            }
        });
    } else {
        builder.format(|buf, record| {
            use std::io::Write;

            if let Ok(json_value) = serde_json::from_str::<Value>(&record.args().to_string()) {
                writeln!(buf, "{}", serde_json::to_string_pretty(&json_value)?)
            } else {
                writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            }
        });
    }

    builder.try_init()?;

    info!("Structured logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use serde_json::json;

    #[test]
    fn test_log_context_with_metadata() {
        let context = LogContext::new("test", "test")
            .with_seqno(101)
            .with_logical_time(27_000_001)
            .with_address("EQwallet");

        assert_eq!(context.metadata.get("seqno"), Some(&json!(101)));
        assert_eq!(context.metadata.get("lt"), Some(&json!(27_000_001u64)));
        assert_eq!(context.metadata.get("address"), Some(&json!("EQwallet")));
    }

    #[test]
    fn test_log_context_format_message() {
        let context = LogContext::new("block_watcher", "tick")
            .with_block(&crate::models::BlockIdentifier::masterchain(5));

        let message = context.format_message("INFO", "test message");

        let parsed: Value = serde_json::from_str(&message).expect("Should be valid JSON");
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["component"], "block_watcher");
        assert_eq!(parsed["operation"], "tick");
        assert_eq!(parsed["message"], "test message");
        assert_eq!(parsed["block"], "(-1,8000000000000000,5)");
    }

    #[test]
    fn test_performance_monitor_with_result() {
        let monitor = PerformanceMonitor::new("test_operation")
            .with_metadata("test_key", json!("test_value"));
        assert_eq!(monitor.metadata.get("test_key"), Some(&json!("test_value")));

        let result: Result<(), String> = Err("boom".to_string());
        monitor.finish_with_result(&result);
    }

    #[test]
    fn test_error_and_metrics_logging_do_not_panic() {
        ErrorLogger::log_error(&WatcherError::Rpc(RpcError::Timeout), Some(LogContext::new("test", "error")));
        ErrorLogger::log_recovery_attempt(&RpcError::Timeout, FailureClass::TransientRemote, 3, 3);
        ErrorLogger::log_recovery_attempt(&RpcError::Timeout, FailureClass::TransientRemote, 7, 0);
        MetricsLogger::log_seqno_processed(101, 2, 1, 15);
        MetricsLogger::log_payment_detected("EQwallet", 1050, "aa=", Some(500));
        MetricsLogger::log_api_call("getMasterchainInfo", 120, false);
        MetricsLogger::log_watcher_status(150, 101);
    }

    #[test]
    fn test_level_filter_mapping() {
        assert_eq!(level_filter("warn"), LevelFilter::Warn);
        assert_eq!(level_filter("trace"), LevelFilter::Trace);
        assert_eq!(level_filter("unknown"), LevelFilter::Info);
    }
}
