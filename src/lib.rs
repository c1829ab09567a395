pub mod api;
pub mod blockchain;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod registry;
pub mod retry;
pub mod scheduler;

pub use blockchain::{
    BlockWatcher, EventHandler, HandlerId, HandlerResult, LedgerReadPort, PaymentWatcher, PendingPayments,
    TonCenterClient, WatcherState,
};
pub use config::{ApiConfig, AppConfig, DatabaseConfig, LoggingConfig, PaymentConfig, WatcherConfig};
pub use database::{CursorPersistence, CursorStore};
pub use error::{FailureClass, Result, RpcError, WatcherError};
pub use logging::{ErrorLogger, LogContext, MetricsLogger, PerformanceMonitor};
pub use registry::ExpiringRegistry;
pub use retry::{RetryConfig, RetryManager};
pub use scheduler::PeriodicTask;
