use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::PaymentConfig;
use crate::database::operations::unix_now;
use crate::database::CursorStore;
use crate::error::{Result, WatcherError};
use crate::logging::LogContext;
use crate::registry::ExpiringRegistry;
use crate::scheduler::PeriodicTask;

/// A payment some caller is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub address: String,
    pub amount: u64,
}

/// Book of expected payments keyed by a caller-chosen uid.
///
/// Entries live in memory for fast lookup and are mirrored into the store
/// (the uid is the row's message) so they can be restored after a restart.
pub struct PendingPayments {
    registry: Arc<ExpiringRegistry<String, PendingPayment>>,
    store: Arc<CursorStore>,
    default_ttl: Option<Duration>,
    sweeper: Mutex<Option<PeriodicTask>>,
}

impl PendingPayments {
    pub fn new(store: Arc<CursorStore>, config: &PaymentConfig) -> Self {
        Self {
            registry: Arc::new(ExpiringRegistry::new()),
            store,
            default_ttl: config.default_ttl(),
            sweeper: Mutex::new(None),
        }
    }

    /// Register `uid`. `None` applies the configured default ttl, a zero ttl
    /// never expires.
    pub fn expect(&self, uid: &str, address: &str, amount: u64, ttl: Option<Duration>) -> Result<()> {
        let ttl = ttl.or(self.default_ttl);

        if let Some(previous) = self.registry.get(&uid.to_string()) {
            self.store.remove_transaction(&previous.address, uid)?;
        }
        self.store.record_transaction(address, amount, uid, ttl)?;
        self.registry.set(
            uid.to_string(),
            PendingPayment {
                address: address.to_string(),
                amount,
            },
            ttl,
        );

        LogContext::new("pending_payments", "expect")
            .with_address(address)
            .with_metadata("uid", serde_json::json!(uid))
            .with_metadata("amount", serde_json::json!(amount))
            .with_metadata("ttl_seconds", serde_json::json!(ttl.map(|t| t.as_secs())))
            .debug("Expecting payment");
        Ok(())
    }

    pub fn get(&self, uid: &str) -> Option<PendingPayment> {
        self.registry.get(&uid.to_string())
    }

    /// Remove `uid` from the book and the store once its payment arrived
    pub fn consume(&self, uid: &str) -> Result<Option<PendingPayment>> {
        let key = uid.to_string();
        let Some(payment) = self.registry.get(&key) else {
            return Ok(None);
        };

        self.store.remove_transaction(&payment.address, uid)?;
        Ok(self.registry.take(&key))
    }

    /// Reload the stored, unexpired obligations of `address` with their
    /// remaining lifetime. Returns how many were restored.
    pub fn restore(&self, address: &str) -> Result<usize> {
        let rows = self.store.list_transactions(address)?;
        let now = unix_now();

        for row in &rows {
            let ttl = row
                .expires_at
                .map(|at| Duration::from_secs((at - now).max(1) as u64));
            self.registry.set(
                row.message.clone(),
                PendingPayment {
                    address: row.address.clone(),
                    amount: row.amount,
                },
                ttl,
            );
        }

        LogContext::new("pending_payments", "restore")
            .with_address(address)
            .with_metadata("restored", serde_json::json!(rows.len()))
            .info(&format!("Restored {} pending payments", rows.len()));
        Ok(rows.len())
    }

    /// Number of live expectations
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Sweep expired entries from memory and the store every `interval`
    pub fn start(&self, interval: Duration) {
        let registry = Arc::clone(&self.registry);
        let store = Arc::clone(&self.store);
        let task = PeriodicTask::spawn("pending_payments_sweep", interval, move || {
            let registry = Arc::clone(&registry);
            let store = Arc::clone(&store);
            async move {
                registry.sweep();
                store.purge_expired()?;
                Ok::<(), WatcherError>(())
            }
        });

        if let Ok(mut slot) = self.sweeper.lock() {
            *slot = Some(task);
        }
    }

    /// Stop the sweep; safe to call repeatedly
    pub async fn stop(&self) {
        let task = self.sweeper.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.stop().await;
        }
    }
}
