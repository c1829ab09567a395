use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::blockchain::handler::{dispatch, EventHandler, HandlerId, HandlerSet};
use crate::blockchain::port::LedgerReadPort;
use crate::config::PaymentConfig;
use crate::database::CursorPersistence;
use crate::error::{Result, WatcherError};
use crate::logging::{LogContext, MetricsLogger};
use crate::models::TransactionRecord;
use crate::scheduler::PeriodicTask;

/// Polls one address's recent transactions and reports inbound payments.
///
/// Only the `result_limit` newest transactions are looked at per poll, so a
/// burst larger than that between two polls can go unreported.
pub struct PaymentWatcher {
    core: Arc<PaymentCore>,
    task: Mutex<Option<PeriodicTask>>,
}

struct PaymentCore {
    ledger: Arc<dyn LedgerReadPort>,
    store: Option<Arc<dyn CursorPersistence>>,
    address: String,
    result_limit: u32,
    poll_interval: Duration,
    handler: HandlerSet<TransactionRecord>,
    last_seen: AtomicU64,
}

impl PaymentWatcher {
    /// A watcher for `address`; with a `store` the high-water mark survives restarts
    pub fn new(
        ledger: Arc<dyn LedgerReadPort>,
        address: impl Into<String>,
        config: &PaymentConfig,
        store: Option<Arc<dyn CursorPersistence>>,
    ) -> Self {
        Self {
            core: Arc::new(PaymentCore {
                ledger,
                store,
                address: address.into(),
                result_limit: config.result_limit,
                poll_interval: config.poll_interval(),
                handler: HandlerSet::new(),
                last_seen: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Treat everything up to `lt` as already seen
    pub fn with_last_logical_time(self, lt: u64) -> Self {
        self.core.last_seen.store(lt, Ordering::SeqCst);
        self
    }

    /// Install the payment handler, replacing any previous one
    pub fn set_handler<H>(&self, handler: H) -> HandlerId
    where
        H: EventHandler<TransactionRecord> + 'static,
    {
        self.core.handler.replace(Arc::new(handler))
    }

    pub fn address(&self) -> &str {
        &self.core.address
    }

    pub fn last_seen_logical_time(&self) -> u64 {
        self.core.last_seen.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().map_or(false, PeriodicTask::is_running))
            .unwrap_or(false)
    }

    /// Poll once. Returns the number of payments dispatched.
    pub async fn check_payments(&self) -> Result<usize> {
        self.core.check_payments().await
    }

    /// Start polling on a fixed delay.
    ///
    /// When a store is attached and no mark was seeded, the stored mark is
    /// restored first.
    pub async fn start(&self) -> Result<()> {
        if self.is_running() {
            return Err(WatcherError::Lifecycle(format!(
                "payment watcher for {} is already running",
                self.core.address
            )));
        }

        if let Some(store) = &self.core.store {
            if self.last_seen_logical_time() == 0 {
                let stored = store.get_last_logical_time(&self.core.address)?;
                self.core.last_seen.store(stored, Ordering::SeqCst);
            }
        }

        let core = Arc::clone(&self.core);
        let task = PeriodicTask::spawn("payment_watcher", self.core.poll_interval, move || {
            let core = Arc::clone(&core);
            async move { core.check_payments().await.map(|_| ()) }
        });

        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }

        LogContext::new("payment_watcher", "start")
            .with_address(&self.core.address)
            .with_logical_time(self.last_seen_logical_time())
            .info("Payment watcher started");
        Ok(())
    }

    /// Stop polling; safe to call repeatedly
    pub async fn stop(&self) {
        let task = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.stop().await;
            LogContext::new("payment_watcher", "stop")
                .with_address(&self.core.address)
                .info("Payment watcher stopped");
        }
    }
}

impl PaymentCore {
    async fn check_payments(&self) -> Result<usize> {
        let transactions = self
            .ledger
            .get_account_transactions(&self.address, self.result_limit, None)
            .await?;

        let last_seen = self.last_seen.load(Ordering::SeqCst);
        let handlers = self.handler.snapshot();
        let mut newest = last_seen;
        let mut detected = 0;

        for transaction in transactions.iter().filter(|tx| tx.logical_time() > last_seen) {
            newest = newest.max(transaction.logical_time());

            if !transaction.is_inbound_payment_to(&self.address) {
                continue;
            }

            MetricsLogger::log_payment_detected(
                &self.address,
                transaction.logical_time(),
                transaction.hash(),
                transaction.value(),
            );
            for handler in &handlers {
                let context = LogContext::new("payment_watcher", "handler")
                    .with_address(&self.address)
                    .with_logical_time(transaction.logical_time())
                    .with_transaction_hash(transaction.hash());
                dispatch(Arc::clone(handler), transaction.clone(), context);
            }
            detected += 1;
        }

        if newest > last_seen {
            if let Some(store) = &self.store {
                store.set_last_logical_time(&self.address, newest)?;
            }
            self.last_seen.store(newest, Ordering::SeqCst);
        }

        Ok(detected)
    }
}
