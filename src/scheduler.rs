use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::Result;
use crate::logging::{ErrorLogger, LogContext};

/// A cancellable background job run on a fixed delay.
///
/// The delay is measured from the end of one run to the start of the next,
/// so a slow run never overlaps the following one. A failed run is logged
/// and the loop keeps going; only `stop` (or dropping the task) ends it.
pub struct PeriodicTask {
    name: String,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicTask {
    /// Spawn `job` on the current tokio runtime, first run after `period`
    pub fn spawn<F, Fut>(name: &str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task_name = name.to_string();

        let handle = tokio::spawn(async move {
            LogContext::new("scheduler", &task_name)
                .with_metadata("period_ms", serde_json::json!(period.as_millis() as u64))
                .debug("Periodic task started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = sleep(period) => {}
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    result = job() => {
                        if let Err(e) = result {
                            ErrorLogger::log_error(&e, Some(LogContext::new("scheduler", &task_name)));
                        }
                    }
                }
            }

            LogContext::new("scheduler", &task_name).debug("Periodic task stopped");
        });

        Self {
            name: name.to_string(),
            shutdown,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .map(|handle| handle.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Signal the loop and wait for it to exit. Safe to call more than once.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);

        let handle = self.handle.lock().ok().and_then(|mut handle| handle.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    LogContext::new("scheduler", &self.name).error("Periodic task panicked");
                }
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RpcError, WatcherError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_task(period: Duration, runs: Arc<AtomicU32>) -> PeriodicTask {
        PeriodicTask::spawn("counter", period, move || {
            let runs = Arc::clone(&runs);
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_on_fixed_delay() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_secs(1), Arc::clone(&runs));

        sleep(Duration::from_millis(3_500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_loop_and_is_idempotent() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_secs(1), Arc::clone(&runs));

        sleep(Duration::from_millis(1_500)).await;
        task.stop().await;
        assert!(!task.is_running());
        let after_stop = runs.load(Ordering::SeqCst);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), after_stop);

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_keeps_running() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&runs);
        let task = PeriodicTask::spawn("failing", Duration::from_secs(1), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(WatcherError::Rpc(RpcError::Timeout))
            }
        });

        sleep(Duration::from_millis(2_500)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(task.is_running());

        task.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_signals_shutdown() {
        let runs = Arc::new(AtomicU32::new(0));
        let task = counting_task(Duration::from_secs(1), Arc::clone(&runs));
        drop(task);

        sleep(Duration::from_secs(3)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
