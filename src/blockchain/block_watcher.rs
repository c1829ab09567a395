use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::blockchain::handler::{dispatch, EventHandler, HandlerId, HandlerSet};
use crate::blockchain::port::LedgerReadPort;
use crate::config::WatcherConfig;
use crate::database::CursorPersistence;
use crate::error::{Result, WatcherError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::BlockIdentifier;
use crate::scheduler::PeriodicTask;

/// Callback told about every seqno once its cursor write is durable
pub type Checkpoint = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Uninitialized,
    Running,
    Stopped,
}

/// Follows the masterchain and reports every new masterchain and shard
/// block to the registered handlers.
///
/// Seqnos are processed one at a time in increasing order. The cursor only
/// moves after a seqno's blocks were handed to every handler and the new
/// value was persisted, so a failed tick is retried from the same place and
/// no seqno is ever skipped. Handlers run in their own tasks; a block may be
/// delivered more than once if a tick fails after dispatching it.
pub struct BlockWatcher {
    core: Arc<WatcherCore>,
    task: Mutex<Option<PeriodicTask>>,
}

struct WatcherCore {
    ledger: Arc<dyn LedgerReadPort>,
    store: Arc<dyn CursorPersistence>,
    handlers: HandlerSet<BlockIdentifier>,
    config: WatcherConfig,
    cursor: AtomicU32,
    state: Mutex<WatcherState>,
    stopping: AtomicBool,
    checkpoint: RwLock<Option<Checkpoint>>,
}

impl BlockWatcher {
    pub fn new(
        ledger: Arc<dyn LedgerReadPort>,
        store: Arc<dyn CursorPersistence>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            core: Arc::new(WatcherCore {
                ledger,
                store,
                handlers: HandlerSet::new(),
                config,
                cursor: AtomicU32::new(0),
                state: Mutex::new(WatcherState::Uninitialized),
                stopping: AtomicBool::new(false),
                checkpoint: RwLock::new(None),
            }),
            task: Mutex::new(None),
        }
    }

    /// Register a handler for every block; handlers run in registration order
    pub fn add_handler<H>(&self, handler: H) -> HandlerId
    where
        H: EventHandler<BlockIdentifier> + 'static,
    {
        self.core.handlers.add(Arc::new(handler))
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.core.handlers.remove(id)
    }

    pub fn handler_count(&self) -> usize {
        self.core.handlers.len()
    }

    /// Invoke `checkpoint` with each seqno right after it is persisted
    pub fn set_checkpoint<F>(&self, checkpoint: F)
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.core.checkpoint.write() {
            *slot = Some(Arc::new(checkpoint));
        }
    }

    pub fn state(&self) -> WatcherState {
        self.core.state()
    }

    /// Last seqno whose processing was persisted
    pub fn last_checked_seqno(&self) -> u32 {
        self.core.cursor.load(Ordering::SeqCst)
    }

    /// Resolve the starting cursor without starting the poll loop.
    ///
    /// The configured start seqno wins, then a stored cursor, then the
    /// current head. Nothing is persisted.
    pub async fn initialize(&self) -> Result<u32> {
        if self.state() != WatcherState::Uninitialized {
            return Err(WatcherError::Lifecycle(format!(
                "cannot initialize a watcher in state {:?}",
                self.state()
            )));
        }

        let context = LogContext::new("block_watcher", "initialize");
        // A configured start seqno only moves a stored cursor forward
        let cursor = match (self.core.config.start_seqno, self.core.store.get_last_seqno()?) {
            (Some(seqno), stored) if seqno >= stored => {
                context.info(&format!("Starting after configured seqno {}", seqno));
                seqno
            }
            (Some(seqno), stored) => {
                context.warn(&format!(
                    "Configured seqno {} is behind stored seqno {}, resuming from the store",
                    seqno, stored
                ));
                stored
            }
            (None, 0) => {
                let head = self.core.ledger.get_latest_masterchain_seqno().await?;
                context.info(&format!("No stored cursor, observing blocks after head {}", head));
                head
            }
            (None, stored) => {
                context.info(&format!("Resuming after stored seqno {}", stored));
                stored
            }
        };

        self.core.cursor.store(cursor, Ordering::SeqCst);
        self.core.set_state(WatcherState::Running);
        Ok(cursor)
    }

    /// Initialize and spawn the poll loop
    pub async fn start(&self) -> Result<()> {
        self.initialize().await?;

        let core = Arc::clone(&self.core);
        let task = PeriodicTask::spawn("block_watcher", self.core.config.poll_interval(), move || {
            let core = Arc::clone(&core);
            async move { core.tick().await.map(|_| ()) }
        });

        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }

        LogContext::new("block_watcher", "start")
            .with_seqno(self.last_checked_seqno())
            .with_metadata("poll_interval_ms", serde_json::json!(self.core.config.poll_interval_ms))
            .info("Block watcher started");
        Ok(())
    }

    /// Run one poll: process every seqno up to the current head.
    ///
    /// Returns the number of seqnos processed. On error the cursor stays at
    /// the last persisted seqno.
    pub async fn tick(&self) -> Result<u32> {
        if self.state() != WatcherState::Running {
            return Err(WatcherError::Lifecycle(format!(
                "cannot poll a watcher in state {:?}",
                self.state()
            )));
        }
        self.core.tick().await
    }

    /// Stop polling. Dispatched handler tasks are left to finish.
    /// Safe to call repeatedly and before `start`.
    pub async fn stop(&self) {
        self.core.stopping.store(true, Ordering::SeqCst);

        let task = self.task.lock().ok().and_then(|mut slot| slot.take());
        if let Some(task) = task {
            task.stop().await;
        }

        if self.core.state() != WatcherState::Stopped {
            self.core.set_state(WatcherState::Stopped);
            LogContext::new("block_watcher", "stop")
                .with_seqno(self.last_checked_seqno())
                .info("Block watcher stopped");
        }
    }
}

impl WatcherCore {
    fn state(&self) -> WatcherState {
        self.state.lock().map(|state| *state).unwrap_or(WatcherState::Stopped)
    }

    fn set_state(&self, next: WatcherState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    async fn tick(&self) -> Result<u32> {
        let head = self.ledger.get_latest_masterchain_seqno().await?;
        let mut cursor = self.cursor.load(Ordering::SeqCst);
        MetricsLogger::log_watcher_status(head, cursor);

        let mut processed = 0;
        while cursor < head {
            if self.stopping.load(Ordering::SeqCst) {
                LogContext::new("block_watcher", "tick")
                    .with_seqno(cursor)
                    .debug("Stop requested, leaving remaining seqnos for later");
                break;
            }

            let seqno = cursor + 1;
            if let Err(e) = self.process_seqno(seqno).await {
                LogContext::new("block_watcher", "process_seqno")
                    .with_seqno(seqno)
                    .with_metadata("failure_class", serde_json::json!(format!("{:?}", e.class())))
                    .debug("Seqno failed, cursor left in place");
                return Err(e);
            }

            cursor = seqno;
            processed += 1;
        }

        Ok(processed)
    }

    async fn process_seqno(&self, seqno: u32) -> Result<()> {
        let monitor = PerformanceMonitor::new("process_seqno").with_metadata("seqno", serde_json::json!(seqno));
        let handlers = self.handlers.snapshot();

        self.fan_out(&handlers, BlockIdentifier::masterchain(seqno));

        let mut shard_count = 0;
        if self.config.dispatch_shards {
            let shards = self.ledger.get_shard_list(seqno).await?;
            shard_count = shards.len();
            for shard in shards {
                self.fan_out(&handlers, shard);
            }
        }

        self.store.set_last_seqno(seqno)?;
        self.cursor.store(seqno, Ordering::SeqCst);

        let checkpoint = self.checkpoint.read().ok().and_then(|slot| slot.clone());
        if let Some(checkpoint) = checkpoint {
            checkpoint(seqno);
        }

        MetricsLogger::log_seqno_processed(seqno, shard_count, handlers.len(), monitor.finish());
        Ok(())
    }

    fn fan_out(&self, handlers: &[Arc<dyn EventHandler<BlockIdentifier>>], block: BlockIdentifier) {
        for handler in handlers {
            let context = LogContext::new("block_watcher", "handler").with_block(&block);
            dispatch(Arc::clone(handler), block.clone(), context);
        }
    }
}

impl Drop for BlockWatcher {
    fn drop(&mut self) {
        self.core.stopping.store(true, Ordering::SeqCst);
    }
}
