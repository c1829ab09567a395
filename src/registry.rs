use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use crate::logging::LogContext;
use crate::scheduler::PeriodicTask;

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

type Table<K, V> = Arc<Mutex<HashMap<K, Entry<V>>>>;

/// In-memory key/value table whose entries may carry a time to live.
///
/// Expired entries are invisible to every read even before a sweep removes
/// them from storage. Entries set without a ttl (or with a zero ttl) never
/// expire.
pub struct ExpiringRegistry<K, V> {
    entries: Table<K, V>,
    sweeper: Mutex<Option<PeriodicTask>>,
}

impl<K, V> Default for ExpiringRegistry<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ExpiringRegistry<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            sweeper: Mutex::new(None),
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
        lock_table(&self.entries)
    }

    /// Insert or overwrite `key`. A ttl too large to represent never expires.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .and_then(|ttl| Instant::now().checked_add(ttl));
        self.table().insert(key, Entry { value, expires_at });
    }

    /// Current value of `key`; an expired entry is deleted and reported absent
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut table = self.table();

        match table.get(key) {
            Some(entry) if entry.is_expired(now) => {
                table.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Remove `key` and return its value if it was still live
    pub fn take(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.table()
            .remove(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Remaining lifetime of `key`; `None` if absent, expired or immortal
    pub fn remaining_ttl(&self, key: &K) -> Option<Duration> {
        let now = Instant::now();
        self.table()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.table().values().filter(|entry| !entry.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored entries, expired-but-unswept ones included
    pub fn stored_len(&self) -> usize {
        self.table().len()
    }

    /// Delete every expired entry, returning how many were removed
    pub fn sweep(&self) -> usize {
        sweep_table(&self.entries)
    }

    /// Start sweeping in the background every `interval`.
    ///
    /// Replaces a sweeper that is already running.
    pub fn start_sweeper(&self, interval: Duration) {
        let entries = Arc::clone(&self.entries);
        let task = PeriodicTask::spawn("registry_sweep", interval, move || {
            let entries = Arc::clone(&entries);
            async move {
                sweep_table(&entries);
                Ok(())
            }
        });

        if let Ok(mut sweeper) = self.sweeper.lock() {
            // Dropping the previous task signals it to shut down
            *sweeper = Some(task);
        }
    }

    /// Stop the background sweep; a no-op when none is running
    pub async fn stop_sweeper(&self) {
        let task = self.sweeper.lock().ok().and_then(|mut sweeper| sweeper.take());
        if let Some(task) = task {
            task.stop().await;
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|sweeper| sweeper.as_ref().map_or(false, PeriodicTask::is_running))
            .unwrap_or(false)
    }
}

// A poisoned table still holds consistent entries; every mutation is a
// single HashMap call.
fn lock_table<K, V>(entries: &Table<K, V>) -> MutexGuard<'_, HashMap<K, Entry<V>>> {
    entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn sweep_table<K: Eq + Hash, V>(entries: &Table<K, V>) -> usize {
    let now = Instant::now();
    let mut table = lock_table(entries);
    let before = table.len();
    table.retain(|_, entry| !entry.is_expired(now));
    let removed = before - table.len();

    if removed > 0 {
        LogContext::new("registry", "sweep")
            .with_metadata("removed", serde_json::json!(removed))
            .with_metadata("remaining", serde_json::json!(table.len()))
            .debug(&format!("Swept {} expired entries", removed));
    }
    removed
}
