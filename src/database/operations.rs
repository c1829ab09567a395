use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use crate::config::DatabaseConfig;
use crate::database::schema::{initialize_schema, run_migrations};
use crate::logging::MetricsLogger;

/// Key of the masterchain cursor row
pub const LAST_SEQNO_KEY: &str = "last_seqno";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Connection(#[from] rusqlite::Error),
    #[error("Database operation failed: {0}")]
    Operation(String),
    #[error("Record not found")]
    NotFound,
}

/// Durable cursor access used by the watchers.
///
/// Every write must be durable before it returns; the watchers treat a
/// successful return as "progress recorded".
pub trait CursorPersistence: Send + Sync {
    fn get_last_seqno(&self) -> Result<u32, DbError>;
    fn set_last_seqno(&self, seqno: u32) -> Result<(), DbError>;
    fn get_last_logical_time(&self, address: &str) -> Result<u64, DbError>;
    fn set_last_logical_time(&self, address: &str, lt: u64) -> Result<(), DbError>;
}

/// SQLite-backed store for watcher cursors and remembered payment obligations
pub struct CursorStore {
    conn: Arc<Mutex<Connection>>,
}

impl CursorStore {
    /// Open (or create) a store at `db_path` and initialize the schema
    pub fn new(db_path: &str) -> Result<Self, DbError> {
        Self::new_with_config(&DatabaseConfig {
            path: db_path.to_string(),
            ..DatabaseConfig::default()
        })
    }

    pub fn new_with_config(config: &DatabaseConfig) -> Result<Self, DbError> {
        let conn = Connection::open(&config.path)?;

        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms as u64))?;
        if config.enable_wal_mode {
            // journal_mode returns the resulting mode as a row
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        }
        conn.execute_batch("PRAGMA synchronous = FULL;")?;

        Self::from_connection(conn)
    }

    /// Create an in-memory store for testing
    pub fn new_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        initialize_schema(&conn)?;
        run_migrations(&conn)?;

        Ok(CursorStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn
            .lock()
            .map_err(|_| DbError::Operation("Failed to acquire lock".to_string()))
    }

    fn read_cursor(&self, key: &str) -> Result<Option<i64>, DbError> {
        let conn = self.lock()?;

        let value = conn
            .query_row("SELECT value FROM cursors WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;

        Ok(value)
    }

    fn write_cursor(&self, key: &str, value: i64) -> Result<(), DbError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO cursors (key, value, updated_at) VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;

        Ok(())
    }

    /// Last fully processed masterchain seqno, 0 if never set
    pub fn get_last_seqno(&self) -> Result<u32, DbError> {
        match self.read_cursor(LAST_SEQNO_KEY)? {
            Some(value) => u32::try_from(value)
                .map_err(|_| DbError::Operation(format!("Stored seqno out of range: {}", value))),
            None => Ok(0),
        }
    }

    pub fn set_last_seqno(&self, seqno: u32) -> Result<(), DbError> {
        self.write_cursor(LAST_SEQNO_KEY, seqno as i64)
    }

    /// Highest logical time already examined for `address`, 0 if never set
    pub fn get_last_logical_time(&self, address: &str) -> Result<u64, DbError> {
        // lt is stored bit-for-bit in a signed column
        Ok(self.read_cursor(&logical_time_key(address))?.map(|v| v as u64).unwrap_or(0))
    }

    pub fn set_last_logical_time(&self, address: &str, lt: u64) -> Result<(), DbError> {
        self.write_cursor(&logical_time_key(address), lt as i64)
    }

    /// Remember an obligation for `address`; rows with a ttl disappear from
    /// listings once it elapses and are deleted by `purge_expired`.
    /// A ttl whose expiry does not fit a unix timestamp never expires.
    pub fn record_transaction(
        &self,
        address: &str,
        amount: u64,
        message: &str,
        ttl: Option<Duration>,
    ) -> Result<i64, DbError> {
        let expires_at = ttl
            .filter(|ttl| !ttl.is_zero())
            .and_then(|ttl| i64::try_from(ttl.as_secs().max(1)).ok())
            .and_then(|secs| unix_now().checked_add(secs));
        self.insert_transaction(address, amount, message, expires_at)
    }

    pub(crate) fn insert_transaction(
        &self,
        address: &str,
        amount: u64,
        message: &str,
        expires_at: Option<i64>,
    ) -> Result<i64, DbError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT INTO transactions (address, amount, message, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![address, amount.to_string(), message, expires_at],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Non-expired obligations for `address`, oldest first
    pub fn list_transactions(&self, address: &str) -> Result<Vec<StoredTransaction>, DbError> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, address, amount, message, expires_at, created_at
             FROM transactions
             WHERE address = ?1 AND (expires_at IS NULL OR expires_at > ?2)
             ORDER BY id",
        )?;

        let rows = stmt.query_map(params![address, unix_now()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<i64>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut transactions = Vec::new();
        for row in rows {
            let (id, address, amount, message, expires_at, created_at) = row?;
            let amount = amount
                .parse()
                .map_err(|_| DbError::Operation(format!("Corrupt amount in row {}: {}", id, amount)))?;
            transactions.push(StoredTransaction {
                id,
                address,
                amount,
                message,
                expires_at,
                created_at,
            });
        }

        Ok(transactions)
    }

    /// Delete the obligations of `address` tagged `message`; true if any existed
    pub fn remove_transaction(&self, address: &str, message: &str) -> Result<bool, DbError> {
        let conn = self.lock()?;

        let rows_affected = conn.execute(
            "DELETE FROM transactions WHERE address = ?1 AND message = ?2",
            params![address, message],
        )?;

        Ok(rows_affected > 0)
    }

    /// Delete every row whose ttl has elapsed
    pub fn purge_expired(&self) -> Result<usize, DbError> {
        let started = std::time::Instant::now();
        let conn = self.lock()?;

        let rows_affected = conn.execute(
            "DELETE FROM transactions WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![unix_now()],
        )?;

        MetricsLogger::log_database_operation(
            "purge_expired",
            started.elapsed().as_millis() as u64,
            Some(rows_affected),
        );
        Ok(rows_affected)
    }

    /// Number of stored obligations, expired rows included until purged
    pub fn transaction_count(&self) -> Result<u64, DbError> {
        let conn = self.lock()?;

        let count: u64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;

        Ok(count)
    }
}

impl CursorPersistence for CursorStore {
    fn get_last_seqno(&self) -> Result<u32, DbError> {
        CursorStore::get_last_seqno(self)
    }

    fn set_last_seqno(&self, seqno: u32) -> Result<(), DbError> {
        CursorStore::set_last_seqno(self, seqno)
    }

    fn get_last_logical_time(&self, address: &str) -> Result<u64, DbError> {
        CursorStore::get_last_logical_time(self, address)
    }

    fn set_last_logical_time(&self, address: &str, lt: u64) -> Result<(), DbError> {
        CursorStore::set_last_logical_time(self, address, lt)
    }
}

fn logical_time_key(address: &str) -> String {
    format!("last_lt:{}", address)
}

pub(crate) fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Represents a row from the transactions table
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTransaction {
    pub id: i64,
    pub address: String,
    pub amount: u64,
    pub message: String,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}
