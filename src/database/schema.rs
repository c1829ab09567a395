use rusqlite::{Connection, Result};

/// Initialize the database schema with required tables
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    // Named integer cursors: "last_seqno" and one "last_lt:<address>" per payment watcher
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cursors (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL,
            updated_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    // Remembered payment obligations; expires_at is a unix timestamp, NULL = never
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            address TEXT NOT NULL,
            amount TEXT NOT NULL,
            message TEXT NOT NULL,
            expires_at INTEGER,
            created_at INTEGER DEFAULT (strftime('%s', 'now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_address ON transactions(address)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_expires_at ON transactions(expires_at)",
        [],
    )?;

    Ok(())
}

/// Run database migrations (for future schema updates)
pub fn run_migrations(conn: &Connection) -> Result<()> {
    initialize_schema(conn)
}
