use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::database::{CursorStore, DbError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("CLI operation failed: {0}")]
    Operation(String),
    #[error("Store error: {0}")]
    Database(#[from] DbError),
}

#[derive(Parser)]
#[command(name = "ton-watcher-cli")]
#[command(about = "Inspect and maintain the TON watcher's cursor store")]
#[command(version)]
pub struct Cli {
    /// Database path, overrides the configuration file
    #[arg(long)]
    pub database: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Show the stored masterchain cursor and obligation count
    Status,
    /// Remember a payment obligation for an address
    Expect {
        address: String,
        /// Amount in nanotons
        amount: u64,
        /// Caller-chosen identifier stored as the row's message
        uid: String,
        /// Lifetime in seconds, 0 = never expires
        #[arg(long, default_value_t = 300)]
        ttl: u64,
    },
    /// List live obligations of an address, oldest first
    List { address: String },
    /// Delete obligations whose lifetime has elapsed
    Purge,
}

/// Runs CLI commands against a store and renders their output
pub struct CliHandler {
    store: Arc<CursorStore>,
}

impl CliHandler {
    pub fn new(store: Arc<CursorStore>) -> Self {
        Self { store }
    }

    pub async fn execute_command(&self, command: &Commands) -> Result<String, CliError> {
        match command {
            Commands::Status => self.status(),
            Commands::Expect {
                address,
                amount,
                uid,
                ttl,
            } => self.expect(address, *amount, uid, *ttl),
            Commands::List { address } => self.list(address),
            Commands::Purge => {
                let removed = self.store.purge_expired()?;
                Ok(format!("Purged {} expired obligations", removed))
            }
        }
    }

    fn status(&self) -> Result<String, CliError> {
        let seqno = self.store.get_last_seqno()?;
        let count = self.store.transaction_count()?;

        let cursor = match seqno {
            0 => "not initialized".to_string(),
            n => n.to_string(),
        };
        Ok(format!("Last checked seqno: {}\nStored obligations: {}", cursor, count))
    }

    fn expect(&self, address: &str, amount: u64, uid: &str, ttl: u64) -> Result<String, CliError> {
        if address.trim().is_empty() {
            return Err(CliError::Operation("address must not be empty".to_string()));
        }

        let id = self
            .store
            .record_transaction(address, amount, uid, Some(Duration::from_secs(ttl)))?;
        Ok(format!("Recorded obligation #{} for {}", id, address))
    }

    fn list(&self, address: &str) -> Result<String, CliError> {
        let rows = self.store.list_transactions(address)?;
        if rows.is_empty() {
            return Ok(format!("No live obligations for {}", address));
        }

        let mut output = format!("{:<6} {:>20} {:<24} {}\n", "ID", "AMOUNT", "UID", "EXPIRES");
        for row in rows {
            let expires = match row.expires_at.and_then(|at| chrono::DateTime::from_timestamp(at, 0)) {
                Some(at) => at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                None => "never".to_string(),
            };
            output.push_str(&format!("{:<6} {:>20} {:<24} {}\n", row.id, row.amount, row.message, expires));
        }
        Ok(output)
    }
}
