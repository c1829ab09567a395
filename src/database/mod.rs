pub mod operations;
pub mod schema;


pub use operations::{CursorPersistence, CursorStore, DbError, StoredTransaction, LAST_SEQNO_KEY};
pub use schema::{initialize_schema, run_migrations};
