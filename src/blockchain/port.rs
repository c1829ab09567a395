use async_trait::async_trait;

use crate::error::RpcError;
use crate::models::{BlockIdentifier, BlockTransactions, TransactionId, TransactionRecord};

/// Read access to the ledger, as needed by the watchers.
///
/// Implementations hold no watcher state. Every call may fail transiently
/// (`RpcError::is_transient`); callers retry on their next poll.
#[async_trait]
pub trait LedgerReadPort: Send + Sync {
    /// Seqno of the newest masterchain block
    async fn get_latest_masterchain_seqno(&self) -> Result<u32, RpcError>;

    /// Shard blocks referenced by masterchain block `seqno`
    async fn get_shard_list(&self, seqno: u32) -> Result<Vec<BlockIdentifier>, RpcError>;

    /// One page of the transactions in `block`, starting after `after`
    async fn get_block_transactions(
        &self,
        block: &BlockIdentifier,
        after: Option<&TransactionId>,
        count: u32,
    ) -> Result<BlockTransactions, RpcError>;

    /// Up to `limit` transactions of `address`, newest first, starting at `before`
    async fn get_account_transactions(
        &self,
        address: &str,
        limit: u32,
        before: Option<&TransactionId>,
    ) -> Result<Vec<TransactionRecord>, RpcError>;
}
