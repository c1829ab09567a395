pub mod account;
pub mod block;
pub mod transaction;

pub use account::{AddressForms, AddressInformation, FriendlyAddress, WalletInformation};
pub use block::{
    BlockHeader, BlockIdentifier, ConsensusBlock, MasterchainInfo, Shards, MASTERCHAIN_SHARD, MASTERCHAIN_WORKCHAIN,
};
pub use transaction::{BlockTransactions, Message, MessageData, TransactionId, TransactionRecord, TransactionStub};
