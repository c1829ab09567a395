pub mod block_watcher;
pub mod handler;
pub mod payment_watcher;
pub mod pending_payments;
pub mod port;
pub mod rpc_client;

pub use block_watcher::{BlockWatcher, Checkpoint, WatcherState};
pub use handler::{EventHandler, HandlerError, HandlerId, HandlerResult};
pub use payment_watcher::PaymentWatcher;
pub use pending_payments::{PendingPayment, PendingPayments};
pub use port::LedgerReadPort;
pub use rpc_client::{TonCenterClient, DEFAULT_ENDPOINT};
