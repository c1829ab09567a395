#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ton_watcher::blockchain::{EventHandler, HandlerError, LedgerReadPort};
use ton_watcher::database::{CursorPersistence, CursorStore, DbError};
use ton_watcher::error::RpcError;
use ton_watcher::models::{
    BlockIdentifier, BlockTransactions, Message, TransactionId, TransactionRecord,
};

pub const WALLET: &str = "EQDtFpEwcFAEcRe5mLVh2N6C0x-_hJEM7W61_JLnSF74p4q2";
pub const SENDER: &str = "EQCD39VS5jcptHL8vMjEXrzGaRcCVYto7HUn4bpAOg8xqB2N";

/// Ledger whose answers are scripted by the test
pub struct ScriptedLedger {
    head: AtomicU32,
    head_failures: AtomicU32,
    shards: Mutex<HashMap<u32, Vec<BlockIdentifier>>>,
    shard_failures: Mutex<HashMap<u32, u32>>,
    shard_requests: Mutex<Vec<u32>>,
    account_batches: Mutex<VecDeque<Result<Vec<TransactionRecord>, RpcError>>>,
}

impl ScriptedLedger {
    pub fn new(head: u32) -> Arc<Self> {
        Arc::new(Self {
            head: AtomicU32::new(head),
            head_failures: AtomicU32::new(0),
            shards: Mutex::new(HashMap::new()),
            shard_failures: Mutex::new(HashMap::new()),
            shard_requests: Mutex::new(Vec::new()),
            account_batches: Mutex::new(VecDeque::new()),
        })
    }

    pub fn set_head(&self, head: u32) {
        self.head.store(head, Ordering::SeqCst);
    }

    /// Fail the next `times` head requests with a timeout
    pub fn fail_head(&self, times: u32) {
        self.head_failures.store(times, Ordering::SeqCst);
    }

    pub fn set_shards(&self, seqno: u32, shards: Vec<BlockIdentifier>) {
        self.shards.lock().unwrap().insert(seqno, shards);
    }

    /// Fail the next `times` shard-list requests for `seqno` with a timeout
    pub fn fail_shard_list(&self, seqno: u32, times: u32) {
        self.shard_failures.lock().unwrap().insert(seqno, times);
    }

    pub fn shard_requests(&self) -> Vec<u32> {
        self.shard_requests.lock().unwrap().clone()
    }

    pub fn push_account_batch(&self, batch: Vec<TransactionRecord>) {
        self.account_batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_account_failure(&self, error: RpcError) {
        self.account_batches.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl LedgerReadPort for ScriptedLedger {
    async fn get_latest_masterchain_seqno(&self) -> Result<u32, RpcError> {
        let failures = self.head_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.head_failures.store(failures - 1, Ordering::SeqCst);
            return Err(RpcError::Timeout);
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn get_shard_list(&self, seqno: u32) -> Result<Vec<BlockIdentifier>, RpcError> {
        self.shard_requests.lock().unwrap().push(seqno);

        if let Some(remaining) = self.shard_failures.lock().unwrap().get_mut(&seqno) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RpcError::Timeout);
            }
        }
        Ok(self.shards.lock().unwrap().get(&seqno).cloned().unwrap_or_default())
    }

    async fn get_block_transactions(
        &self,
        block: &BlockIdentifier,
        _after: Option<&TransactionId>,
        _count: u32,
    ) -> Result<BlockTransactions, RpcError> {
        Ok(BlockTransactions {
            id: block.clone(),
            req_count: 40,
            incomplete: false,
            transactions: Vec::new(),
        })
    }

    async fn get_account_transactions(
        &self,
        _address: &str,
        _limit: u32,
        _before: Option<&TransactionId>,
    ) -> Result<Vec<TransactionRecord>, RpcError> {
        self.account_batches.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Cursor store that records every seqno write and can be told to fail
pub struct RecordingStore {
    inner: CursorStore,
    seqno_writes: Mutex<Vec<u32>>,
    lt_writes: Mutex<Vec<u64>>,
    failing: std::sync::atomic::AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: CursorStore::new_in_memory().expect("Failed to create store"),
            seqno_writes: Mutex::new(Vec::new()),
            lt_writes: Mutex::new(Vec::new()),
            failing: std::sync::atomic::AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn seqno_writes(&self) -> Vec<u32> {
        self.seqno_writes.lock().unwrap().clone()
    }

    pub fn lt_writes(&self) -> Vec<u64> {
        self.lt_writes.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), DbError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(DbError::Operation("disk I/O error".to_string()))
        } else {
            Ok(())
        }
    }
}

impl CursorPersistence for RecordingStore {
    fn get_last_seqno(&self) -> Result<u32, DbError> {
        self.inner.get_last_seqno()
    }

    fn set_last_seqno(&self, seqno: u32) -> Result<(), DbError> {
        self.check()?;
        self.inner.set_last_seqno(seqno)?;
        self.seqno_writes.lock().unwrap().push(seqno);
        Ok(())
    }

    fn get_last_logical_time(&self, address: &str) -> Result<u64, DbError> {
        self.inner.get_last_logical_time(address)
    }

    fn set_last_logical_time(&self, address: &str, lt: u64) -> Result<(), DbError> {
        self.check()?;
        self.inner.set_last_logical_time(address, lt)?;
        self.lt_writes.lock().unwrap().push(lt);
        Ok(())
    }
}

/// Collects every event a handler receives
pub struct Recorder<E> {
    events: Arc<Mutex<Vec<E>>>,
}

impl<E: Clone + Send + 'static> Recorder<E> {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn handler(&self) -> impl EventHandler<E> + 'static {
        let events = Arc::clone(&self.events);
        move |event: E| {
            let events = Arc::clone(&events);
            async move {
                events.lock().unwrap().push(event);
                Ok::<(), HandlerError>(())
            }
        }
    }

    pub fn events(&self) -> Vec<E> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

/// Give dispatched handler tasks time to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub fn shard_block(seqno: u32) -> BlockIdentifier {
    BlockIdentifier::new(0, i64::MIN, seqno)
}

/// A transaction of `WALLET` at logical time `lt`
pub fn transaction(lt: u64, source: &str, destination: &str, out_msgs: usize) -> TransactionRecord {
    TransactionRecord {
        utime: 1_650_000_000 + lt,
        data: String::new(),
        transaction_id: TransactionId {
            lt,
            hash: format!("hash-{}", lt),
        },
        fee: "1000".to_string(),
        storage_fee: "0".to_string(),
        other_fee: "1000".to_string(),
        in_msg: Some(Message {
            source: source.to_string(),
            destination: destination.to_string(),
            value: "1000000000".to_string(),
            message: format!("order-{}", lt),
            ..Message::default()
        }),
        out_msgs: vec![Message::default(); out_msgs],
    }
}

pub fn inbound(lt: u64) -> TransactionRecord {
    transaction(lt, SENDER, WALLET, 0)
}
