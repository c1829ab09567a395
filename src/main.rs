use clap::Parser;
use log::{info, warn};
use std::sync::Arc;

use ton_watcher::blockchain::{
    BlockWatcher, HandlerError, LedgerReadPort, PaymentWatcher, PendingPayments, TonCenterClient,
};
use ton_watcher::config::AppConfig;
use ton_watcher::database::{CursorPersistence, CursorStore};
use ton_watcher::logging::{init_logging, LogContext};
use ton_watcher::models::{BlockIdentifier, TransactionRecord};
use ton_watcher::retry::{RetryConfig, RetryManager};

/// Transactions requested per getBlockTransactions page
const BLOCK_PAGE_SIZE: u32 = 40;

#[derive(Parser)]
#[command(name = "ton-watcher")]
#[command(about = "Follows the TON masterchain and reports new blocks and inbound payments")]
#[command(version)]
struct Args {
    /// Configuration file, defaults to $CONFIG_FILE or ./config.toml
    #[arg(long)]
    config: Option<String>,

    /// Database path
    #[arg(long)]
    database: Option<String>,

    /// Watch this address for inbound payments
    #[arg(long)]
    address: Option<String>,

    /// Start after this masterchain seqno
    #[arg(long)]
    from_seqno: Option<u32>,

    /// Print a sample configuration file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_from_file()?,
    };
    config.apply_env_overrides()?;
    if let Some(path) = args.database {
        config.database.path = path;
    }
    if let Some(address) = args.address {
        config.payments.address = Some(address);
    }
    if let Some(seqno) = args.from_seqno {
        config.watcher.start_seqno = Some(seqno);
    }
    config.validate()?;

    init_logging(&config.logging)?;
    info!("Starting TON watcher against {}", config.api.endpoint);

    let store = Arc::new(CursorStore::new_with_config(&config.database)?);
    let client = Arc::new(TonCenterClient::from_config(&config.api)?);
    let ledger: Arc<dyn LedgerReadPort> = client.clone();
    let cursors: Arc<dyn CursorPersistence> = store.clone();

    let block_watcher = BlockWatcher::new(Arc::clone(&ledger), Arc::clone(&cursors), config.watcher.clone());
    let block_client = Arc::clone(&client);
    block_watcher.add_handler(move |block: BlockIdentifier| {
        let client = Arc::clone(&block_client);
        async move {
            let count = count_block_transactions(&client, &block).await?;
            LogContext::new("watcher", "block")
                .with_block(&block)
                .with_metadata("transactions", serde_json::json!(count))
                .info(&format!("Block {} with {} transactions", block, count));
            Ok::<(), HandlerError>(())
        }
    });

    // A ledger that is unreachable at boot is retried until Ctrl-C
    let startup = RetryManager::new("watcher_startup", startup_retry(&config));
    tokio::select! {
        started = startup.execute_until_ok(|| block_watcher.start()) => started?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested before the block watcher started");
            return Ok(());
        }
    }

    let mut payment_parts = None;
    if let Some(address) = config.payments.address.clone() {
        let pending = Arc::new(PendingPayments::new(Arc::clone(&store), &config.payments));
        pending.restore(&address)?;
        pending.start(config.payments.sweep_interval());

        let payments = PaymentWatcher::new(Arc::clone(&ledger), address, &config.payments, Some(Arc::clone(&cursors)));
        let book = Arc::clone(&pending);
        payments.set_handler(move |transaction: TransactionRecord| {
            let book = Arc::clone(&book);
            async move {
                report_payment(&book, &transaction)?;
                Ok::<(), HandlerError>(())
            }
        });
        tokio::select! {
            started = startup.execute_until_ok(|| payments.start()) => started?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested before the payment watcher started");
                block_watcher.stop().await;
                pending.stop().await;
                return Ok(());
            }
        }
        payment_parts = Some((payments, pending));
    }

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    block_watcher.stop().await;
    if let Some((payments, pending)) = payment_parts {
        payments.stop().await;
        pending.stop().await;
    }

    info!("TON watcher stopped at seqno {}", block_watcher.last_checked_seqno());
    Ok(())
}

/// Startup backoff: the API retry delays, allowed to grow to a full poll interval
fn startup_retry(config: &AppConfig) -> RetryConfig {
    let api = RetryConfig::from_api_config(&config.api);
    RetryConfig {
        max_delay: api.max_delay.max(config.watcher.poll_interval()),
        ..api
    }
}

/// Walk every page of a block's transaction list
async fn count_block_transactions(
    client: &TonCenterClient,
    block: &BlockIdentifier,
) -> Result<usize, ton_watcher::RpcError> {
    let mut count = 0;
    let mut after = None;

    loop {
        let page = client.get_block_transactions(block, after.as_ref(), BLOCK_PAGE_SIZE).await?;
        count += page.transactions.len();

        match page.transactions.last() {
            Some(last) if page.incomplete => after = Some(last.id()),
            _ => return Ok(count),
        }
    }
}

/// Log an inbound payment and settle the expectation named by its comment
fn report_payment(
    pending: &PendingPayments,
    transaction: &TransactionRecord,
) -> Result<(), ton_watcher::WatcherError> {
    let uid = transaction.comment();
    let value = transaction.value().unwrap_or(0);

    match pending.get(uid) {
        Some(expected) if value >= expected.amount => {
            pending.consume(uid)?;
            info!("Payment {} settled by {} ({} nanotons)", uid, transaction.hash(), value);
        }
        Some(expected) => {
            warn!(
                "Payment {} underpaid: expected {}, received {} in {}",
                uid,
                expected.amount,
                value,
                transaction.hash()
            );
        }
        None => info!("Unmatched inbound payment {} of {} nanotons", transaction.hash(), value),
    }
    Ok(())
}
