use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::blockchain::port::LedgerReadPort;
use crate::config::ApiConfig;
use crate::error::{ConfigError, RpcError, WatcherError};
use crate::logging::{LogContext, MetricsLogger, PerformanceMonitor};
use crate::models::{
    AddressForms, AddressInformation, BlockHeader, BlockIdentifier, BlockTransactions, ConsensusBlock,
    MasterchainInfo, Shards, TransactionId, TransactionRecord, WalletInformation,
};
use crate::retry::{RetryConfig, RetryManager};

pub const DEFAULT_ENDPOINT: &str = "https://toncenter.com/api/v2/";

/// Envelope wrapped around every toncenter v2 response
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

/// HTTP client for the toncenter v2 API
#[derive(Clone)]
pub struct TonCenterClient {
    client: Client,
    endpoint: String,
    retry: RetryConfig,
}

impl TonCenterClient {
    pub fn new(endpoint: &str) -> Result<Self, WatcherError> {
        Self::from_config(&ApiConfig {
            endpoint: endpoint.to_string(),
            ..ApiConfig::default()
        })
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, WatcherError> {
        let context = LogContext::new("toncenter_client", "initialization")
            .with_metadata("endpoint", json!(config.endpoint))
            .with_metadata("timeout_seconds", json!(config.timeout_seconds))
            .with_metadata("authenticated", json!(config.api_key.is_some()));
        context.info("Initializing toncenter client");

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(api_key).map_err(|_| ConfigError::InvalidValue {
                key: "api.api_key".to_string(),
                value: "<not a valid header value>".to_string(),
            })?;
            headers.insert("X-API-Key", value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(RpcError::from)?;

        let mut endpoint = config.endpoint.clone();
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }

        Ok(Self {
            client,
            endpoint,
            retry: RetryConfig::from_api_config(config),
        })
    }

    /// Replace the retry policy applied to every request
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T, RpcError> {
        let result = RetryManager::new(method, self.retry.clone())
            .execute(|| self.get_once(method, params))
            .await?;

        Ok(serde_json::from_value(result)?)
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T, RpcError> {
        let result = RetryManager::new(method, self.retry.clone())
            .execute(|| self.post_once(method, body))
            .await?;

        Ok(serde_json::from_value(result)?)
    }

    async fn get_once(&self, method: &str, params: &[(&str, String)]) -> Result<Value, RpcError> {
        let response = self
            .client
            .get(format!("{}{}", self.endpoint, method))
            .query(params)
            .send()
            .await?;
        self.finish_call(method, response).await
    }

    async fn post_once(&self, method: &str, body: &Value) -> Result<Value, RpcError> {
        let response = self
            .client
            .post(format!("{}{}", self.endpoint, method))
            .json(body)
            .send()
            .await?;
        self.finish_call(method, response).await
    }

    async fn finish_call(&self, method: &str, response: Response) -> Result<Value, RpcError> {
        let monitor = PerformanceMonitor::new("toncenter_call").with_metadata("method", json!(method));
        let result = unwrap_envelope(response).await;
        let duration = monitor.finish_with_result(&result);

        MetricsLogger::log_api_call(method, duration, result.is_ok());
        result
    }

    /// Up-to-date masterchain state
    pub async fn get_masterchain_info(&self) -> Result<MasterchainInfo, RpcError> {
        self.get("getMasterchainInfo", &[]).await
    }

    /// Latest masterchain block agreed on by the validators
    pub async fn get_consensus_block(&self) -> Result<ConsensusBlock, RpcError> {
        self.get("getConsensusBlock", &[]).await
    }

    /// Shard blocks referenced by masterchain block `seqno`
    pub async fn get_shards(&self, seqno: u32) -> Result<Shards, RpcError> {
        self.get("shards", &[("seqno", seqno.to_string())]).await
    }

    pub async fn get_block_transactions(
        &self,
        block: &BlockIdentifier,
        after: Option<&TransactionId>,
        count: u32,
    ) -> Result<BlockTransactions, RpcError> {
        let mut params = block_params(block);
        params.push(("count", count.to_string()));
        if let Some(after) = after {
            params.push(("after_lt", after.lt.to_string()));
            params.push(("after_hash", after.hash.clone()));
        }

        self.get("getBlockTransactions", &params).await
    }

    pub async fn get_block_header(&self, block: &BlockIdentifier) -> Result<BlockHeader, RpcError> {
        self.get("getBlockHeader", &block_params(block)).await
    }

    /// Find a block of `workchain`/`shard` by seqno, logical time or unix time
    pub async fn lookup_block(
        &self,
        workchain: i32,
        shard: i64,
        seqno: Option<u32>,
        lt: Option<u64>,
        unixtime: Option<u64>,
    ) -> Result<BlockIdentifier, RpcError> {
        let mut params = vec![("workchain", workchain.to_string()), ("shard", shard.to_string())];
        if let Some(seqno) = seqno {
            params.push(("seqno", seqno.to_string()));
        }
        if let Some(lt) = lt {
            params.push(("lt", lt.to_string()));
        }
        if let Some(unixtime) = unixtime {
            params.push(("unixtime", unixtime.to_string()));
        }

        self.get("lookupBlock", &params).await
    }

    /// Transaction history of `address`, newest first.
    ///
    /// `before` starts the page at that transaction (inclusive); `to_lt`
    /// stops it at that logical time.
    pub async fn get_transactions(
        &self,
        address: &str,
        limit: u32,
        before: Option<&TransactionId>,
        to_lt: Option<u64>,
        archival: bool,
    ) -> Result<Vec<TransactionRecord>, RpcError> {
        let mut params = vec![
            ("address", address.to_string()),
            ("limit", limit.to_string()),
            ("archival", archival.to_string()),
        ];
        if let Some(before) = before {
            params.push(("lt", before.lt.to_string()));
            params.push(("hash", before.hash.clone()));
        }
        if let Some(to_lt) = to_lt {
            params.push(("to_lt", to_lt.to_string()));
        }

        self.get("getTransactions", &params).await
    }

    /// Balance of `address` in nanotons
    pub async fn get_address_balance(&self, address: &str) -> Result<u64, RpcError> {
        let balance: Value = self.get("getAddressBalance", &[("address", address.to_string())]).await?;

        match &balance {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        }
        .ok_or_else(|| RpcError::InvalidResponse(format!("Unexpected balance value: {}", balance)))
    }

    /// One of `uninitialized`, `active` or `frozen`
    pub async fn get_address_state(&self, address: &str) -> Result<String, RpcError> {
        self.get("getAddressState", &[("address", address.to_string())]).await
    }

    pub async fn get_address_information(&self, address: &str) -> Result<AddressInformation, RpcError> {
        self.get("getAddressInformation", &[("address", address.to_string())]).await
    }

    /// Full account state, including the contract-specific part, as returned
    pub async fn get_extended_address_information(&self, address: &str) -> Result<Value, RpcError> {
        self.get("getExtendedAddressInformation", &[("address", address.to_string())])
            .await
    }

    pub async fn get_wallet_information(&self, address: &str) -> Result<WalletInformation, RpcError> {
        self.get("getWalletInformation", &[("address", address.to_string())]).await
    }

    /// Raw `workchain:hex` form to user-friendly form
    pub async fn pack_address(&self, address: &str) -> Result<String, RpcError> {
        self.get("packAddress", &[("address", address.to_string())]).await
    }

    /// User-friendly form to raw `workchain:hex` form
    pub async fn unpack_address(&self, address: &str) -> Result<String, RpcError> {
        self.get("unpackAddress", &[("address", address.to_string())]).await
    }

    pub async fn detect_address(&self, address: &str) -> Result<AddressForms, RpcError> {
        self.get("detectAddress", &[("address", address.to_string())]).await
    }

    /// Transaction on `destination` caused by the message `source` created at `created_lt`
    pub async fn try_locate_tx(
        &self,
        source: &str,
        destination: &str,
        created_lt: u64,
    ) -> Result<TransactionRecord, RpcError> {
        self.get("tryLocateTx", &locate_params(source, destination, created_lt))
            .await
    }

    /// Transaction on `source` that sent the message to `destination` at `created_lt`
    pub async fn try_locate_source_tx(
        &self,
        source: &str,
        destination: &str,
        created_lt: u64,
    ) -> Result<TransactionRecord, RpcError> {
        self.get("tryLocateSourceTx", &locate_params(source, destination, created_lt))
            .await
    }

    /// Run get-method `method` of the contract at `address`
    pub async fn run_get_method(&self, address: &str, method: &str, stack: Vec<Value>) -> Result<Value, RpcError> {
        self.post("runGetMethod", &json!({ "address": address, "method": method, "stack": stack }))
            .await
    }

    /// Broadcast a serialized external message
    pub async fn send_boc(&self, boc: &str) -> Result<Value, RpcError> {
        self.post("sendBoc", &json!({ "boc": boc })).await
    }

    /// Send an external message built from its parts instead of a serialized boc
    pub async fn send_query(
        &self,
        address: &str,
        body: &str,
        init_code: Option<&str>,
        init_data: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.post(
            "sendQuery",
            &json!({
                "address": address,
                "body": body,
                "init_code": init_code.unwrap_or(""),
                "init_data": init_data.unwrap_or(""),
            }),
        )
        .await
    }

    pub async fn estimate_fee(
        &self,
        address: &str,
        body: &str,
        init_code: Option<&str>,
        init_data: Option<&str>,
        ignore_chksig: bool,
    ) -> Result<Value, RpcError> {
        self.post(
            "estimateFee",
            &json!({
                "address": address,
                "body": body,
                "init_code": init_code.unwrap_or(""),
                "init_data": init_data.unwrap_or(""),
                "ignore_chksig": ignore_chksig,
            }),
        )
        .await
    }
}

#[async_trait]
impl LedgerReadPort for TonCenterClient {
    async fn get_latest_masterchain_seqno(&self) -> Result<u32, RpcError> {
        Ok(self.get_masterchain_info().await?.last.seqno)
    }

    async fn get_shard_list(&self, seqno: u32) -> Result<Vec<BlockIdentifier>, RpcError> {
        Ok(self.get_shards(seqno).await?.shards)
    }

    async fn get_block_transactions(
        &self,
        block: &BlockIdentifier,
        after: Option<&TransactionId>,
        count: u32,
    ) -> Result<BlockTransactions, RpcError> {
        TonCenterClient::get_block_transactions(self, block, after, count).await
    }

    async fn get_account_transactions(
        &self,
        address: &str,
        limit: u32,
        before: Option<&TransactionId>,
    ) -> Result<Vec<TransactionRecord>, RpcError> {
        self.get_transactions(address, limit, before, None, false).await
    }
}

fn block_params(block: &BlockIdentifier) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("workchain", block.workchain.to_string()),
        ("shard", block.shard.to_string()),
        ("seqno", block.seqno.to_string()),
    ];
    if let Some(root_hash) = &block.root_hash {
        params.push(("root_hash", root_hash.clone()));
    }
    if let Some(file_hash) = &block.file_hash {
        params.push(("file_hash", file_hash.clone()));
    }
    params
}

fn locate_params(source: &str, destination: &str, created_lt: u64) -> [(&'static str, String); 3] {
    [
        ("source", source.to_string()),
        ("destination", destination.to_string()),
        ("created_lt", created_lt.to_string()),
    ]
}

/// Map a toncenter response onto its result or a classified error
async fn unwrap_envelope(response: Response) -> Result<Value, RpcError> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await?;

    let envelope = serde_json::from_str::<ApiResponse>(&body).ok();
    let message = envelope
        .as_ref()
        .and_then(|e| e.error.clone())
        .unwrap_or_else(|| body.trim().to_string());

    match status {
        200 => match envelope {
            Some(ApiResponse { ok: true, result, .. }) => Ok(result),
            Some(_) => Err(RpcError::Generic { status, message }),
            None => Err(RpcError::InvalidResponse(format!("Undecodable response body: {}", message))),
        },
        422 => Err(RpcError::Validation(message)),
        504 => Err(RpcError::Timeout),
        429 => Err(RpcError::RateLimit {
            seconds: retry_after.unwrap_or(1),
        }),
        _ => Err(RpcError::Generic { status, message }),
    }
}
