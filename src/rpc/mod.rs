//! [`ChainClient`] over Ethereum JSON-RPC: HTTP for queries, WebSocket for
//! the pending-transaction subscription.
use crate::{
    client::{ChainClient, ObservedTransaction, PendingTxStream, TxHash},
    error::{ClientError, ClientResult},
    profile::ChainProfile,
};
use async_trait::async_trait;
use primitive_types::U256;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};

mod ws;

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcErrorObject {
    code: i64,
    message: String,
}

impl From<RpcErrorObject> for ClientError {
    fn from(e: RpcErrorObject) -> Self {
        ClientError::Retryable(format!("node error {}: {}", e.code, e.message))
    }
}

/// Parse a hex quantity such as `"0x1b4"`.
fn parse_quantity(s: &str) -> ClientResult<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| ClientError::Retryable(format!("quantity `{s}` lacks 0x prefix")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ClientError::Retryable(format!("bad quantity `{s}`: {e}")))
}

fn opt_quantity<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Option::<String>::deserialize(d)?
        .map(|s| parse_quantity(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: TxHash,
    from: String,
    to: Option<String>,
    value: U256,
    #[serde(default, deserialize_with = "opt_quantity")]
    block_number: Option<u64>,
    #[serde(default)]
    input: String,
}

impl TryFrom<RpcTransaction> for ObservedTransaction {
    type Error = ClientError;

    fn try_from(tx: RpcTransaction) -> Result<Self, Self::Error> {
        let input = hex::decode(tx.input.trim_start_matches("0x"))
            .map_err(|e| ClientError::Retryable(format!("bad calldata for {:?}: {e}", tx.hash)))?;
        Ok(Self {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            block_number: tx.block_number,
            input,
        })
    }
}

#[derive(Deserialize)]
struct RpcBlock {
    #[serde(default)]
    transactions: Vec<TxHash>,
}

/// JSON-RPC node connection. The HTTP client is pooled and can be shared.
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: String,
    ws_endpoint: Option<String>,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Client for an HTTP JSON-RPC endpoint, without push support.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            ws_endpoint: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Client for the endpoints named by `profile`.
    pub fn from_profile(profile: &ChainProfile) -> Self {
        let client = Self::new(profile.rpc_endpoint.clone());
        match &profile.subscription_endpoint {
            Some(ws) => client.with_subscription_endpoint(ws.clone()),
            None => client,
        }
    }

    /// Enable pending-transaction subscriptions against `url`.
    pub fn with_subscription_endpoint(mut self, url: impl Into<String>) -> Self {
        self.ws_endpoint = Some(url.into());
        self
    }

    /// Reuse an existing (pooled) HTTP client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    async fn request_opt<P, R>(&self, method: &str, params: P) -> ClientResult<Option<R>>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let body = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let resp: RpcResponse<R> = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(ClientError::retryable)?
            .error_for_status()
            .map_err(ClientError::retryable)?
            .json()
            .await
            .map_err(ClientError::retryable)?;
        if let Some(err) = resp.error {
            return Err(err.into());
        }
        Ok(resp.result)
    }

    async fn request<P, R>(&self, method: &str, params: P) -> ClientResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        self.request_opt(method, params)
            .await?
            .ok_or_else(|| ClientError::Retryable(format!("{method}: null result")))
    }
}

#[async_trait]
impl ChainClient for JsonRpcClient {
    async fn get_transaction(&self, hash: TxHash) -> ClientResult<Option<ObservedTransaction>> {
        let tx: Option<RpcTransaction> = self
            .request_opt("eth_getTransactionByHash", json!([hash]))
            .await?;
        tx.map(ObservedTransaction::try_from).transpose()
    }

    async fn get_block_height(&self) -> ClientResult<u64> {
        let n: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&n)
    }

    async fn get_block_transaction_hashes(&self, height: u64) -> ClientResult<Vec<TxHash>> {
        let block: RpcBlock = self
            .request("eth_getBlockByNumber", json!([format!("{height:#x}"), false]))
            .await?;
        Ok(block.transactions)
    }

    async fn subscribe_pending_transactions(&self) -> ClientResult<PendingTxStream> {
        match &self.ws_endpoint {
            Some(url) => ws::subscribe_pending(url).await,
            None => Err(ClientError::Unsupported("no subscription endpoint configured")),
        }
    }

    async fn is_listening(&self) -> ClientResult<bool> {
        self.request("net_listening", json!([])).await
    }
}
