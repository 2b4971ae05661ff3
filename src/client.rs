//! Abstraction over a node connection (HTTP JSON-RPC, WebSocket, or a test fake).
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use primitive_types::{H256, U256};

/// Transaction hash.
pub type TxHash = H256;

/// Lazy, unbounded sequence of pending transaction hashes. Dropping it unsubscribes.
pub type PendingTxStream = BoxStream<'static, ClientResult<TxHash>>;

/// A transaction as seen by the node at the time of the query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservedTransaction {
    /// Transaction hash.
    pub hash: TxHash,
    /// Sender address.
    pub from: String,
    /// Recipient address; `None` for contract creation.
    pub to: Option<String>,
    /// Native value in base units.
    pub value: U256,
    /// Including block; `None` while still pending.
    pub block_number: Option<u64>,
    /// Calldata.
    pub input: Vec<u8>,
}

/// Network provider consumed by the watcher.
///
/// Implementations must not retry internally; every failure goes back to the
/// caller as a [`ClientError`].
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch a transaction by hash. `Ok(None)` when the node does not know it.
    async fn get_transaction(&self, hash: TxHash) -> ClientResult<Option<ObservedTransaction>>;

    /// Current best block height.
    async fn get_block_height(&self) -> ClientResult<u64>;

    /// Ordered transaction hashes of the block at `height`.
    async fn get_block_transaction_hashes(&self, height: u64) -> ClientResult<Vec<TxHash>>;

    /// Open a push subscription of pending transaction hashes.
    async fn subscribe_pending_transactions(&self) -> ClientResult<PendingTxStream> {
        Err(ClientError::Unsupported("pending transaction subscription"))
    }

    /// Lightweight liveness probe.
    async fn is_listening(&self) -> ClientResult<bool> {
        self.get_block_height().await.map(|_| true)
    }
}
