#![allow(dead_code)]
//! Scriptable in-memory chain shared by the integration tests.
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};
use tokio::sync::{mpsc, watch};
use txwatch::{
    ChainClient, ChainProfile, ChainRegistry, ClientError, ObservedTransaction, PendingTxStream,
    TxHash, WatchEvent, H256, U256,
};

pub const RECIPIENT: &str = "0xAbC0000000000000000000000000000000000001";
pub const OTHER: &str = "0x9990000000000000000000000000000000000009";
pub const POLL_NET: &str = "testpoll";
pub const PUSH_NET: &str = "testpush";
pub const BLOCK_MS: u64 = 500;

/// Registry with one polling and one push network, both 500 ms blocks, threshold 1.
pub fn registry() -> ChainRegistry {
    let mut reg = ChainRegistry::new();
    reg.insert(ChainProfile {
        id: POLL_NET.into(),
        avg_block_time_ms: BLOCK_MS,
        rpc_endpoint: "fake://poll".into(),
        subscription_endpoint: None,
        default_confirmation_threshold: 1,
    })
    .unwrap();
    reg.insert(ChainProfile {
        id: PUSH_NET.into(),
        avg_block_time_ms: BLOCK_MS,
        rpc_endpoint: "fake://push".into(),
        subscription_endpoint: Some("fake-ws://push".into()),
        default_confirmation_threshold: 1,
    })
    .unwrap();
    reg
}

/// Native transfer with hash `0xnn..nn`.
pub fn transfer(hash_byte: u8, to: &str, value: u64) -> ObservedTransaction {
    ObservedTransaction {
        hash: H256::repeat_byte(hash_byte),
        from: "0x00000000000000000000000000000000000000ff".into(),
        to: Some(to.into()),
        value: U256::from(value),
        block_number: None,
        input: vec![],
    }
}

#[derive(Default)]
struct ChainState {
    height: u64,
    blocks: HashMap<u64, Vec<TxHash>>,
    txs: HashMap<TxHash, ObservedTransaction>,
    fail_heights: u32,
    fail_lookups: u32,
    fail_blocks: u32,
    broken: HashSet<TxHash>,
    lookups: HashMap<TxHash, usize>,
    blocks_requested: Vec<u64>,
    subscriptions: VecDeque<mpsc::UnboundedReceiver<Result<TxHash, ClientError>>>,
}

pub struct FakeChain {
    state: Mutex<ChainState>,
    push_supported: AtomicBool,
    listening: AtomicBool,
    subscribe_calls: AtomicUsize,
    lookups_waiting: AtomicUsize,
    gate: watch::Sender<bool>,
}

impl FakeChain {
    pub fn new(height: u64) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Mutex::new(ChainState {
                height,
                ..Default::default()
            }),
            push_supported: AtomicBool::new(true),
            listening: AtomicBool::new(true),
            subscribe_calls: AtomicUsize::new(0),
            lookups_waiting: AtomicUsize::new(0),
            gate,
        }
    }

    /// Include `txs` in block `height` and move the head there if it is behind.
    pub fn mine(&self, height: u64, txs: Vec<ObservedTransaction>) {
        let mut st = self.state.lock().unwrap();
        let mut hashes = Vec::new();
        for mut tx in txs {
            tx.block_number = Some(height);
            hashes.push(tx.hash);
            st.txs.insert(tx.hash, tx);
        }
        st.blocks.insert(height, hashes);
        st.height = st.height.max(height);
    }

    /// Make a transaction known to the node without a block.
    pub fn add_pending(&self, tx: ObservedTransaction) {
        self.state.lock().unwrap().txs.insert(tx.hash, tx);
    }

    pub fn set_height(&self, h: u64) {
        self.state.lock().unwrap().height = h;
    }

    pub fn fail_next_height_calls(&self, n: u32) {
        self.state.lock().unwrap().fail_heights = n;
    }

    pub fn fail_next_lookups(&self, n: u32) {
        self.state.lock().unwrap().fail_lookups = n;
    }

    pub fn fail_next_block_calls(&self, n: u32) {
        self.state.lock().unwrap().fail_blocks = n;
    }

    /// Every lookup of `hash` fails from now on.
    pub fn break_lookups_of(&self, hash: TxHash) {
        self.state.lock().unwrap().broken.insert(hash);
    }

    /// Lookups started for `hash`, including ones still waiting at the gate.
    pub fn lookups_of(&self, hash: TxHash) -> usize {
        self.state.lock().unwrap().lookups.get(&hash).copied().unwrap_or(0)
    }

    pub fn blocks_requested(&self) -> Vec<u64> {
        self.state.lock().unwrap().blocks_requested.clone()
    }

    /// Queue a subscription; the returned sender feeds it, dropping it ends it.
    pub fn open_subscription(&self) -> mpsc::UnboundedSender<Result<TxHash, ClientError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().unwrap().subscriptions.push_back(rx);
        tx
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn set_push_supported(&self, on: bool) {
        self.push_supported.store(on, Ordering::SeqCst);
    }

    pub fn set_listening(&self, on: bool) {
        self.listening.store(on, Ordering::SeqCst);
    }

    /// Block every transaction lookup until [`FakeChain::open_gate`].
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn lookups_waiting(&self) -> usize {
        self.lookups_waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn get_transaction(&self, hash: TxHash) -> Result<Option<ObservedTransaction>, ClientError> {
        *self.state.lock().unwrap().lookups.entry(hash).or_default() += 1;
        let mut gate = self.gate.subscribe();
        if !*gate.borrow() {
            self.lookups_waiting.fetch_add(1, Ordering::SeqCst);
            let _ = gate.wait_for(|open| *open).await;
            self.lookups_waiting.fetch_sub(1, Ordering::SeqCst);
        }

        let mut st = self.state.lock().unwrap();
        if st.broken.contains(&hash) {
            return Err(ClientError::Retryable(format!("cannot decode {hash:?}")));
        }
        if st.fail_lookups > 0 {
            st.fail_lookups -= 1;
            return Err(ClientError::Retryable("injected lookup failure".into()));
        }
        Ok(st.txs.get(&hash).cloned())
    }

    async fn get_block_height(&self) -> Result<u64, ClientError> {
        let mut st = self.state.lock().unwrap();
        if st.fail_heights > 0 {
            st.fail_heights -= 1;
            return Err(ClientError::Retryable("injected height failure".into()));
        }
        Ok(st.height)
    }

    async fn get_block_transaction_hashes(&self, height: u64) -> Result<Vec<TxHash>, ClientError> {
        let mut st = self.state.lock().unwrap();
        if height > st.height {
            return Err(ClientError::Retryable(format!("block {height} not available")));
        }
        if st.fail_blocks > 0 {
            st.fail_blocks -= 1;
            return Err(ClientError::Retryable("injected block failure".into()));
        }
        st.blocks_requested.push(height);
        Ok(st.blocks.get(&height).cloned().unwrap_or_default())
    }

    async fn subscribe_pending_transactions(&self) -> Result<PendingTxStream, ClientError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if !self.push_supported.load(Ordering::SeqCst) {
            return Err(ClientError::Unsupported("fake without push"));
        }
        let rx = self
            .state
            .lock()
            .unwrap()
            .subscriptions
            .pop_front()
            .ok_or_else(|| ClientError::Retryable("connection refused".into()))?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }

    async fn is_listening(&self) -> Result<bool, ClientError> {
        if self.listening.load(Ordering::SeqCst) {
            Ok(true)
        } else {
            Err(ClientError::Retryable("node down".into()))
        }
    }
}

/// Next event, failing the test if none arrives within ten virtual minutes.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<WatchEvent>) -> WatchEvent {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Poll `cond` every virtual millisecond.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..600_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition never became true");
}
