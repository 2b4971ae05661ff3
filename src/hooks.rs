//! Wallet glue: receive state-change notifications for a watch.
use crate::client::{ObservedTransaction, TxHash};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Transition reported to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A matching transaction was found.
    Detected,
    /// The transaction has a new (not yet sufficient) confirmation depth.
    NewConfirmation,
    /// Threshold reached. Terminal for this hash.
    Confirmed,
}

/// One callback payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// What happened.
    pub kind: EventKind,
    /// Transaction the event is about.
    pub tx_hash: TxHash,
    /// Confirmation depth at the time of the event (0 on detection).
    pub num_confirmations: u64,
    /// The matched transaction; only present on [`EventKind::Detected`].
    pub tx: Option<ObservedTransaction>,
}

impl WatchEvent {
    pub(crate) fn detected(tx: ObservedTransaction) -> Self {
        Self {
            kind: EventKind::Detected,
            tx_hash: tx.hash,
            num_confirmations: 0,
            tx: Some(tx),
        }
    }

    pub(crate) fn confirmation(tx_hash: TxHash, depth: u64, confirmed: bool) -> Self {
        Self {
            kind: if confirmed {
                EventKind::Confirmed
            } else {
                EventKind::NewConfirmation
            },
            tx_hash,
            num_confirmations: depth,
            tx: None,
        }
    }
}

/// Callback sink for a watch session.
///
/// Errors are logged by the session and never stop it.
#[async_trait]
pub trait WatchHooks: Send + Sync {
    /// Called once per state transition, in order for any given hash.
    async fn on_event(&self, event: WatchEvent) -> anyhow::Result<()>;
}

/// Forwards every event into an unbounded channel.
pub struct ChannelHooks {
    tx: mpsc::UnboundedSender<WatchEvent>,
}

impl ChannelHooks {
    /// Create the sink and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WatchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WatchHooks for ChannelHooks {
    async fn on_event(&self, event: WatchEvent) -> anyhow::Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("event receiver dropped"))
    }
}
