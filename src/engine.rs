//! Entry point: start watches against one node connection.
//! 1) resolve the network profile,
//! 2) run pull or push detection through the matcher,
//! 3) track each match until it reaches its confirmation threshold.
use crate::{
    client::ChainClient,
    error::WatchError,
    hooks::WatchHooks,
    matcher::WatchRequest,
    profile::ChainRegistry,
    session::{ConfirmationState, SessionOutcome, SessionParts, WatcherSession},
    store::CursorStore,
    timer::{Timer, TokioTimer},
};
use std::{sync::Arc, time::Duration};
use tokio::task::{JoinError, JoinHandle};

/// Deadline applied to each client call unless overridden.
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning knobs shared by every session a [`TxWatcher`] starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchSettings {
    /// Deadline per client call; `None` waits forever.
    pub rpc_timeout: Option<Duration>,
    /// Tracker cycles before a transaction is abandoned; `None` tracks forever.
    pub max_confirmation_polls: Option<u64>,
    /// Most blocks the poller scans in one cycle when catching up.
    pub max_blocks_per_cycle: u64,
    /// Consecutive failed subscriptions tolerated before push detection stops.
    pub max_resubscribe_attempts: u32,
    /// End detection after the first match (trackers keep running).
    pub stop_detection_on_match: bool,
    /// Lookups the poller spends on one failing transaction hash, the first
    /// one included, before dropping it.
    pub max_lookup_attempts: u32,
    /// Overrides the profile's block time as cycle cadence.
    pub poll_interval: Option<Duration>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            rpc_timeout: Some(DEFAULT_RPC_TIMEOUT),
            max_confirmation_polls: None,
            max_blocks_per_cycle: 16,
            max_resubscribe_attempts: 3,
            stop_detection_on_match: true,
            max_lookup_attempts: 3,
            poll_interval: None,
        }
    }
}

/// Core engine. `C` is the node connection, shared by every session it starts.
pub struct TxWatcher<C> {
    registry: ChainRegistry,
    client: Arc<C>,
    timer: Arc<dyn Timer>,
    store: Option<Arc<dyn CursorStore>>,
    settings: WatchSettings,
}

impl<C> TxWatcher<C>
where
    C: ChainClient + 'static,
{
    /// Create a watcher over `registry` using `client` for every call.
    pub fn new(registry: ChainRegistry, client: C) -> Self {
        Self::with_shared_client(registry, Arc::new(client))
    }

    /// Like [`TxWatcher::new`] for a client that is already shared.
    pub fn with_shared_client(registry: ChainRegistry, client: Arc<C>) -> Self {
        Self {
            registry,
            client,
            timer: Arc::new(TokioTimer),
            store: None,
            settings: WatchSettings::default(),
        }
    }

    /// Replace the clock driving every cadence.
    pub fn with_timer(mut self, timer: impl Timer + 'static) -> Self {
        self.timer = Arc::new(timer);
        self
    }

    /// Persist poll cursors so restarted watches resume.
    pub fn with_store(mut self, store: impl CursorStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Override [`WatchSettings::default`].
    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Profile table this watcher resolves networks against.
    pub fn registry(&self) -> &ChainRegistry {
        &self.registry
    }

    /// Start watching `network` for `request`, reporting to `hooks`.
    ///
    /// Must be called from within a tokio runtime. Fails fast, without
    /// spawning anything, if the network is unknown or the request unusable.
    pub fn start(
        &self,
        network: &str,
        request: WatchRequest,
        hooks: impl WatchHooks + 'static,
    ) -> Result<WatchHandle, WatchError> {
        let profile = self.registry.resolve(network)?.clone();
        if request.recipient.trim().is_empty() {
            return Err(WatchError::InvalidRequest("empty recipient".into()));
        }
        if request
            .token_contract
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            return Err(WatchError::InvalidRequest("empty token contract".into()));
        }

        let client: Arc<dyn ChainClient> = self.client.clone();
        let session = Arc::new(WatcherSession::new(SessionParts {
            profile,
            request,
            settings: self.settings.clone(),
            client,
            timer: Arc::clone(&self.timer),
            hooks: Arc::new(hooks),
            store: self.store.clone(),
        }));
        let task = tokio::spawn(Arc::clone(&session).run());
        Ok(WatchHandle { session, task })
    }

    /// Liveness of the underlying node connection.
    pub async fn is_connected(&self) -> bool {
        self.client.is_listening().await.unwrap_or(false)
    }
}

/// Control over one running watch. Dropping it leaves the watch running.
pub struct WatchHandle {
    session: Arc<WatcherSession>,
    task: JoinHandle<SessionOutcome>,
}

impl WatchHandle {
    /// Set the cancellation flag. Idempotent; no event is emitted afterwards.
    pub fn stop(&self) {
        self.session.cancel();
    }

    /// Current life-cycle state.
    pub fn state(&self) -> ConfirmationState {
        self.session.state()
    }

    /// Highest block the poller has scanned (poll mode only).
    pub fn last_block_checked(&self) -> Option<u64> {
        self.session.last_block_checked()
    }

    /// Effective confirmation threshold for this watch.
    pub fn threshold(&self) -> u64 {
        self.session.threshold
    }

    /// Network the watch runs on.
    pub fn network(&self) -> &str {
        self.session.network()
    }

    /// Liveness of the node connection used by this watch.
    pub async fn is_connected(&self) -> bool {
        self.session.client.is_listening().await.unwrap_or(false)
    }

    /// Whether the session task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end.
    pub async fn join(self) -> Result<SessionOutcome, JoinError> {
        self.task.await
    }
}
