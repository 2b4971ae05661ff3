//! Per-watch state shared by the detection strategy and its trackers.
use crate::{
    client::{ChainClient, ObservedTransaction, TxHash},
    detect::{self, DetectionEnd},
    engine::WatchSettings,
    error::{ClientError, ClientResult},
    hooks::{WatchEvent, WatchHooks},
    matcher::WatchRequest,
    profile::ChainProfile,
    store::CursorStore,
    timer::Timer,
    tracker::{self, TrackerOutcome},
};
use std::{
    collections::HashSet,
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};
use tokio::{sync::Notify, task::JoinSet};
use tracing::{debug, info, warn};

/// Life cycle of a watch. Only moves forward; `Confirmed` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfirmationState {
    /// Waiting for a matching transaction.
    Pending,
    /// A match was found.
    Detected,
    /// At least one confirmation query has run below threshold.
    Confirming,
    /// Threshold reached.
    Confirmed,
    /// Stopped by the caller.
    Cancelled,
}

impl ConfirmationState {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Detected => 1,
            Self::Confirming => 2,
            Self::Confirmed | Self::Cancelled => 3,
        }
    }

    /// `Confirmed` or `Cancelled`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The first transaction to reach its threshold.
    Confirmed {
        /// Hash of that transaction.
        tx_hash: TxHash,
        /// Depth reported in its `Confirmed` event.
        confirmations: u64,
    },
    /// `stop()` was called before confirmation.
    Cancelled,
    /// Every tracker hit `max_confirmation_polls` first.
    Abandoned,
    /// Detection gave up (subscription lost) without confirming anything.
    DetectionFailed,
}

/// Set-once flag that wakes every waiter when raised.
#[derive(Default)]
pub(crate) struct Signal {
    raised: AtomicBool,
    notify: Notify,
}

impl Signal {
    /// Returns true the first time only.
    pub(crate) fn raise(&self) -> bool {
        let first = !self.raised.swap(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        first
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    pub(crate) async fn raised(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}

/// One caller-initiated watch.
pub(crate) struct WatcherSession {
    pub(crate) profile: ChainProfile,
    pub(crate) request: WatchRequest,
    pub(crate) threshold: u64,
    pub(crate) settings: WatchSettings,
    pub(crate) client: Arc<dyn ChainClient>,
    timer: Arc<dyn Timer>,
    hooks: Arc<dyn WatchHooks>,
    store: Option<Arc<dyn CursorStore>>,
    state: Mutex<ConfirmationState>,
    confirmed: Mutex<Option<(TxHash, u64)>>,
    /// Caller stop. Never cleared.
    cancel: Signal,
    /// Detection should end (cancel, confirmation, or first match).
    detection_stop: Signal,
    /// Trackers should end (cancel or confirmation).
    tracking_stop: Signal,
    tracked: Mutex<HashSet<TxHash>>,
    last_block_checked: Mutex<Option<u64>>,
    trackers: Mutex<JoinSet<TrackerOutcome>>,
}

pub(crate) struct SessionParts {
    pub(crate) profile: ChainProfile,
    pub(crate) request: WatchRequest,
    pub(crate) settings: WatchSettings,
    pub(crate) client: Arc<dyn ChainClient>,
    pub(crate) timer: Arc<dyn Timer>,
    pub(crate) hooks: Arc<dyn WatchHooks>,
    pub(crate) store: Option<Arc<dyn CursorStore>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // state stays consistent even if a holder panicked mid-update
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WatcherSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        let threshold = parts
            .request
            .confirmation_threshold
            .unwrap_or(parts.profile.default_confirmation_threshold);
        Self {
            profile: parts.profile,
            request: parts.request,
            threshold,
            settings: parts.settings,
            client: parts.client,
            timer: parts.timer,
            hooks: parts.hooks,
            store: parts.store,
            state: Mutex::new(ConfirmationState::Pending),
            confirmed: Mutex::new(None),
            cancel: Signal::default(),
            detection_stop: Signal::default(),
            tracking_stop: Signal::default(),
            tracked: Mutex::new(HashSet::new()),
            last_block_checked: Mutex::new(None),
            trackers: Mutex::new(JoinSet::new()),
        }
    }

    pub(crate) fn network(&self) -> &str {
        &self.profile.id
    }

    /// Cycle cadence for both detection and tracking.
    pub(crate) fn interval(&self) -> Duration {
        self.settings
            .poll_interval
            .unwrap_or_else(|| self.profile.avg_block_time())
    }

    pub(crate) fn state(&self) -> ConfirmationState {
        *lock(&self.state)
    }

    fn advance(&self, next: ConfirmationState) -> bool {
        let mut cur = lock(&self.state);
        if cur.is_terminal() || next.rank() < cur.rank() {
            return false;
        }
        *cur = next;
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_raised()
    }

    /// Set the cancellation flag. Idempotent.
    pub(crate) fn cancel(&self) {
        if self.cancel.raise() {
            self.advance(ConfirmationState::Cancelled);
            info!(network = %self.network(), recipient = %self.request.recipient, "watch stopped");
        }
        self.detection_stop.raise();
        self.tracking_stop.raise();
    }

    /// Whether the detection strategy should run another cycle.
    pub(crate) fn detecting(&self) -> bool {
        !self.detection_stop.is_raised()
    }

    pub(crate) async fn detection_stopped(&self) {
        self.detection_stop.raised().await
    }

    /// Sleep one cadence; false if detection was stopped meanwhile.
    pub(crate) async fn sleep_detection(&self) -> bool {
        self.sleep_until(&self.detection_stop, self.interval()).await
    }

    /// Whether trackers should keep polling.
    pub(crate) fn tracking(&self) -> bool {
        !self.tracking_stop.is_raised()
    }

    /// Sleep one cadence; false if the session was cancelled or confirmed meanwhile.
    pub(crate) async fn sleep_tracking(&self) -> bool {
        self.sleep_until(&self.tracking_stop, self.interval()).await
    }

    async fn sleep_until(&self, signal: &Signal, dur: Duration) -> bool {
        tokio::select! {
            _ = signal.raised() => false,
            _ = self.timer.sleep(dur) => !signal.is_raised(),
        }
    }

    /// Run a client call under the configured deadline.
    pub(crate) async fn call<T>(&self, fut: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        match self.settings.rpc_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| ClientError::Timeout(limit))?,
            None => fut.await,
        }
    }

    /// Deliver an event unless the session has been cancelled.
    pub(crate) async fn emit(&self, event: WatchEvent) {
        if self.is_cancelled() {
            debug!(tx_hash = ?event.tx_hash, kind = ?event.kind, "dropping event after stop");
            return;
        }
        if let Err(e) = self.hooks.on_event(event).await {
            warn!(network = %self.network(), error = %e, "watch hook failed");
        }
    }

    /// A transaction passed the matcher: report it and start tracking it once.
    pub(crate) async fn on_match(self: &Arc<Self>, tx: ObservedTransaction) {
        if !self.tracking() {
            return;
        }
        let hash = tx.hash;
        if !lock(&self.tracked).insert(hash) {
            debug!(tx_hash = ?hash, "already tracking");
            return;
        }

        info!(
            network = %self.network(),
            tx_hash = ?hash,
            from = %tx.from,
            value = %tx.value,
            "found incoming transaction"
        );
        self.advance(ConfirmationState::Detected);
        self.emit(WatchEvent::detected(tx)).await;

        if self.settings.stop_detection_on_match {
            self.detection_stop.raise();
        }
        if !self.tracking() {
            return;
        }
        lock(&self.trackers).spawn(tracker::run(Arc::clone(self), hash));
    }

    /// Report a below-threshold depth.
    pub(crate) async fn on_confirming(&self, hash: TxHash, depth: u64) {
        if !self.advance(ConfirmationState::Confirming) {
            debug!(tx_hash = ?hash, depth, "session already ended; not reporting depth");
            return;
        }
        self.emit(WatchEvent::confirmation(hash, depth, false)).await;
    }

    /// Report the terminal depth for `hash` and release the session.
    ///
    /// Only the first transaction to get here confirms the session; returns
    /// false for every later one, which is not reported.
    pub(crate) async fn on_confirmed(&self, hash: TxHash, depth: u64) -> bool {
        if !self.advance(ConfirmationState::Confirmed) {
            debug!(tx_hash = ?hash, depth, "session already ended; not reporting confirmation");
            return false;
        }
        *lock(&self.confirmed) = Some((hash, depth));
        self.detection_stop.raise();
        self.tracking_stop.raise();
        info!(
            network = %self.network(),
            tx_hash = ?hash,
            confirmations = depth,
            "transaction confirmed"
        );
        self.emit(WatchEvent::confirmation(hash, depth, true)).await;
        true
    }

    pub(crate) fn last_block_checked(&self) -> Option<u64> {
        *lock(&self.last_block_checked)
    }

    fn cursor_key(&self) -> String {
        let mut key = format!(
            "{}:{}",
            self.profile.id,
            self.request.recipient.trim().to_ascii_lowercase()
        );
        if let Some(token) = &self.request.token_contract {
            key.push(':');
            key.push_str(&token.trim().to_ascii_lowercase());
        }
        key
    }

    /// Seed the cursor from the store, if one is attached.
    pub(crate) async fn restore_cursor(&self) {
        let Some(store) = &self.store else { return };
        match store.load_cursor(&self.cursor_key()).await {
            Ok(Some(h)) => {
                debug!(network = %self.network(), height = h, "resuming from stored cursor");
                let mut cur = lock(&self.last_block_checked);
                *cur = Some(cur.map_or(h, |c| c.max(h)));
            }
            Ok(None) => {}
            Err(e) => warn!(network = %self.network(), error = %e, "cursor load failed"),
        }
    }

    /// Move the cursor forward to `height`. Never moves it back.
    pub(crate) async fn advance_cursor(&self, height: u64) {
        {
            let mut cur = lock(&self.last_block_checked);
            if cur.is_some_and(|c| c >= height) {
                return;
            }
            *cur = Some(height);
        }
        if let Some(store) = &self.store {
            if let Err(e) = store.save_cursor(&self.cursor_key(), height).await {
                warn!(network = %self.network(), height, error = %e, "cursor save failed");
            }
        }
    }

    /// Drive detection, then wait for every tracker it started.
    pub(crate) async fn run(self: Arc<Self>) -> SessionOutcome {
        info!(
            network = %self.network(),
            recipient = %self.request.recipient,
            amount = %self.request.expected_amount,
            threshold = self.threshold,
            push = self.profile.uses_subscription(),
            "watch started"
        );
        let detection = if self.profile.uses_subscription() {
            detect::subscriber::run(&self).await
        } else {
            detect::poller::run(&self).await
        };

        let mut trackers = std::mem::take(&mut *lock(&self.trackers));
        let mut abandoned = false;
        while let Some(res) = trackers.join_next().await {
            match res {
                Ok(TrackerOutcome::Abandoned) => abandoned = true,
                Ok(_) => {}
                Err(e) => warn!(network = %self.network(), error = %e, "tracker task failed"),
            }
        }

        let confirmed = *lock(&self.confirmed);
        if let Some((tx_hash, confirmations)) = confirmed {
            return SessionOutcome::Confirmed {
                tx_hash,
                confirmations,
            };
        }
        if self.is_cancelled() {
            SessionOutcome::Cancelled
        } else if abandoned {
            SessionOutcome::Abandoned
        } else {
            match detection {
                DetectionEnd::Failed => SessionOutcome::DetectionFailed,
                DetectionEnd::Stopped => SessionOutcome::Cancelled,
            }
        }
    }
}
