//! Push detection: evaluate pending transaction hashes as the node announces them.
use super::DetectionEnd;
use crate::{
    client::{PendingTxStream, TxHash},
    matcher::matches_request,
    session::WatcherSession,
};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hold one subscription at a time; resubscribe after a drop, up to
/// `max_resubscribe_attempts` consecutive failures.
pub(crate) async fn run(session: &Arc<WatcherSession>) -> DetectionEnd {
    let max_failures = session.settings.max_resubscribe_attempts;
    let mut failures = 0u32;

    loop {
        if !session.detecting() {
            return DetectionEnd::Stopped;
        }

        match session
            .call(session.client.subscribe_pending_transactions())
            .await
        {
            Ok(stream) => {
                info!(network = %session.network(), "subscribed to pending transactions");
                match consume(session, stream).await {
                    Consumed::Stopped => return DetectionEnd::Stopped,
                    Consumed::Dropped { delivered } => {
                        if delivered > 0 {
                            failures = 0;
                        }
                        warn!(network = %session.network(), delivered, "subscription dropped");
                    }
                }
            }
            Err(e) if !e.is_retryable() => {
                warn!(network = %session.network(), error = %e, "push detection unavailable");
                return DetectionEnd::Failed;
            }
            Err(e) => warn!(network = %session.network(), error = %e, "subscribe failed"),
        }

        failures += 1;
        if failures > max_failures {
            warn!(network = %session.network(), attempts = failures, "giving up on subscription");
            return DetectionEnd::Failed;
        }
        if !session.sleep_detection().await {
            return DetectionEnd::Stopped;
        }
    }
}

enum Consumed {
    Stopped,
    Dropped { delivered: u64 },
}

/// Read hashes until the stream ends or detection is stopped. Dropping the
/// stream on return unsubscribes.
async fn consume(session: &Arc<WatcherSession>, mut stream: PendingTxStream) -> Consumed {
    let mut delivered = 0u64;
    loop {
        let next = tokio::select! {
            biased;
            _ = session.detection_stopped() => return Consumed::Stopped,
            next = stream.next() => next,
        };
        match next {
            Some(Ok(hash)) => {
                delivered += 1;
                check_hash(session, hash).await;
            }
            Some(Err(e)) => {
                debug!(network = %session.network(), error = %e, "subscription error");
                return Consumed::Dropped { delivered };
            }
            None => return Consumed::Dropped { delivered },
        }
    }
}

/// A hash arriving after stop is still evaluated; `on_match` discards it.
async fn check_hash(session: &Arc<WatcherSession>, hash: TxHash) {
    match session.call(session.client.get_transaction(hash)).await {
        Ok(Some(tx)) if matches_request(&tx, &session.request) => session.on_match(tx).await,
        Ok(Some(_)) => {}
        Ok(None) => debug!(tx_hash = ?hash, "pending transaction vanished"),
        Err(e) => debug!(tx_hash = ?hash, error = %e, "pending transaction lookup failed"),
    }
}
