//! Per-transaction confirmation state machine.
use crate::{
    client::TxHash,
    error::{ClientError, ClientResult},
    session::WatcherSession,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// How a tracker ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TrackerOutcome {
    /// This transaction confirmed the session.
    Confirmed,
    /// The session was stopped or confirmed by another transaction.
    Stopped,
    /// Hit `max_confirmation_polls`.
    Abandoned,
}

/// Blocks on top of `block` given the current `head`.
///
/// Pending transactions have depth 0. A head behind `block` (lagging node)
/// also yields 0 rather than underflowing.
pub fn confirmation_depth(block: Option<u64>, head: u64) -> u64 {
    block.map_or(0, |b| head.saturating_sub(b))
}

async fn query_depth(session: &WatcherSession, hash: TxHash) -> ClientResult<u64> {
    let tx = session
        .call(session.client.get_transaction(hash))
        .await?
        .ok_or_else(|| ClientError::Retryable(format!("transaction {hash:?} not found")))?;
    let Some(block) = tx.block_number else {
        return Ok(0);
    };
    let head = session.call(session.client.get_block_height()).await?;
    Ok(confirmation_depth(Some(block), head))
}

/// Poll `hash` every cadence until its depth reaches the session threshold.
///
/// A failed query keeps the last known depth, emits nothing, and retries on
/// the next cycle. Ends early once the session is cancelled or confirmed;
/// otherwise only `max_confirmation_polls` bounds the loop.
pub(crate) async fn run(session: Arc<WatcherSession>, hash: TxHash) -> TrackerOutcome {
    let mut depth = 0u64;
    let mut polls = 0u64;

    loop {
        if !session.sleep_tracking().await {
            return TrackerOutcome::Stopped;
        }

        polls += 1;
        match query_depth(&session, hash).await {
            Ok(d) => {
                depth = d;
                debug!(tx_hash = ?hash, depth, threshold = session.threshold, "confirmation check");
                if depth >= session.threshold {
                    return if session.on_confirmed(hash, depth).await {
                        TrackerOutcome::Confirmed
                    } else {
                        TrackerOutcome::Stopped
                    };
                }
                session.on_confirming(hash, depth).await;
            }
            Err(e) => {
                warn!(tx_hash = ?hash, depth, error = %e, "confirmation check failed; keeping last depth");
            }
        }

        if !session.tracking() {
            return TrackerOutcome::Stopped;
        }
        if session
            .settings
            .max_confirmation_polls
            .is_some_and(|max| polls >= max)
        {
            warn!(tx_hash = ?hash, polls, depth, "giving up on confirmation");
            return TrackerOutcome::Abandoned;
        }
    }
}
