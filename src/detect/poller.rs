//! Pull detection: scan new blocks on a fixed cadence.
use super::DetectionEnd;
use crate::{
    client::{ObservedTransaction, TxHash},
    error::{ClientError, ClientResult},
    matcher::matches_request,
    session::WatcherSession,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Bookkeeping carried from one cycle to the next.
#[derive(Default)]
struct PollState {
    /// Head seen by the first cycle, until the cursor covers it.
    origin: Option<u64>,
    /// Hashes whose lookup failed, with the attempts spent so far.
    retry: Vec<(TxHash, u32)>,
}

/// One cycle in flight at a time; the next one starts only after this one
/// finished and a full cadence elapsed.
pub(crate) async fn run(session: &Arc<WatcherSession>) -> DetectionEnd {
    session.restore_cursor().await;
    let mut state = PollState::default();

    loop {
        if !session.detecting() {
            return DetectionEnd::Stopped;
        }
        if let Err(e) = poll_once(session, &mut state).await {
            warn!(network = %session.network(), error = %e, "poll cycle failed; retrying next cycle");
        }
        if !session.sleep_detection().await {
            return DetectionEnd::Stopped;
        }
    }
}

/// Retry deferred lookups, then scan every block after the cursor up to the
/// current head.
///
/// The first cycle of a fresh session scans only the head. Catch-up is capped
/// to the newest `max_blocks_per_cycle` blocks.
async fn poll_once(session: &Arc<WatcherSession>, state: &mut PollState) -> ClientResult<()> {
    retry_lookups(session, state).await;
    if !session.detecting() {
        return Ok(());
    }

    let head = session.call(session.client.get_block_height()).await?;
    let next = match session.last_block_checked() {
        Some(last) => last + 1,
        None => *state.origin.get_or_insert(head),
    };
    if next > head {
        debug!(network = %session.network(), head, next, "no new block");
        return Ok(());
    }

    let cap = session.settings.max_blocks_per_cycle.max(1);
    let oldest_allowed = head - (cap - 1).min(head);
    if next < oldest_allowed {
        warn!(
            network = %session.network(),
            skipped_from = next,
            skipped_to = oldest_allowed - 1,
            "falling behind; skipping blocks"
        );
    }

    for height in next.max(oldest_allowed)..=head {
        scan_block(session, height, &mut state.retry).await?;
        session.advance_cursor(height).await;
        if !session.detecting() {
            break;
        }
    }
    Ok(())
}

/// Run every transaction of one block through the matcher.
///
/// A failed block fetch aborts the cycle so the block is rescanned. A failed
/// transaction lookup only defers that hash.
async fn scan_block(
    session: &Arc<WatcherSession>,
    height: u64,
    retry: &mut Vec<(TxHash, u32)>,
) -> ClientResult<()> {
    let hashes = session
        .call(session.client.get_block_transaction_hashes(height))
        .await?;
    debug!(network = %session.network(), height, txs = hashes.len(), "checking block");

    for hash in hashes {
        if session.is_cancelled() {
            break;
        }
        match session.call(session.client.get_transaction(hash)).await {
            Ok(Some(tx)) => check(session, tx).await,
            Ok(None) => debug!(tx_hash = ?hash, "transaction not found; skipping"),
            Err(e) => defer(session, retry, hash, 1, &e),
        }
    }
    Ok(())
}

async fn retry_lookups(session: &Arc<WatcherSession>, state: &mut PollState) {
    for (hash, attempts) in std::mem::take(&mut state.retry) {
        if session.is_cancelled() {
            return;
        }
        match session.call(session.client.get_transaction(hash)).await {
            Ok(Some(tx)) => check(session, tx).await,
            Ok(None) => debug!(tx_hash = ?hash, "deferred transaction no longer known; dropping"),
            Err(e) => defer(session, &mut state.retry, hash, attempts + 1, &e),
        }
    }
}

async fn check(session: &Arc<WatcherSession>, tx: ObservedTransaction) {
    if matches_request(&tx, &session.request) {
        session.on_match(tx).await;
    }
}

fn defer(
    session: &WatcherSession,
    retry: &mut Vec<(TxHash, u32)>,
    hash: TxHash,
    attempts: u32,
    err: &ClientError,
) {
    if attempts >= session.settings.max_lookup_attempts {
        warn!(network = %session.network(), tx_hash = ?hash, attempts, error = %err, "giving up on transaction lookup");
    } else {
        debug!(tx_hash = ?hash, attempts, error = %err, "transaction lookup failed; retrying next cycle");
        retry.push((hash, attempts));
    }
}
