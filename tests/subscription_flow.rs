mod common;

use common::*;
use std::{sync::Arc, time::Duration};
use txwatch::{
    ChannelHooks, ConfirmationState, EventKind, SessionOutcome, TxWatcher, WatchRequest,
    WatchSettings, H256, U256,
};

fn watcher(chain: &Arc<FakeChain>) -> TxWatcher<FakeChain> {
    TxWatcher::with_shared_client(registry(), Arc::clone(chain))
}

#[tokio::test(start_paused = true)]
async fn pending_match_is_tracked_until_mined() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(200));
    let feed = chain.open_subscription();
    let (hooks, mut rx) = ChannelHooks::new();

    let handle = watcher(&chain).start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(42)), hooks)?;

    let tx = transfer(0xc0, RECIPIENT, 42);
    chain.add_pending(tx.clone());
    feed.send(Ok(tx.hash))?;

    let detected = next_event(&mut rx).await;
    assert_eq!(detected.kind, EventKind::Detected);
    assert_eq!(detected.tx.as_ref().and_then(|t| t.block_number), None);
    assert_eq!(handle.last_block_checked(), None, "push mode keeps no cursor");

    let waiting = next_event(&mut rx).await;
    assert_eq!((waiting.kind, waiting.num_confirmations), (EventKind::NewConfirmation, 0));

    chain.mine(201, vec![tx]);
    chain.set_height(202);

    let done = next_event(&mut rx).await;
    assert_eq!((done.kind, done.num_confirmations), (EventKind::Confirmed, 1));
    assert_eq!(
        handle.join().await?,
        SessionOutcome::Confirmed {
            tx_hash: H256::repeat_byte(0xc0),
            confirmations: 1
        }
    );
    assert_eq!(chain.subscribe_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn repeated_hash_is_tracked_once() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(10));
    let feed = chain.open_subscription();
    let (hooks, mut rx) = ChannelHooks::new();

    let settings = WatchSettings {
        stop_detection_on_match: false,
        ..WatchSettings::default()
    };
    let handle = watcher(&chain)
        .with_settings(settings)
        .start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(5)), hooks)?;

    let tx = transfer(0xd1, RECIPIENT, 5);
    chain.mine(10, vec![tx.clone()]);
    chain.set_height(11);
    feed.send(Ok(tx.hash))?;
    feed.send(Ok(tx.hash))?;
    feed.send(Ok(H256::repeat_byte(0xee)))?; // unknown to the node

    let mut events = Vec::new();
    loop {
        let ev = next_event(&mut rx).await;
        let last = ev.kind == EventKind::Confirmed;
        events.push(ev);
        if last {
            break;
        }
    }
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Detected, EventKind::Confirmed]);
    assert_eq!(handle.join().await?, SessionOutcome::Confirmed {
        tx_hash: tx.hash,
        confirmations: 1
    });
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn confirmation_releases_the_other_trackers() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(10));
    let feed = chain.open_subscription();
    let (hooks, mut rx) = ChannelHooks::new();

    let settings = WatchSettings {
        stop_detection_on_match: false,
        ..WatchSettings::default()
    };
    let handle = watcher(&chain)
        .with_settings(settings)
        .start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(5)), hooks)?;

    let mined = transfer(0xa1, RECIPIENT, 5);
    let stuck = transfer(0xb2, RECIPIENT, 5);
    chain.mine(10, vec![mined.clone()]);
    chain.set_height(11);
    chain.add_pending(stuck.clone());
    feed.send(Ok(mined.hash))?;
    feed.send(Ok(stuck.hash))?;

    // `stuck` is never mined; the session must still finish.
    let outcome = tokio::time::timeout(Duration::from_secs(60), handle.join()).await??;
    assert_eq!(
        outcome,
        SessionOutcome::Confirmed {
            tx_hash: mined.hash,
            confirmations: 1
        }
    );

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    let confirmed_at = events
        .iter()
        .position(|e| e.kind == EventKind::Confirmed)
        .expect("a Confirmed event");
    assert_eq!(events[confirmed_at].tx_hash, mined.hash);
    assert_eq!(confirmed_at, events.len() - 1, "nothing after Confirmed");
    assert!(events
        .iter()
        .filter(|e| e.tx_hash == stuck.hash)
        .all(|e| e.kind != EventKind::Confirmed));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn resubscribes_after_drop() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(1));
    drop(chain.open_subscription());
    let feed = chain.open_subscription();
    let (hooks, mut rx) = ChannelHooks::new();

    let handle = watcher(&chain).start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(9)), hooks)?;

    let tx = transfer(0x99, RECIPIENT, 9);
    chain.add_pending(tx.clone());
    wait_until(|| chain.subscribe_calls() == 2).await;
    feed.send(Ok(tx.hash))?;

    assert_eq!(next_event(&mut rx).await.kind, EventKind::Detected);
    handle.stop();
    assert_eq!(handle.join().await?, SessionOutcome::Cancelled);
    assert_eq!(chain.subscribe_calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_repeated_subscription_failures() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(1));
    let (hooks, mut rx) = ChannelHooks::new();

    let settings = WatchSettings {
        max_resubscribe_attempts: 2,
        ..WatchSettings::default()
    };
    let handle = watcher(&chain)
        .with_settings(settings)
        .start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(9)), hooks)?;

    assert_eq!(handle.join().await?, SessionOutcome::DetectionFailed);
    assert_eq!(chain.subscribe_calls(), 3);
    assert!(rx.recv().await.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unsupported_push_fails_immediately() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(1));
    chain.set_push_supported(false);
    let (hooks, _rx) = ChannelHooks::new();

    let handle = watcher(&chain).start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(9)), hooks)?;
    assert_eq!(handle.join().await?, SessionOutcome::DetectionFailed);
    assert_eq!(chain.subscribe_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn hashes_after_stop_are_discarded() -> anyhow::Result<()> {
    let chain = Arc::new(FakeChain::new(3));
    let feed = chain.open_subscription();
    let (hooks, mut rx) = ChannelHooks::new();

    let handle = watcher(&chain).start(PUSH_NET, WatchRequest::new(RECIPIENT, U256::from(4)), hooks)?;
    wait_until(|| chain.subscribe_calls() == 1).await;

    handle.stop();
    assert_eq!(handle.state(), ConfirmationState::Cancelled);

    let tx = transfer(0x44, RECIPIENT, 4);
    chain.add_pending(tx.clone());
    let _ = feed.send(Ok(tx.hash));

    assert_eq!(handle.join().await?, SessionOutcome::Cancelled);
    assert!(rx.recv().await.is_none());
    Ok(())
}
