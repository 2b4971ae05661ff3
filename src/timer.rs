//! Injectable sleep so cadence-driven loops can be driven by a fake clock.
use async_trait::async_trait;
use std::time::Duration;

/// Source of delays between detection and tracking cycles.
#[async_trait]
pub trait Timer: Send + Sync {
    /// Complete after `dur` has elapsed on this timer's clock.
    async fn sleep(&self, dur: Duration);
}

/// Tokio's clock. Honours `tokio::time::pause` in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioTimer;

#[async_trait]
impl Timer for TokioTimer {
    async fn sleep(&self, dur: Duration) {
        tokio::time::sleep(dur).await;
    }
}
