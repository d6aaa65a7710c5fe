use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::trace;

/// Pacing applied before each write that the remote API rate-limits.
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn wait(&self);
}

/// Sleeps a fixed delay before every call, which serializes creations.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        trace!(delay_ms = self.delay.as_millis() as u64, "Throttling");
        sleep(self.delay).await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl Throttle for NoDelay {
    async fn wait(&self) {}
}
