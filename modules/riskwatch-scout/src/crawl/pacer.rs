use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Hook run between page fetches of a crawl, so callers can enforce
/// politeness toward the source.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

pub struct NoDelay;

#[async_trait]
impl Pacer for NoDelay {
    async fn pause(&self) {}
}

pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Pacer for FixedDelay {
    async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

/// `FixedDelay` for a non-zero delay, otherwise `NoDelay`.
pub fn pacer_for(delay: Duration) -> Arc<dyn Pacer> {
    if delay.is_zero() {
        Arc::new(NoDelay)
    } else {
        Arc::new(FixedDelay::new(delay))
    }
}
