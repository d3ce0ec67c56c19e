use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use typed_builder::TypedBuilder;

use riskwatch_common::Config;

/// Bounds for one crawl. Every crawl terminates: pages are capped, and a
/// source that keeps failing hits the consecutive-failure cap.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CrawlPolicy {
    #[builder(default = 100)]
    pub max_records: usize,
    #[builder(default = 10)]
    pub max_pages: usize,
    #[builder(default = 3)]
    pub max_consecutive_failures: u32,
    /// Retries per page for transient errors, on top of the first attempt.
    #[builder(default = 3)]
    pub max_retries: u32,
    /// Backoff is `retry_base * 3^attempt` plus up to `retry_jitter`.
    #[builder(default = Duration::from_secs(1))]
    pub retry_base: Duration,
    #[builder(default = Duration::from_millis(1000))]
    pub retry_jitter: Duration,
    #[builder(default = Duration::from_secs(10))]
    pub page_timeout: Duration,
    /// History mode only.
    #[builder(default = chrono::Duration::days(60))]
    pub lookback: chrono::Duration,
}

/// Out-of-range day counts saturate instead of panicking; `Config::validate`
/// rejects them before a run starts.
fn lookback_days(days: i64) -> chrono::Duration {
    chrono::Duration::try_days(days).unwrap_or(chrono::Duration::MAX)
}

impl CrawlPolicy {
    /// Discovery bounds for one channel. The per-channel cap never exceeds
    /// the run-wide total.
    pub fn discovery(config: &Config) -> Self {
        Self::builder()
            .max_records(config.max_records_per_channel.min(config.max_total_records))
            .max_pages(config.max_pages)
            .max_consecutive_failures(config.max_consecutive_failures)
            .max_retries(config.max_retries)
            .page_timeout(config.page_timeout)
            .lookback(lookback_days(config.lookback_days))
            .build()
    }

    pub fn history(config: &Config) -> Self {
        Self::builder()
            .max_records(config.max_history_items)
            .max_pages(config.max_pages)
            .max_consecutive_failures(config.max_consecutive_failures)
            .max_retries(config.max_retries)
            .page_timeout(config.page_timeout)
            .lookback(lookback_days(config.lookback_days))
            .build()
    }

    pub fn with_backoff(mut self, retry_base: Duration, retry_jitter: Duration) -> Self {
        self.retry_base = retry_base;
        self.retry_jitter = retry_jitter;
        self
    }

    /// Delay before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.retry_base.saturating_mul(3u32.saturating_pow(attempt));
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
        };
        base + jitter
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlMode {
    /// Newest records of a channel.
    Discovery,
    /// Age-windowed records of one author.
    History,
}

impl std::fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlMode::Discovery => write!(f, "discovery"),
            CrawlMode::History => write!(f, "history"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    RecordCap,
    PageCap,
    LookbackReached,
    Exhausted,
    /// `max_consecutive_failures` failed pages in a row. A single permanent
    /// error (not found, forbidden) counts as one failure and stops the
    /// crawl immediately.
    SourceUnreliable,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::RecordCap => write!(f, "record cap reached"),
            StopReason::PageCap => write!(f, "page cap reached"),
            StopReason::LookbackReached => write!(f, "lookback window reached"),
            StopReason::Exhausted => write!(f, "source exhausted"),
            StopReason::SourceUnreliable => write!(f, "source unreliable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Fetching,
    Stopped(StopReason),
}

/// Position and accounting of a crawl in progress. Owned by the engine for
/// the duration of one crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlCursor {
    pub token: Option<String>,
    pub pages_fetched: usize,
    pub records_fetched: usize,
    pub oldest_seen: Option<DateTime<Utc>>,
}

impl CrawlCursor {
    pub(crate) fn observe_oldest(&mut self, at: DateTime<Utc>) {
        self.oldest_seen = Some(self.oldest_seen.map_or(at, |seen| seen.min(at)));
    }
}
