// Pagination / crawl engine.
//
// One crawl walks a single target page by page. Pages inside a crawl are
// strictly sequential (each cursor comes from the previous response);
// independent crawls run side by side on the worker pool.
//
// Idle -> Fetching -> ... -> Stopped(reason). Stop checks run after every
// page in a fixed order and the first match wins:
//   record cap, page cap, lookback (history only), exhausted, failure streak.

mod pacer;
mod policy;

pub use pacer::{pacer_for, FixedDelay, NoDelay, Pacer};
pub use policy::{CrawlCursor, CrawlMode, CrawlPolicy, CrawlState, StopReason};

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use riskwatch_common::Record;

use crate::error::FetchError;
use crate::source::{CrawlTarget, Page, SourceClient};

/// Terminal result of one crawl. Failures never surface as errors: they are
/// folded into the counters and the stop reason.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub target: CrawlTarget,
    pub mode: CrawlMode,
    /// Unscored records, in crawl order.
    pub records: Vec<Record>,
    pub stop_reason: StopReason,
    /// Pages that came back, readable or not.
    pub pages_fetched: usize,
    /// Every call into the source, retries included.
    pub fetch_calls: usize,
    /// Records returned by the source before filtering.
    pub records_fetched: usize,
    /// Records dropped for falling outside the history window.
    pub filtered: usize,
    pub duplicates: usize,
    /// Pages given up on after retries, plus permanent errors.
    pub failures: usize,
    pub parse_failures: usize,
    /// Items the source could not turn into records.
    pub skipped: usize,
    pub oldest_seen: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl CrawlOutcome {
    pub fn is_degraded(&self) -> bool {
        self.stop_reason == StopReason::SourceUnreliable
    }

    pub fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            target: self.target.to_string(),
            mode: self.mode,
            stop_reason: self.stop_reason,
            pages_fetched: self.pages_fetched,
            records: self.records.len(),
            failures: self.failures,
            parse_failures: self.parse_failures,
        }
    }
}

/// Record-free view of an outcome for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlSummary {
    pub target: String,
    pub mode: CrawlMode,
    pub stop_reason: StopReason,
    pub pages_fetched: usize,
    pub records: usize,
    pub failures: usize,
    pub parse_failures: usize,
}

/// A history crawl together with the window it was bounded by. Every record
/// in `outcome.records` lies inside `[window_start, window_end]`.
#[derive(Debug, Clone)]
pub struct HistoryCrawl {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub outcome: CrawlOutcome,
}

impl HistoryCrawl {
    pub fn author(&self) -> &str {
        self.outcome.target.name()
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

enum PageAttempt {
    Fetched(Page),
    Unreadable(FetchError),
    Failed(FetchError),
}

#[derive(Default)]
struct Tally {
    fetch_calls: usize,
    filtered: usize,
    duplicates: usize,
    failures: usize,
    parse_failures: usize,
    skipped: usize,
    last_error: Option<String>,
}

pub struct CrawlEngine {
    source: Arc<dyn SourceClient>,
    pacer: Arc<dyn Pacer>,
}

impl CrawlEngine {
    pub fn new(source: Arc<dyn SourceClient>) -> Self {
        Self {
            source,
            pacer: Arc::new(NoDelay),
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Newest records of a channel.
    pub async fn discover(&self, channel: &str, policy: &CrawlPolicy) -> CrawlOutcome {
        self.crawl(
            CrawlTarget::Channel(channel.to_string()),
            CrawlMode::Discovery,
            None,
            policy,
        )
        .await
    }

    /// An author's records from the last `policy.lookback`.
    pub async fn history(&self, author: &str, policy: &CrawlPolicy) -> HistoryCrawl {
        let window_end = Utc::now();
        let window_start = window_end
            .checked_sub_signed(policy.lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.history_window(author, window_start, window_end, policy)
            .await
    }

    /// An author's records inside an explicit window, e.g. everything since
    /// the last time the author was checked.
    pub async fn history_window(
        &self,
        author: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        policy: &CrawlPolicy,
    ) -> HistoryCrawl {
        let window = Window {
            start: window_start,
            end: window_end,
        };
        let outcome = self
            .crawl(
                CrawlTarget::Author(author.to_string()),
                CrawlMode::History,
                Some(window),
                policy,
            )
            .await;
        HistoryCrawl {
            window_start,
            window_end,
            outcome,
        }
    }

    async fn crawl(
        &self,
        target: CrawlTarget,
        mode: CrawlMode,
        window: Option<Window>,
        policy: &CrawlPolicy,
    ) -> CrawlOutcome {
        let mut state = CrawlState::Idle;
        let mut cursor = CrawlCursor::default();
        let mut tally = Tally::default();
        let mut records: Vec<Record> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut streak: u32 = 0;

        let stop_reason = if let Some(reason) = cap_reached(policy, &cursor, 0) {
            reason
        } else {
            transition(&target, &mut state, CrawlState::Fetching);
            let mut first = true;
            loop {
                if !first {
                    self.pacer.pause().await;
                }
                first = false;

                match self
                    .fetch_with_retry(&target, cursor.token.as_deref(), policy, &mut tally)
                    .await
                {
                    PageAttempt::Fetched(page) => {
                        streak = 0;
                        cursor.pages_fetched += 1;
                        cursor.records_fetched += page.records.len();
                        tally.skipped += page.skipped;

                        let page_oldest = page.records.iter().map(|r| r.created_at).min();
                        if let Some(oldest) = page_oldest {
                            cursor.observe_oldest(oldest);
                        }

                        let page_len = page.records.len();
                        for record in page.records {
                            if let Some(w) = window {
                                if !w.contains(record.created_at) {
                                    tally.filtered += 1;
                                    continue;
                                }
                            }
                            if !seen.insert(record.id.clone()) {
                                tally.duplicates += 1;
                                continue;
                            }
                            records.push(record);
                        }
                        cursor.token = page.next_cursor;
                        debug!(
                            crawl = %target,
                            page = cursor.pages_fetched,
                            page_len,
                            kept = records.len(),
                            has_next = cursor.token.is_some(),
                            "Page fetched"
                        );

                        if let Some(reason) = cap_reached(policy, &cursor, records.len()) {
                            break reason;
                        }
                        if let (Some(w), Some(oldest)) = (window, page_oldest) {
                            if oldest < w.start {
                                break StopReason::LookbackReached;
                            }
                        }
                        if cursor.token.is_none() {
                            break StopReason::Exhausted;
                        }
                    }
                    PageAttempt::Unreadable(err) => {
                        // Counts as an empty page; the same cursor is tried again.
                        cursor.pages_fetched += 1;
                        tally.parse_failures += 1;
                        warn!(crawl = %target, page = cursor.pages_fetched, error = %err, "Unreadable page");
                        tally.last_error = Some(err.to_string());

                        if let Some(reason) = cap_reached(policy, &cursor, records.len()) {
                            break reason;
                        }
                    }
                    PageAttempt::Failed(err) => {
                        tally.failures += 1;
                        streak += 1;
                        warn!(
                            crawl = %target,
                            streak,
                            permanent = err.is_permanent(),
                            error = %err,
                            "Page fetch failed"
                        );
                        tally.last_error = Some(err.to_string());

                        if err.is_permanent() || streak >= policy.max_consecutive_failures {
                            break StopReason::SourceUnreliable;
                        }
                    }
                }
            }
        };

        transition(&target, &mut state, CrawlState::Stopped(stop_reason));
        records.truncate(policy.max_records);

        info!(
            crawl = %target,
            mode = %mode,
            stop = %stop_reason,
            pages = cursor.pages_fetched,
            calls = tally.fetch_calls,
            records = records.len(),
            failures = tally.failures,
            parse_failures = tally.parse_failures,
            "Crawl stopped"
        );

        CrawlOutcome {
            target,
            mode,
            records,
            stop_reason,
            pages_fetched: cursor.pages_fetched,
            fetch_calls: tally.fetch_calls,
            records_fetched: cursor.records_fetched,
            filtered: tally.filtered,
            duplicates: tally.duplicates,
            failures: tally.failures,
            parse_failures: tally.parse_failures,
            skipped: tally.skipped,
            oldest_seen: cursor.oldest_seen,
            last_error: tally.last_error,
        }
    }

    /// One page, with bounded retries for transient errors. Each attempt is
    /// capped by `policy.page_timeout`; a timeout is a transient error.
    async fn fetch_with_retry(
        &self,
        target: &CrawlTarget,
        cursor: Option<&str>,
        policy: &CrawlPolicy,
        tally: &mut Tally,
    ) -> PageAttempt {
        let mut attempt: u32 = 0;
        loop {
            tally.fetch_calls += 1;
            let result =
                tokio::time::timeout(policy.page_timeout, self.source.fetch_page(target, cursor))
                    .await;
            let err = match result {
                Ok(Ok(page)) => return PageAttempt::Fetched(page),
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(format!(
                    "no response within {}ms",
                    policy.page_timeout.as_millis()
                )),
            };

            if err.is_parse() {
                return PageAttempt::Unreadable(err);
            }
            if !err.is_transient() || attempt >= policy.max_retries {
                return PageAttempt::Failed(err);
            }

            let backoff = policy.backoff(attempt);
            warn!(
                crawl = %target,
                attempt = attempt + 1,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Transient fetch error, retrying after backoff"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

fn cap_reached(policy: &CrawlPolicy, cursor: &CrawlCursor, kept: usize) -> Option<StopReason> {
    if kept >= policy.max_records {
        Some(StopReason::RecordCap)
    } else if cursor.pages_fetched >= policy.max_pages {
        Some(StopReason::PageCap)
    } else {
        None
    }
}

fn transition(target: &CrawlTarget, state: &mut CrawlState, next: CrawlState) {
    let from = *state;
    debug!(crawl = %target, from = ?from, to = ?next, "Crawl state transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record_at, MockSource};
    use std::time::Duration;

    fn fast_policy() -> CrawlPolicy {
        CrawlPolicy::builder()
            .retry_base(Duration::ZERO)
            .retry_jitter(Duration::ZERO)
            .build()
    }

    #[tokio::test]
    async fn zero_caps_stop_before_fetching() {
        let source = Arc::new(MockSource::endless(2));
        let engine = CrawlEngine::new(source.clone());

        let policy = CrawlPolicy::builder().max_pages(0).build();
        let outcome = engine.discover("news", &policy).await;
        assert_eq!(outcome.stop_reason, StopReason::PageCap);

        let policy = CrawlPolicy::builder().max_records(0).build();
        let outcome = engine.discover("news", &policy).await;
        assert_eq!(outcome.stop_reason, StopReason::RecordCap);

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn duplicates_across_pages_are_dropped() {
        let now = Utc::now();
        let source = Arc::new(
            MockSource::new()
                .page(vec![record_at("a", "x", now), record_at("b", "x", now)], Some("p2"))
                .page(vec![record_at("b", "x", now), record_at("c", "x", now)], None),
        );
        let outcome = CrawlEngine::new(source)
            .discover("news", &fast_policy())
            .await;
        let ids: Vec<_> = outcome.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.records_fetched, 4);
    }

    #[tokio::test]
    async fn oldest_seen_tracks_minimum() {
        let now = Utc::now();
        let older = now - chrono::Duration::hours(5);
        let source = Arc::new(
            MockSource::new()
                .page(vec![record_at("a", "x", now)], Some("p2"))
                .page(vec![record_at("b", "x", older)], None),
        );
        let outcome = CrawlEngine::new(source)
            .discover("news", &fast_policy())
            .await;
        assert_eq!(outcome.oldest_seen, Some(older));
    }
}
