use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use riskwatch_common::{AuthorHistoryBuilder, Record};
use riskwatch_scoring::RecordScorer;
use riskwatch_scout::crawl::{CrawlEngine, CrawlPolicy, Pacer, StopReason};
use riskwatch_scout::testing::{record, record_at, MockSource, Scripted};
use riskwatch_scout::{CrawlTarget, FetchError, Page};

fn policy() -> CrawlPolicy {
    CrawlPolicy::builder()
        .max_records(1_000)
        .retry_base(Duration::ZERO)
        .retry_jitter(Duration::ZERO)
        .build()
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}

// --- stop reasons ---

#[tokio::test]
async fn page_cap_stops_endless_source_after_exactly_that_many_fetches() {
    let source = Arc::new(MockSource::endless(2));
    let engine = CrawlEngine::new(source.clone());
    let policy = CrawlPolicy::builder()
        .max_pages(3)
        .max_records(1_000)
        .build();

    let outcome = engine.discover("news", &policy).await;

    assert_eq!(outcome.stop_reason, StopReason::PageCap);
    assert_eq!(outcome.pages_fetched, 3);
    assert_eq!(outcome.fetch_calls, 3);
    assert_eq!(source.calls(), 3);
    assert_eq!(outcome.records.len(), 6);
}

#[tokio::test]
async fn record_cap_truncates_to_exactly_the_cap() {
    let source = Arc::new(MockSource::endless(4));
    let engine = CrawlEngine::new(source.clone());
    let policy = CrawlPolicy::builder().max_records(6).max_pages(10).build();

    let outcome = engine.discover("news", &policy).await;

    assert_eq!(outcome.stop_reason, StopReason::RecordCap);
    assert_eq!(outcome.records.len(), 6);
    assert_eq!(outcome.pages_fetched, 2);
    assert_eq!(outcome.records_fetched, 8);
}

#[tokio::test]
async fn record_cap_wins_over_page_cap_on_the_same_page() {
    let source = Arc::new(MockSource::endless(5));
    let policy = CrawlPolicy::builder().max_records(5).max_pages(1).build();
    let outcome = CrawlEngine::new(source).discover("news", &policy).await;
    assert_eq!(outcome.stop_reason, StopReason::RecordCap);
}

#[tokio::test]
async fn missing_cursor_means_exhausted() {
    let source = Arc::new(
        MockSource::new()
            .page(vec![record("a", "alice", "x"), record("b", "bob", "y")], Some("p2"))
            .page(vec![record("c", "carol", "z")], None),
    );
    let outcome = CrawlEngine::new(source.clone())
        .discover("news", &policy())
        .await;

    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(ids(&outcome.records), vec!["a", "b", "c"]);
    assert_eq!(source.cursors(), vec![None, Some("p2".to_string())]);
}

#[tokio::test]
async fn empty_page_with_cursor_keeps_going() {
    let source = Arc::new(
        MockSource::new()
            .page(vec![], Some("p2"))
            .page(vec![record("a", "alice", "x")], None),
    );
    let outcome = CrawlEngine::new(source).discover("news", &policy()).await;
    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.pages_fetched, 2);
    assert_eq!(outcome.records.len(), 1);
}

#[tokio::test]
async fn history_stops_at_lookback_and_filters_old_records() {
    let now = Utc::now();
    let source = Arc::new(
        MockSource::new()
            .page(
                vec![
                    record_at("h1", "alice", now - chrono::Duration::days(1)),
                    record_at("h2", "alice", now - chrono::Duration::days(2)),
                ],
                Some("p2"),
            )
            .page(
                vec![
                    record_at("h3", "alice", now - chrono::Duration::days(3)),
                    record_at("h4", "alice", now - chrono::Duration::days(10)),
                ],
                Some("p3"),
            ),
    );
    let policy = CrawlPolicy::builder()
        .lookback(chrono::Duration::days(7))
        .max_records(1_000)
        .build();

    let crawl = CrawlEngine::new(source.clone())
        .history("alice", &policy)
        .await;

    assert_eq!(crawl.outcome.stop_reason, StopReason::LookbackReached);
    assert_eq!(ids(&crawl.outcome.records), vec!["h1", "h2", "h3"]);
    assert_eq!(crawl.outcome.filtered, 1);
    assert_eq!(source.calls(), 2);
    assert_eq!(crawl.author(), "alice");
}

#[tokio::test]
async fn history_filters_out_of_order_records_without_stopping() {
    let now = Utc::now();
    let window_start = now - chrono::Duration::days(10);
    let window_end = now - chrono::Duration::days(1);
    let source = Arc::new(
        MockSource::new()
            .page(
                vec![
                    record_at("too_new", "alice", now),
                    record_at("inside", "alice", now - chrono::Duration::days(5)),
                ],
                Some("p2"),
            )
            .page(
                vec![record_at("inside_too", "alice", now - chrono::Duration::days(6))],
                None,
            ),
    );

    let crawl = CrawlEngine::new(source)
        .history_window("alice", window_start, window_end, &policy())
        .await;

    assert_eq!(crawl.outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(ids(&crawl.outcome.records), vec!["inside", "inside_too"]);
    assert_eq!(crawl.outcome.filtered, 1);
    for r in &crawl.outcome.records {
        assert!(r.created_at >= crawl.window_start && r.created_at <= crawl.window_end);
    }
}

#[tokio::test]
async fn discovery_ignores_lookback() {
    let old = Utc::now() - chrono::Duration::days(400);
    let source = Arc::new(
        MockSource::new()
            .page(vec![record_at("old", "alice", old)], Some("p2"))
            .page(vec![record_at("older", "alice", old)], None),
    );
    let outcome = CrawlEngine::new(source).discover("news", &policy()).await;
    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.filtered, 0);
}

#[tokio::test]
async fn oversized_lookback_reaches_back_to_the_earliest_date() {
    let old = Utc::now() - chrono::Duration::days(365 * 200);
    let source = Arc::new(MockSource::new().page(vec![record_at("old", "alice", old)], None));
    let policy = CrawlPolicy::builder()
        .lookback(chrono::Duration::MAX)
        .max_records(1_000)
        .build();

    let crawl = CrawlEngine::new(source).history("alice", &policy).await;

    assert_eq!(crawl.window_start, chrono::DateTime::<Utc>::MIN_UTC);
    assert_eq!(crawl.outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(ids(&crawl.outcome.records), vec!["old"]);
}

// --- failures ---

#[tokio::test]
async fn transient_errors_are_retried_until_success() {
    let source = Arc::new(
        MockSource::new()
            .error(FetchError::Timeout("slow".into()))
            .error(FetchError::RateLimited("429".into()))
            .page(vec![record("a", "alice", "x")], None),
    );
    let outcome = CrawlEngine::new(source.clone())
        .discover("news", &policy())
        .await;

    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.fetch_calls, 3);
    assert_eq!(outcome.failures, 0);
    assert_eq!(outcome.pages_fetched, 1);
    // Retries reuse the same cursor.
    assert_eq!(source.cursors(), vec![None, None, None]);
}

#[tokio::test]
async fn exhausted_retries_count_toward_failure_streak() {
    let source = Arc::new(MockSource::failing(FetchError::Transport("reset".into())));
    let policy = CrawlPolicy::builder()
        .max_retries(2)
        .max_consecutive_failures(3)
        .retry_base(Duration::ZERO)
        .retry_jitter(Duration::ZERO)
        .build();

    let outcome = CrawlEngine::new(source.clone())
        .discover("news", &policy)
        .await;

    assert_eq!(outcome.stop_reason, StopReason::SourceUnreliable);
    assert!(outcome.is_degraded());
    assert_eq!(outcome.failures, 3);
    assert_eq!(outcome.fetch_calls, 9);
    assert_eq!(source.calls(), 9);
    assert!(outcome.records.is_empty());
    assert!(outcome.last_error.unwrap().contains("reset"));
}

#[tokio::test]
async fn permanent_error_stops_without_retry() {
    let source = Arc::new(MockSource::failing(FetchError::NotFound("no such user".into())));
    let crawl = CrawlEngine::new(source.clone())
        .history("ghost", &policy())
        .await;

    assert_eq!(crawl.outcome.stop_reason, StopReason::SourceUnreliable);
    assert_eq!(crawl.outcome.fetch_calls, 1);
    assert_eq!(crawl.outcome.failures, 1);
    assert!(crawl.outcome.records.is_empty());
}

#[tokio::test]
async fn forbidden_is_permanent_too() {
    let source = Arc::new(MockSource::failing(FetchError::Forbidden("private".into())));
    let outcome = CrawlEngine::new(source.clone())
        .discover("private_channel", &policy())
        .await;
    assert_eq!(outcome.stop_reason, StopReason::SourceUnreliable);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn successful_page_resets_failure_streak() {
    let source = Arc::new(
        MockSource::new()
            .error(FetchError::Server {
                status: 502,
                message: String::new(),
            })
            .page(vec![record("a", "alice", "x")], Some("p2"))
            .error(FetchError::Transport("reset".into()))
            .page(vec![record("b", "bob", "y")], Some("p3"))
            .error(FetchError::Timeout("slow".into()))
            .page(vec![record("c", "carol", "z")], None),
    );
    let policy = CrawlPolicy::builder()
        .max_retries(0)
        .max_consecutive_failures(2)
        .max_records(1_000)
        .build();

    let outcome = CrawlEngine::new(source).discover("news", &policy).await;

    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.failures, 3);
    assert_eq!(ids(&outcome.records), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn hung_page_times_out_and_counts_as_failure() {
    let source = Arc::new(MockSource::hanging());
    let policy = CrawlPolicy::builder()
        .page_timeout(Duration::from_millis(20))
        .max_retries(1)
        .max_consecutive_failures(2)
        .retry_base(Duration::ZERO)
        .retry_jitter(Duration::ZERO)
        .build();

    let outcome = CrawlEngine::new(source.clone())
        .discover("news", &policy)
        .await;

    assert_eq!(outcome.stop_reason, StopReason::SourceUnreliable);
    assert_eq!(outcome.failures, 2);
    assert_eq!(source.calls(), 4);
    assert!(outcome.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn unreadable_page_is_an_empty_page_not_a_failure() {
    let source = Arc::new(
        MockSource::new()
            .error(FetchError::Parse("garbled".into()))
            .page(vec![record("a", "alice", "x")], None),
    );
    let outcome = CrawlEngine::new(source.clone())
        .discover("news", &policy())
        .await;

    assert_eq!(outcome.stop_reason, StopReason::Exhausted);
    assert_eq!(outcome.parse_failures, 1);
    assert_eq!(outcome.failures, 0);
    assert_eq!(outcome.pages_fetched, 2);
    assert_eq!(ids(&outcome.records), vec!["a"]);
    // The unreadable page is refetched at the same position.
    assert_eq!(source.cursors(), vec![None, None]);
}

#[tokio::test]
async fn always_unreadable_source_hits_page_cap() {
    let source = Arc::new(MockSource::failing(FetchError::Parse("garbled".into())));
    let policy = CrawlPolicy::builder().max_pages(3).build();

    let outcome = CrawlEngine::new(source.clone())
        .discover("news", &policy)
        .await;

    assert_eq!(outcome.stop_reason, StopReason::PageCap);
    assert_eq!(source.calls(), 3);
    assert_eq!(outcome.parse_failures, 3);
}

#[tokio::test]
async fn skipped_items_are_counted() {
    let page = Page {
        records: vec![record("a", "alice", "x")],
        next_cursor: None,
        skipped: 2,
    };
    let source = Arc::new(MockSource::new().on_channel("news", vec![Scripted::Page(page)]));
    let outcome = CrawlEngine::new(source).discover("news", &policy()).await;
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.records.len(), 1);
}

#[tokio::test]
async fn crawls_are_scoped_to_their_target() {
    let source = Arc::new(
        MockSource::new()
            .on_channel("news", vec![Scripted::Page(Page::new(vec![record("n", "x", "")], None))])
            .on_author("alice", vec![Scripted::Error(FetchError::NotFound("gone".into()))]),
    );
    let engine = CrawlEngine::new(source.clone());

    let discovered = engine.discover("news", &policy()).await;
    let history = engine.history("alice", &policy()).await;

    assert_eq!(discovered.stop_reason, StopReason::Exhausted);
    assert_eq!(history.outcome.stop_reason, StopReason::SourceUnreliable);
    assert_eq!(source.calls_for(&CrawlTarget::Channel("news".into())), 1);
    assert_eq!(source.calls_for(&CrawlTarget::Author("alice".into())), 1);
}

// --- politeness hook ---

struct CountingPacer(AtomicUsize);

#[async_trait]
impl Pacer for CountingPacer {
    async fn pause(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn pacer_runs_between_pages_only() {
    let pacer = Arc::new(CountingPacer(AtomicUsize::new(0)));
    let engine = CrawlEngine::new(Arc::new(MockSource::endless(1))).with_pacer(pacer.clone());
    let policy = CrawlPolicy::builder().max_pages(3).build();

    engine.discover("news", &policy).await;

    assert_eq!(pacer.0.load(Ordering::SeqCst), 2);
}

// --- sealing ---

#[tokio::test]
async fn sealed_history_only_holds_in_window_items() {
    let now = Utc::now();
    let source = Arc::new(MockSource::new().page(
        vec![
            record_at("a", "alice", now - chrono::Duration::days(1)),
            record_at("b", "alice", now - chrono::Duration::days(30)),
            record_at("c", "alice", now - chrono::Duration::days(90)),
        ],
        None,
    ));
    let policy = CrawlPolicy::builder()
        .lookback(chrono::Duration::days(60))
        .build();
    let crawl = CrawlEngine::new(source).history("alice", &policy).await;

    let scorer = RecordScorer::default();
    let mut builder = AuthorHistoryBuilder::new("alice", crawl.window_start, crawl.window_end);
    for r in crawl.outcome.records {
        builder.push(scorer.score_record(r));
    }
    let history = builder.seal();

    assert_eq!(history.len(), 2);
    for item in history.items() {
        assert!(item.record.created_at >= history.window_start());
        assert!(item.record.created_at <= history.window_end());
    }
}
