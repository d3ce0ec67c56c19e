// End-to-end run: discover -> score -> enrich authors -> aggregate -> sink.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use riskwatch_common::{
    AuthorHistory, AuthorHistoryBuilder, AuthorLabel, AuthorVerdict, Config, HistorySnapshot,
    Record, RiskLabel, RiskWatchError, ScoredRecord,
};
use riskwatch_scoring::{AuthorAggregator, FeatureExtractor, RecordScorer, WhatlangDetector};

use crate::crawl::{pacer_for, CrawlEngine, CrawlPolicy, CrawlSummary, HistoryCrawl, Pacer};
use crate::pool::run_bounded;
use crate::sink::Sink;
use crate::source::SourceClient;

/// Note attached to a verdict when the author's history could not be read.
pub const HISTORY_UNAVAILABLE_NOTE: &str = "history unavailable (author page unreachable)";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordLabelCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthorLabelCounts {
    pub low: usize,
    pub medium: usize,
}

/// Stats from a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub backend: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub channels: usize,
    pub records_discovered: usize,
    pub duplicates_dropped: usize,
    pub record_labels: RecordLabelCounts,
    pub authors: usize,
    /// Authors whose stored history was reused instead of crawled.
    pub authors_reused: usize,
    pub history_items: usize,
    pub histories_unavailable: usize,
    pub author_labels: AuthorLabelCounts,
    pub crawls: Vec<CrawlSummary>,
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== RiskWatch Run Complete ===")?;
        writeln!(f, "Run:                 {}", self.run_id)?;
        writeln!(f, "Backend:             {}", self.backend)?;
        writeln!(
            f,
            "Duration:            {:.1}s",
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        )?;
        writeln!(f, "Channels crawled:    {}", self.channels)?;
        writeln!(f, "Records discovered:  {}", self.records_discovered)?;
        writeln!(f, "Duplicates dropped:  {}", self.duplicates_dropped)?;
        writeln!(f, "\nRecord labels:")?;
        writeln!(f, "  low:    {}", self.record_labels.low)?;
        writeln!(f, "  medium: {}", self.record_labels.medium)?;
        writeln!(f, "  high:   {}", self.record_labels.high)?;
        writeln!(f, "\nAuthors enriched:    {}", self.authors)?;
        writeln!(f, "Histories reused:    {}", self.authors_reused)?;
        writeln!(f, "History items:       {}", self.history_items)?;
        writeln!(f, "History unavailable: {}", self.histories_unavailable)?;
        writeln!(f, "\nAuthor labels:")?;
        writeln!(f, "  low:    {}", self.author_labels.low)?;
        writeln!(f, "  medium: {}", self.author_labels.medium)?;

        let mut stops: BTreeMap<String, usize> = BTreeMap::new();
        for crawl in &self.crawls {
            *stops
                .entry(format!("{} / {}", crawl.mode, crawl.stop_reason))
                .or_default() += 1;
        }
        writeln!(f, "\nCrawl stop reasons:")?;
        for (reason, count) in stops {
            writeln!(f, "  {reason}: {count}")?;
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: Config,
    engine: CrawlEngine,
    scorer: Arc<RecordScorer>,
    sink: Arc<dyn Sink>,
    run_id: Uuid,
    retry_base: Duration,
    retry_jitter: Duration,
}

impl Pipeline {
    pub fn new(config: Config, source: Arc<dyn SourceClient>, sink: Arc<dyn Sink>) -> Self {
        let engine = CrawlEngine::new(source).with_pacer(pacer_for(config.request_delay));
        let scorer = RecordScorer::new(
            FeatureExtractor::default(),
            config.thresholds,
            Arc::new(WhatlangDetector::new()),
        );
        Self {
            config,
            engine,
            scorer: Arc::new(scorer),
            sink,
            run_id: Uuid::new_v4(),
            retry_base: Duration::from_secs(1),
            retry_jitter: Duration::from_millis(1000),
        }
    }

    pub fn with_scorer(mut self, scorer: RecordScorer) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.engine = self.engine.with_pacer(pacer);
        self
    }

    pub fn with_retry_backoff(mut self, base: Duration, jitter: Duration) -> Self {
        self.retry_base = base;
        self.retry_jitter = jitter;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn run(&self) -> Result<RunReport, RiskWatchError> {
        let started_at = Utc::now();
        info!(run_id = %self.run_id, backend = self.engine.source_name(), "Pipeline starting");

        // 1. Discovery
        let discovery_policy = CrawlPolicy::discovery(&self.config)
            .with_backoff(self.retry_base, self.retry_jitter);
        let mut discovered = run_bounded(
            self.config.channels.iter().enumerate(),
            self.config.concurrency,
            |(index, channel)| {
                let policy = &discovery_policy;
                async move { (index, self.engine.discover(channel, policy).await) }
            },
        )
        .await;
        discovered.sort_by_key(|(index, _)| *index);

        let mut crawls: Vec<CrawlSummary> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut duplicates_dropped = 0usize;
        for (_, outcome) in discovered {
            crawls.push(outcome.summary());
            for record in outcome.records {
                if seen.insert((record.channel.clone(), record.id.clone())) {
                    records.push(record);
                } else {
                    duplicates_dropped += 1;
                }
            }
        }
        records.truncate(self.config.max_total_records);
        info!(records = records.len(), duplicates_dropped, "Discovery complete");
        self.sink.write_raw(&records)?;

        // 2. Score
        let scored: Vec<ScoredRecord> = records
            .into_iter()
            .map(|r| self.scorer.score_record(r))
            .collect();
        self.sink.write_scored(&scored)?;

        // 3. Authors, each with the best discovered score as fallback
        let mut fallbacks: BTreeMap<String, f64> = BTreeMap::new();
        for s in scored.iter().filter(|s| s.record.has_known_author()) {
            let best = fallbacks.entry(s.record.author.clone()).or_insert(0.0);
            *best = best.max(s.score);
        }

        // Stored histories are always carried forward; reusing them is opt-in.
        let mut stored: BTreeMap<String, HistorySnapshot> = self
            .sink
            .load_histories()?
            .into_iter()
            .map(|h| (h.author.clone(), h))
            .collect();
        let (reused, to_crawl): (Vec<&String>, Vec<&String>) = fallbacks
            .keys()
            .partition(|author| self.config.skip_known_authors && stored.contains_key(*author));
        info!(
            authors = fallbacks.len(),
            reused = reused.len(),
            stored = stored.len(),
            "Enriching authors"
        );

        // 4. History crawls
        let history_policy = CrawlPolicy::history(&self.config)
            .with_backoff(self.retry_base, self.retry_jitter);
        let histories: Vec<HistoryCrawl> = run_bounded(
            to_crawl,
            self.config.concurrency,
            |author| {
                let policy = &history_policy;
                async move { self.engine.history(author, policy).await }
            },
        )
        .await;

        // 5. Score, seal and aggregate
        let aggregator = AuthorAggregator::new(
            self.config.thresholds,
            self.config.lookback_days,
            self.run_id,
        )
        .with_min_confident_posts(self.config.min_confident_posts);

        let mut verdicts: Vec<AuthorVerdict> = Vec::with_capacity(fallbacks.len());
        let mut history_items = 0usize;
        let mut histories_unavailable = 0usize;

        for author in &reused {
            let Some(snapshot) = stored.get(*author) else {
                continue;
            };
            let history = self.seal_history(
                author.as_str(),
                snapshot.window_start,
                snapshot.window_end,
                snapshot.records.iter().cloned(),
            );
            history_items += history.len();
            let fallback = fallbacks.get(*author).copied().unwrap_or(0.0);
            verdicts.push(aggregator.aggregate_history(&history, fallback));
        }

        for crawl in histories {
            crawls.push(crawl.outcome.summary());
            let author = crawl.author().to_string();
            let degraded = crawl.outcome.is_degraded();

            // An unreachable author is retried next run rather than stored empty.
            if !degraded {
                stored.insert(
                    author.clone(),
                    HistorySnapshot {
                        author: author.clone(),
                        window_start: crawl.window_start,
                        window_end: crawl.window_end,
                        records: crawl.outcome.records.clone(),
                        crawled_at: Utc::now(),
                    },
                );
            }

            let history = self.seal_history(
                author.as_str(),
                crawl.window_start,
                crawl.window_end,
                crawl.outcome.records,
            );
            history_items += history.len();

            let fallback = fallbacks.get(&author).copied().unwrap_or(0.0);
            let mut verdict = aggregator.aggregate_history(&history, fallback);
            if degraded {
                histories_unavailable += 1;
                warn!(
                    author = author.as_str(),
                    error = crawl.outcome.last_error.as_deref().unwrap_or(""),
                    "Author history unavailable"
                );
                verdict = verdict.with_note(HISTORY_UNAVAILABLE_NOTE);
            }
            verdicts.push(verdict);
        }
        verdicts.sort_by(|a, b| a.author.cmp(&b.author));

        // 6. Sink
        let snapshots: Vec<HistorySnapshot> = stored.into_values().collect();
        self.sink.write_histories(&snapshots)?;
        self.sink.write_verdicts(&verdicts)?;

        let mut record_labels = RecordLabelCounts::default();
        for s in &scored {
            match s.label {
                RiskLabel::Low => record_labels.low += 1,
                RiskLabel::Medium => record_labels.medium += 1,
                RiskLabel::High => record_labels.high += 1,
            }
        }
        let mut author_labels = AuthorLabelCounts::default();
        for v in &verdicts {
            match v.label {
                AuthorLabel::Low => author_labels.low += 1,
                AuthorLabel::Medium => author_labels.medium += 1,
            }
        }

        let report = RunReport {
            run_id: self.run_id,
            backend: self.engine.source_name().to_string(),
            started_at,
            finished_at: Utc::now(),
            channels: self.config.channels.len(),
            records_discovered: scored.len(),
            duplicates_dropped,
            record_labels,
            authors: verdicts.len(),
            authors_reused: reused.len(),
            history_items,
            histories_unavailable,
            author_labels,
            crawls,
        };
        info!(
            run_id = %self.run_id,
            records = report.records_discovered,
            authors = report.authors,
            "Pipeline complete"
        );
        Ok(report)
    }

    fn seal_history(
        &self,
        author: &str,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        records: impl IntoIterator<Item = Record>,
    ) -> AuthorHistory {
        let mut builder = AuthorHistoryBuilder::new(author, window_start, window_end);
        for record in records {
            builder.push(self.scorer.score_record(record));
        }
        builder.seal()
    }
}
