// Test mocks for the crawl engine and pipeline.
//
// MockSource (SourceClient) plays back a script of pages, errors and hangs
// per target, then falls back to a fixed behaviour once a script runs dry.
// Every call is counted and its cursor recorded.
//
// Plus record builders for fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use riskwatch_common::{Record, RecordKind};

use crate::error::FetchError;
use crate::source::{CrawlTarget, Page, SourceClient};

// ---------------------------------------------------------------------------
// Record builders
// ---------------------------------------------------------------------------

pub fn record(id: &str, author: &str, text: &str) -> Record {
    Record {
        id: id.to_string(),
        author: author.to_string(),
        channel: "test".to_string(),
        kind: RecordKind::Submission,
        text: text.to_string(),
        created_at: Utc::now(),
        permalink: format!("https://www.reddit.com/comments/{id}"),
    }
}

pub fn record_at(id: &str, author: &str, created_at: DateTime<Utc>) -> Record {
    Record {
        created_at,
        ..record(id, author, "nothing to see here")
    }
}

pub fn channel_record(channel: &str, id: &str, author: &str, text: &str) -> Record {
    Record {
        channel: channel.to_string(),
        ..record(id, author, text)
    }
}

// ---------------------------------------------------------------------------
// MockSource
// ---------------------------------------------------------------------------

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Scripted {
    Page(Page),
    Error(FetchError),
    /// Never answers; only a page timeout gets the crawl past it.
    Hang,
}

/// What a target answers once its script is used up.
#[derive(Debug, Clone)]
enum Fallback {
    /// Empty page, no continuation.
    Exhausted,
    /// A fresh page of `n` records and a continuation cursor, forever.
    Endless(usize),
    Repeat(Scripted),
}

/// Scripted SourceClient. Builder pattern: `.page()`, `.error()`, `.hang()`
/// script the default target; `.on_channel()` / `.on_author()` script a
/// specific one.
pub struct MockSource {
    default_script: Mutex<VecDeque<Scripted>>,
    scripts: Mutex<HashMap<CrawlTarget, VecDeque<Scripted>>>,
    fallback: Fallback,
    calls: AtomicUsize,
    generated: AtomicUsize,
    log: Mutex<Vec<(CrawlTarget, Option<String>)>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            default_script: Mutex::new(VecDeque::new()),
            scripts: Mutex::new(HashMap::new()),
            fallback: Fallback::Exhausted,
            calls: AtomicUsize::new(0),
            generated: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `page_size` new records and a continuation cursor.
    pub fn endless(page_size: usize) -> Self {
        Self {
            fallback: Fallback::Endless(page_size),
            ..Self::new()
        }
    }

    /// Answers every call with the same error.
    pub fn failing(err: FetchError) -> Self {
        Self {
            fallback: Fallback::Repeat(Scripted::Error(err)),
            ..Self::new()
        }
    }

    /// Never answers.
    pub fn hanging() -> Self {
        Self {
            fallback: Fallback::Repeat(Scripted::Hang),
            ..Self::new()
        }
    }

    pub fn page(self, records: Vec<Record>, next_cursor: Option<&str>) -> Self {
        self.push_default(Scripted::Page(Page::new(
            records,
            next_cursor.map(|c| c.to_string()),
        )))
    }

    pub fn error(self, err: FetchError) -> Self {
        self.push_default(Scripted::Error(err))
    }

    pub fn hang(self) -> Self {
        self.push_default(Scripted::Hang)
    }

    pub fn on_channel(self, name: &str, script: Vec<Scripted>) -> Self {
        self.on_target(CrawlTarget::Channel(name.to_string()), script)
    }

    pub fn on_author(self, name: &str, script: Vec<Scripted>) -> Self {
        self.on_target(CrawlTarget::Author(name.to_string()), script)
    }

    fn on_target(self, target: CrawlTarget, script: Vec<Scripted>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(target, script.into_iter().collect());
        self
    }

    fn push_default(self, item: Scripted) -> Self {
        self.default_script.lock().unwrap().push_back(item);
        self
    }

    /// Total calls across all targets.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, target: &CrawlTarget) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == target)
            .count()
    }

    /// Cursors passed in, in call order.
    pub fn cursors(&self) -> Vec<Option<String>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn next_scripted(&self, target: &CrawlTarget) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        let next = match scripts.get_mut(target) {
            Some(script) => script.pop_front(),
            None => self.default_script.lock().unwrap().pop_front(),
        };
        next.unwrap_or_else(|| self.fallback_response(target))
    }

    fn fallback_response(&self, target: &CrawlTarget) -> Scripted {
        match &self.fallback {
            Fallback::Exhausted => Scripted::Page(Page::default()),
            Fallback::Endless(n) => {
                let records = (0..*n)
                    .map(|_| {
                        let i = self.generated.fetch_add(1, Ordering::SeqCst);
                        record_at(
                            &format!("{}-{i}", target.name()),
                            "endless_author",
                            Utc::now() - chrono::Duration::minutes(1),
                        )
                    })
                    .collect();
                let cursor = format!("after-{}", self.generated.load(Ordering::SeqCst));
                Scripted::Page(Page::new(records, Some(cursor)))
            }
            Fallback::Repeat(item) => item.clone(),
        }
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceClient for MockSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_page(
        &self,
        target: &CrawlTarget,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((target.clone(), cursor.map(|c| c.to_string())));

        match self.next_scripted(target) {
            Scripted::Page(page) => Ok(page),
            Scripted::Error(err) => Err(err),
            Scripted::Hang => futures::future::pending().await,
        }
    }
}
