// Source Client capability.
//
// The crawl engine only ever sees `Arc<dyn SourceClient>`; which backend sits
// behind it is decided once at startup (see `backends::select_backend`).

use async_trait::async_trait;
use serde::Serialize;

use riskwatch_common::Record;

use crate::error::FetchError;

/// What a crawl walks through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CrawlTarget {
    /// Newest records of a channel.
    Channel(String),
    /// Activity of one author.
    Author(String),
}

impl CrawlTarget {
    pub fn name(&self) -> &str {
        match self {
            CrawlTarget::Channel(name) | CrawlTarget::Author(name) => name,
        }
    }
}

impl std::fmt::Display for CrawlTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlTarget::Channel(name) => write!(f, "channel:{name}"),
            CrawlTarget::Author(name) => write!(f, "author:{name}"),
        }
    }
}

/// One page of records plus the token for the next one.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Record>,
    /// `None` means the source has nothing further.
    pub next_cursor: Option<String>,
    /// Items on the page that could not be read as records.
    pub skipped: usize,
}

impl Page {
    pub fn new(records: Vec<Record>, next_cursor: Option<String>) -> Self {
        Self {
            records,
            next_cursor,
            skipped: 0,
        }
    }
}

/// Paginated access to records.
///
/// Implementations return pages newest-first. The crawl engine relies on that
/// ordering to stop at the lookback boundary, and still filters defensively
/// in case a page arrives out of order.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn fetch_page(
        &self,
        target: &CrawlTarget,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError>;
}
