use async_trait::async_trait;
use tracing::debug;

use crate::error::FetchError;
use crate::source::{CrawlTarget, Page, SourceClient};

/// Alternative backend that never has data. Every crawl against it stops as
/// exhausted after a single call.
pub struct StubSource;

#[async_trait]
impl SourceClient for StubSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch_page(
        &self,
        target: &CrawlTarget,
        _cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        debug!(crawl = %target, "Stub backend returning empty page");
        Ok(Page::default())
    }
}
