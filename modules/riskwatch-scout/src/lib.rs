pub mod backends;
pub mod crawl;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod sink;
pub mod source;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use backends::{select_backend, RedditSource, StubSource};
pub use crawl::{CrawlEngine, CrawlOutcome, CrawlPolicy, HistoryCrawl, StopReason};
pub use error::FetchError;
pub use pipeline::{Pipeline, RunReport};
pub use sink::{FileSink, MemorySink, Sink};
pub use source::{CrawlTarget, Page, SourceClient};
