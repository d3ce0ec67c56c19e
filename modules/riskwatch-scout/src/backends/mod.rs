mod reddit;
mod stub;

pub use reddit::RedditSource;
pub use stub::StubSource;

use std::sync::Arc;

use tracing::info;

use riskwatch_common::{Backend, Config};

use crate::error::FetchError;
use crate::source::SourceClient;

/// Build the configured Source Client once. Callers hand the returned value
/// to the crawl engine; nothing else consults the backend setting.
pub fn select_backend(config: &Config) -> Result<Arc<dyn SourceClient>, FetchError> {
    let source: Arc<dyn SourceClient> = match config.backend {
        Backend::Reddit => Arc::new(RedditSource::new(&config.user_agent, config.page_timeout)?),
        Backend::Stub => Arc::new(StubSource),
    };
    info!(backend = source.name(), "Source backend selected");
    Ok(source)
}
