use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use reddit_client::{RedditClient, Thing, KIND_COMMENT, KIND_LINK, MAX_PAGE_SIZE};
use riskwatch_common::{Record, RecordKind, DELETED_AUTHOR};

use crate::error::FetchError;
use crate::source::{CrawlTarget, Page, SourceClient};

const PERMALINK_HOST: &str = "https://www.reddit.com";

/// Reads Reddit's public JSON listings: `/r/{channel}/new` for discovery and
/// `/user/{author}/overview` for history.
pub struct RedditSource {
    client: RedditClient,
    page_size: u32,
}

impl RedditSource {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = RedditClient::new(user_agent, timeout)?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: RedditClient) -> Self {
        Self {
            client,
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }
}

#[async_trait]
impl SourceClient for RedditSource {
    fn name(&self) -> &str {
        "reddit"
    }

    async fn fetch_page(
        &self,
        target: &CrawlTarget,
        cursor: Option<&str>,
    ) -> Result<Page, FetchError> {
        let listing = match target {
            CrawlTarget::Channel(name) => {
                self.client.subreddit_new(name, cursor, self.page_size).await?
            }
            CrawlTarget::Author(name) => {
                self.client.user_overview(name, cursor, self.page_size).await?
            }
        };

        let mut page = Page::new(Vec::new(), listing.data.after.clone());
        for thing in &listing.data.children {
            match thing_to_record(thing, target) {
                Converted::Record(record) => page.records.push(record),
                Converted::Promoted => debug!(crawl = %target, "Dropping promoted item"),
                Converted::Unreadable(reason) => {
                    warn!(crawl = %target, kind = thing.kind.as_str(), reason, "Skipping unreadable item");
                    page.skipped += 1;
                }
            }
        }
        Ok(page)
    }
}

enum Converted {
    Record(Record),
    Promoted,
    Unreadable(&'static str),
}

fn thing_to_record(thing: &Thing, target: &CrawlTarget) -> Converted {
    let kind = match thing.kind.as_str() {
        KIND_LINK => RecordKind::Submission,
        KIND_COMMENT => RecordKind::Comment,
        _ => return Converted::Unreadable("unsupported kind"),
    };
    let Ok(data) = thing.parse() else {
        return Converted::Unreadable("malformed item");
    };
    if data.is_promoted() {
        return Converted::Promoted;
    }
    let Some(id) = data.id.clone().filter(|id| !id.is_empty()) else {
        return Converted::Unreadable("missing id");
    };
    let Some(created_at) = data.created_at() else {
        return Converted::Unreadable("missing timestamp");
    };

    let text = match kind {
        RecordKind::Submission => {
            let title = data.title.as_deref().unwrap_or_default().trim();
            let selftext = data.selftext.as_deref().unwrap_or_default().trim();
            if selftext.is_empty() {
                title.to_string()
            } else {
                format!("{title}\n\n{selftext}")
            }
        }
        RecordKind::Comment => data.body.clone().unwrap_or_default(),
    };

    let channel = match (&data.subreddit, target) {
        (Some(sub), _) if !sub.is_empty() => sub.clone(),
        (_, CrawlTarget::Channel(name)) => name.clone(),
        _ => String::new(),
    };

    let permalink = match data.permalink.as_deref() {
        Some(path) if path.starts_with("http") => path.to_string(),
        Some(path) if !path.is_empty() => format!("{PERMALINK_HOST}{path}"),
        _ => format!("{PERMALINK_HOST}/comments/{id}"),
    };

    Converted::Record(Record {
        id,
        author: data
            .author
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        channel,
        kind,
        text,
        created_at,
        permalink,
    })
}
