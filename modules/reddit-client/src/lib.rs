pub mod error;
pub mod types;

pub use error::{RedditError, Result};
pub use types::{Listing, ListingData, Thing, ThingData, KIND_COMMENT, KIND_LINK};

use std::time::Duration;

const BASE_URL: &str = "https://www.reddit.com";

/// Largest page size the listing endpoints accept.
pub const MAX_PAGE_SIZE: u32 = 100;

pub struct RedditClient {
    client: reqwest::Client,
    base_url: String,
}

impl RedditClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Point the client at a different host (mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Newest submissions of a subreddit, newest first.
    pub async fn subreddit_new(
        &self,
        subreddit: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Listing> {
        let url = format!("{}/r/{}/new.json", self.base_url, subreddit);
        self.get_listing(&url, after, limit).await
    }

    /// Submissions and comments of a user, newest first.
    pub async fn user_overview(
        &self,
        username: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Listing> {
        let url = format!("{}/user/{}/overview.json", self.base_url, username);
        self.get_listing(&url, after, limit).await
    }

    async fn get_listing(&self, url: &str, after: Option<&str>, limit: u32) -> Result<Listing> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();
        let mut query: Vec<(&str, &str)> = vec![("limit", limit.as_str()), ("raw_json", "1")];
        if let Some(after) = after {
            query.push(("after", after));
        }

        tracing::debug!(url, after, "Fetching listing");
        let resp = self.client.get(url).query(&query).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RedditError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let listing: Listing = serde_json::from_str(&body)?;
        tracing::debug!(
            url,
            count = listing.data.children.len(),
            has_next = listing.data.after.is_some(),
            "Fetched listing"
        );
        Ok(listing)
    }
}
