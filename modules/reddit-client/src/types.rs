use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Reddit "thing" kind prefix for comments.
pub const KIND_COMMENT: &str = "t1";
/// Reddit "thing" kind prefix for links (submissions).
pub const KIND_LINK: &str = "t3";

/// Top-level envelope of every listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub kind: String,
    pub data: ListingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData {
    /// Fullname of the last item; pass back as `after` for the next page.
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

/// One listing child. `data` stays untyped so a single malformed item
/// does not make the whole page unreadable.
#[derive(Debug, Clone, Deserialize)]
pub struct Thing {
    pub kind: String,
    pub data: serde_json::Value,
}

impl Thing {
    pub fn parse(&self) -> crate::Result<ThingData> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// The subset of link/comment fields we read.
#[derive(Debug, Clone, Deserialize)]
pub struct ThingData {
    pub id: Option<String>,
    /// Fullname, e.g. `t3_abc123`.
    pub name: Option<String>,
    pub author: Option<String>,
    pub subreddit: Option<String>,
    pub title: Option<String>,
    pub selftext: Option<String>,
    pub body: Option<String>,
    pub created_utc: Option<f64>,
    pub permalink: Option<String>,
    #[serde(default)]
    pub promoted: Option<bool>,
}

impl ThingData {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let ts = self.created_utc?;
        if !ts.is_finite() {
            return None;
        }
        // Some mirrors report milliseconds.
        let secs = if ts > 10_000_000_000.0 { ts / 1000.0 } else { ts };
        Utc.timestamp_opt(secs.trunc() as i64, 0).single()
    }

    pub fn is_promoted(&self) -> bool {
        self.promoted.unwrap_or(false)
    }
}
