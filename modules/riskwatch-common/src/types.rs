use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RiskWatchError;

/// Author placeholder sources emit for removed or suspended accounts.
pub const DELETED_AUTHOR: &str = "[deleted]";

// --- Records ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Submission,
    Comment,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Submission => write!(f, "submission"),
            RecordKind::Comment => write!(f, "comment"),
        }
    }
}

/// One ingested text item. Identity is `id` within the `channel` namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub author: String,
    pub channel: String,
    pub kind: RecordKind,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub permalink: String,
}

impl Record {
    /// False for empty or deleted authors, which cannot be enriched.
    pub fn has_known_author(&self) -> bool {
        let author = self.author.trim();
        !author.is_empty() && author != DELETED_AUTHOR
    }
}

// --- Labels ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLabel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLabel::Low => write!(f, "low"),
            RiskLabel::Medium => write!(f, "medium"),
            RiskLabel::High => write!(f, "high"),
        }
    }
}

/// Author-level label. There is no `high`: that tier is reserved for
/// periodic re-check alerting, which is not part of this system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorLabel {
    Low,
    Medium,
}

impl std::fmt::Display for AuthorLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthorLabel::Low => write!(f, "low"),
            AuthorLabel::Medium => write!(f, "medium"),
        }
    }
}

pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.4;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.7;

/// Boundaries splitting `[0, 1]` into `[0, medium)`, `[medium, high)` and `[high, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelThresholds {
    medium: f64,
    high: f64,
}

impl LabelThresholds {
    /// Requires `0 < medium < high <= 1` so all three ranges are non-empty.
    pub fn new(medium: f64, high: f64) -> Result<Self, RiskWatchError> {
        if !(medium > 0.0 && medium < high && high <= 1.0) {
            return Err(RiskWatchError::Validation(format!(
                "label thresholds must satisfy 0 < medium < high <= 1 (got medium={medium}, high={high})"
            )));
        }
        Ok(Self { medium, high })
    }

    pub fn medium(&self) -> f64 {
        self.medium
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    pub fn classify(&self, score: f64) -> RiskLabel {
        if score >= self.high {
            RiskLabel::High
        } else if score >= self.medium {
            RiskLabel::Medium
        } else {
            RiskLabel::Low
        }
    }

    pub fn classify_author(&self, score: f64) -> AuthorLabel {
        if score >= self.medium {
            AuthorLabel::Medium
        } else {
            AuthorLabel::Low
        }
    }
}

impl Default for LabelThresholds {
    fn default() -> Self {
        Self {
            medium: DEFAULT_MEDIUM_THRESHOLD,
            high: DEFAULT_HIGH_THRESHOLD,
        }
    }
}

/// Clamp into `[0, 1]`. NaN collapses to 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

// --- Explanations ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub value: f64,
}

/// Ranked per-feature contributions, optionally preceded by a language caveat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub caveat: Option<String>,
    pub contributions: Vec<Contribution>,
}

impl Explanation {
    pub fn is_empty(&self) -> bool {
        self.caveat.is_none() && self.contributions.is_empty()
    }
}

impl std::fmt::Display for Explanation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::with_capacity(self.contributions.len() + 1);
        if let Some(caveat) = &self.caveat {
            parts.push(caveat.clone());
        }
        for c in &self.contributions {
            parts.push(format!("{}={:.3}", c.feature, c.value));
        }
        if self.contributions.is_empty() {
            parts.push("no risk signals".to_string());
        }
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageAnnotation {
    pub code: String,
    pub confidence: f64,
}

impl LanguageAnnotation {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn unknown() -> Self {
        Self {
            code: Self::UNKNOWN.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.code == Self::UNKNOWN
    }
}

// --- Scored records ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: Record,
    pub score: f64,
    pub label: RiskLabel,
    pub explanation: Explanation,
    pub language: LanguageAnnotation,
    /// Vocabulary terms and threat phrases found in the text, sorted.
    pub matched_terms: Vec<String>,
}

// --- Author history ---

/// Scored activity for one author inside `[window_start, window_end]`.
/// Only obtainable through [`AuthorHistoryBuilder::seal`].
#[derive(Debug, Clone, Serialize)]
pub struct AuthorHistory {
    author: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    items: Vec<ScoredRecord>,
}

impl AuthorHistory {
    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn window_start(&self) -> DateTime<Utc> {
        self.window_start
    }

    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_end
    }

    pub fn items(&self) -> &[ScoredRecord] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct AuthorHistoryBuilder {
    history: AuthorHistory,
    rejected: usize,
}

impl AuthorHistoryBuilder {
    pub fn new(
        author: impl Into<String>,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Self {
        Self {
            history: AuthorHistory {
                author: author.into(),
                window_start,
                window_end,
                items: Vec::new(),
            },
            rejected: 0,
        }
    }

    /// Append an item, preserving crawl order. Items outside the window
    /// are dropped and `false` is returned.
    pub fn push(&mut self, item: ScoredRecord) -> bool {
        let at = item.record.created_at;
        if at < self.history.window_start || at > self.history.window_end {
            self.rejected += 1;
            return false;
        }
        self.history.items.push(item);
        true
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn seal(self) -> AuthorHistory {
        self.history
    }
}

/// Raw records of one author's history crawl as persisted between runs.
/// Items are re-scored on load, so stored histories never carry stale
/// scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub author: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub records: Vec<Record>,
    pub crawled_at: DateTime<Utc>,
}

// --- Verdicts ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerdictBasis {
    pub max_post_score: f64,
    pub average_score: f64,
    pub count_high_posts: usize,
    pub total_posts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorVerdict {
    pub run_id: Uuid,
    pub author: String,
    pub score: f64,
    pub label: AuthorLabel,
    pub explanation: String,
    pub basis: VerdictBasis,
    pub computed_at: DateTime<Utc>,
}

impl AuthorVerdict {
    /// Return a copy whose explanation carries an upstream note, e.g. that
    /// the author's history could not be reached.
    pub fn with_note(self, note: &str) -> Self {
        Self {
            explanation: format!("{}; {note}", self.explanation),
            ..self
        }
    }
}
