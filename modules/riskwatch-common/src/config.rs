use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RiskWatchError;
use crate::types::LabelThresholds;

const DEFAULT_CHANNELS: &[&str] = &[
    "news",
    "worldnews",
    "politics",
    "PublicFreakout",
    "unpopularopinion",
    "Palestine",
];

/// Which Source Client implementation a run is handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Reddit,
    Stub,
}

impl FromStr for Backend {
    type Err = RiskWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Ok(Backend::Reddit),
            "stub" => Ok(Backend::Stub),
            other => Err(RiskWatchError::Config(format!(
                "unknown backend '{other}' (expected 'reddit' or 'stub')"
            ))),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Reddit => write!(f, "reddit"),
            Backend::Stub => write!(f, "stub"),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Source
    pub backend: Backend,
    pub user_agent: String,
    pub channels: Vec<String>,

    // Crawl bounds
    pub max_records_per_channel: usize,
    pub max_total_records: usize,
    pub max_pages: usize,
    pub max_history_items: usize,
    pub lookback_days: i64,

    // Transport behaviour
    pub concurrency: usize,
    pub request_delay: Duration,
    pub page_timeout: Duration,
    pub max_retries: u32,
    pub max_consecutive_failures: u32,

    // Scoring
    pub thresholds: LabelThresholds,
    pub min_confident_posts: usize,

    // Output
    pub data_dir: PathBuf,
    /// Reuse histories already stored in `data_dir` instead of crawling
    /// those authors again.
    pub skip_known_authors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Reddit,
            user_agent: "riskwatch/0.1".to_string(),
            channels: DEFAULT_CHANNELS.iter().map(|c| c.to_string()).collect(),
            max_records_per_channel: 50,
            max_total_records: 150,
            max_pages: 10,
            max_history_items: 300,
            lookback_days: 60,
            concurrency: 4,
            request_delay: Duration::from_millis(1000),
            page_timeout: Duration::from_secs(10),
            max_retries: 3,
            max_consecutive_failures: 3,
            thresholds: LabelThresholds::default(),
            min_confident_posts: 5,
            data_dir: PathBuf::from("data"),
            skip_known_authors: false,
        }
    }
}

/// Longest accepted history window, roughly a century.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

impl Config {
    /// Load configuration from the environment (and `.env` if present).
    /// Unset variables fall back to defaults; malformed ones are errors.
    pub fn from_env() -> Result<Self, RiskWatchError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Used by `from_env` and tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RiskWatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let channels = match lookup("RISKWATCH_CHANNELS") {
            Some(raw) => parse_list(&raw),
            None => defaults.channels,
        };
        if channels.is_empty() {
            return Err(RiskWatchError::Config(
                "RISKWATCH_CHANNELS must name at least one channel".to_string(),
            ));
        }

        let medium = parsed(&lookup, "RISKWATCH_MEDIUM_THRESHOLD", defaults.thresholds.medium())?;
        let high = parsed(&lookup, "RISKWATCH_HIGH_THRESHOLD", defaults.thresholds.high())?;
        let thresholds = LabelThresholds::new(medium, high)
            .map_err(|e| RiskWatchError::Config(e.to_string()))?;

        let config = Self {
            backend: match lookup("RISKWATCH_BACKEND") {
                Some(raw) => raw.parse()?,
                None => defaults.backend,
            },
            user_agent: lookup("RISKWATCH_USER_AGENT").unwrap_or(defaults.user_agent),
            channels,
            max_records_per_channel: parsed(
                &lookup,
                "RISKWATCH_MAX_RECORDS_PER_CHANNEL",
                defaults.max_records_per_channel,
            )?,
            max_total_records: parsed(&lookup, "RISKWATCH_MAX_TOTAL_RECORDS", defaults.max_total_records)?,
            max_pages: parsed(&lookup, "RISKWATCH_MAX_PAGES", defaults.max_pages)?,
            max_history_items: parsed(&lookup, "RISKWATCH_MAX_HISTORY_ITEMS", defaults.max_history_items)?,
            lookback_days: parsed(&lookup, "RISKWATCH_LOOKBACK_DAYS", defaults.lookback_days)?,
            concurrency: parsed(&lookup, "RISKWATCH_CONCURRENCY", defaults.concurrency)?,
            request_delay: Duration::from_millis(parsed(
                &lookup,
                "RISKWATCH_REQUEST_DELAY_MS",
                defaults.request_delay.as_millis() as u64,
            )?),
            page_timeout: Duration::from_secs(parsed(
                &lookup,
                "RISKWATCH_PAGE_TIMEOUT_SECS",
                defaults.page_timeout.as_secs(),
            )?),
            max_retries: parsed(&lookup, "RISKWATCH_MAX_RETRIES", defaults.max_retries)?,
            max_consecutive_failures: parsed(
                &lookup,
                "RISKWATCH_MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            )?,
            thresholds,
            min_confident_posts: parsed(
                &lookup,
                "RISKWATCH_MIN_CONFIDENT_POSTS",
                defaults.min_confident_posts,
            )?,
            data_dir: lookup("RISKWATCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            skip_known_authors: parsed(
                &lookup,
                "RISKWATCH_SKIP_KNOWN_AUTHORS",
                defaults.skip_known_authors,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Caps of zero would make every crawl a no-op; reject them up front.
    pub fn validate(&self) -> Result<(), RiskWatchError> {
        let positive = [
            ("RISKWATCH_MAX_RECORDS_PER_CHANNEL", self.max_records_per_channel),
            ("RISKWATCH_MAX_TOTAL_RECORDS", self.max_total_records),
            ("RISKWATCH_MAX_PAGES", self.max_pages),
            ("RISKWATCH_MAX_HISTORY_ITEMS", self.max_history_items),
            ("RISKWATCH_CONCURRENCY", self.concurrency),
            (
                "RISKWATCH_MAX_CONSECUTIVE_FAILURES",
                self.max_consecutive_failures as usize,
            ),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(RiskWatchError::Config(format!("{key} must be greater than 0")));
            }
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.lookback_days) {
            return Err(RiskWatchError::Config(format!(
                "RISKWATCH_LOOKBACK_DAYS must be between 1 and {MAX_LOOKBACK_DAYS} (got {})",
                self.lookback_days
            )));
        }
        if self.page_timeout.is_zero() {
            return Err(RiskWatchError::Config(
                "RISKWATCH_PAGE_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  RISKWATCH_BACKEND: {}", self.backend);
        tracing::info!("  RISKWATCH_CHANNELS: {}", self.channels.join(","));
        tracing::info!(
            "  caps: {}/channel, {} total, {} pages, {} history items",
            self.max_records_per_channel,
            self.max_total_records,
            self.max_pages,
            self.max_history_items
        );
        tracing::info!("  RISKWATCH_LOOKBACK_DAYS: {}", self.lookback_days);
        tracing::info!(
            "  thresholds: medium={} high={}",
            self.thresholds.medium(),
            self.thresholds.high()
        );
        tracing::info!("  RISKWATCH_DATA_DIR: {}", self.data_dir.display());
        tracing::info!("  RISKWATCH_SKIP_KNOWN_AUTHORS: {}", self.skip_known_authors);
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> Result<T, RiskWatchError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RiskWatchError::Config(format!("{key} is invalid ('{raw}'): {e}"))),
        None => Ok(default),
    }
}
