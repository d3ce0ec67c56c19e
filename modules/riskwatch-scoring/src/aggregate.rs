use chrono::Utc;
use uuid::Uuid;

use riskwatch_common::{
    clamp_score, AuthorHistory, AuthorVerdict, LabelThresholds, ScoredRecord, VerdictBasis,
};

/// Weight of the `ln(1 + count_high_posts)` boost on top of the average.
const HIGH_POST_BOOST: f64 = 0.2;

/// Folds one author's scored window into a single verdict. Never fails:
/// an empty window falls back to the score of the record that triggered
/// enrichment.
#[derive(Debug, Clone)]
pub struct AuthorAggregator {
    thresholds: LabelThresholds,
    lookback_days: i64,
    min_confident_posts: usize,
    run_id: Uuid,
}

impl AuthorAggregator {
    pub fn new(thresholds: LabelThresholds, lookback_days: i64, run_id: Uuid) -> Self {
        Self {
            thresholds,
            lookback_days,
            min_confident_posts: 0,
            run_id,
        }
    }

    /// Windows smaller than this get a low-confidence note appended.
    pub fn with_min_confident_posts(mut self, min: usize) -> Self {
        self.min_confident_posts = min;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn aggregate_history(&self, history: &AuthorHistory, fallback_score: f64) -> AuthorVerdict {
        self.aggregate(history.author(), history.items(), fallback_score)
    }

    pub fn aggregate(
        &self,
        author: &str,
        scored_history: &[ScoredRecord],
        fallback_score: f64,
    ) -> AuthorVerdict {
        if scored_history.is_empty() {
            return self.fallback_verdict(author, fallback_score);
        }

        let total_posts = scored_history.len();
        let max_post_score = scored_history
            .iter()
            .map(|s| s.score)
            .fold(0.0_f64, f64::max);
        let average_score = scored_history.iter().map(|s| s.score).sum::<f64>() / total_posts as f64;
        let count_high_posts = scored_history
            .iter()
            .filter(|s| s.score >= self.thresholds.high())
            .count();

        let boosted = average_score + HIGH_POST_BOOST * (1.0 + count_high_posts as f64).ln();
        let score = clamp_score(max_post_score.max(boosted));
        let label = self.thresholds.classify_author(score);

        let mut explanation = format!(
            "{count_high_posts} high-risk posts in the last {} days; max post score {max_post_score:.2}; \
             verdict {score:.2} ({label}) from {total_posts} items",
            self.lookback_days
        );
        if total_posts < self.min_confident_posts {
            explanation.push_str(&format!(
                "; low-confidence estimate (only {total_posts} items available)"
            ));
        }

        AuthorVerdict {
            run_id: self.run_id,
            author: author.to_string(),
            score,
            label,
            explanation,
            basis: VerdictBasis {
                max_post_score,
                average_score,
                count_high_posts,
                total_posts,
            },
            computed_at: Utc::now(),
        }
    }

    fn fallback_verdict(&self, author: &str, fallback_score: f64) -> AuthorVerdict {
        let score = clamp_score(fallback_score);
        let label = self.thresholds.classify_author(score);
        AuthorVerdict {
            run_id: self.run_id,
            author: author.to_string(),
            score,
            label,
            explanation: format!(
                "no additional history available in the last {} days; \
                 verdict {score:.2} ({label}) from the triggering record score",
                self.lookback_days
            ),
            basis: VerdictBasis::default(),
            computed_at: Utc::now(),
        }
    }
}
