use std::sync::Arc;

use tracing::debug;

use riskwatch_common::{
    clamp_score, Contribution, Explanation, LabelThresholds, LanguageAnnotation, Record,
    RiskWatchError, ScoredRecord,
};

use crate::features::{Feature, FeatureExtractor, Features};
use crate::language::{LanguageDetector, WhatlangDetector};

/// Language the vocabulary and weights were tuned for.
pub const TUNED_LANGUAGE: &str = "eng";

/// Order used to break ties between equal contributions.
const TIE_BREAK_PRIORITY: [Feature; 6] = [
    Feature::ThreatPatternHits,
    Feature::ViolentTermHits,
    Feature::HateTermHits,
    Feature::Density,
    Feature::IntensifierHits,
    Feature::CapsRatio,
];

/// Per-unit weight of each signal. Counts are multiplied directly, so two
/// distinct violent terms contribute `2 * violent_term_hits`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureWeights {
    violent_term_hits: f64,
    hate_term_hits: f64,
    intensifier_hits: f64,
    threat_pattern_hits: f64,
    caps_ratio: f64,
    density: f64,
}

impl FeatureWeights {
    pub const VIOLENT_TERM_HITS: f64 = 0.20;
    pub const HATE_TERM_HITS: f64 = 0.20;
    pub const INTENSIFIER_HITS: f64 = 0.05;
    pub const THREAT_PATTERN_HITS: f64 = 0.35;
    pub const CAPS_RATIO: f64 = 0.15;
    pub const DENSITY: f64 = 0.50;

    /// Weights must be finite and non-negative so that more evidence never
    /// lowers a score.
    pub fn new(
        violent_term_hits: f64,
        hate_term_hits: f64,
        intensifier_hits: f64,
        threat_pattern_hits: f64,
        caps_ratio: f64,
        density: f64,
    ) -> Result<Self, RiskWatchError> {
        let weights = Self {
            violent_term_hits,
            hate_term_hits,
            intensifier_hits,
            threat_pattern_hits,
            caps_ratio,
            density,
        };
        for feature in Feature::ALL {
            let w = weights.get(feature);
            if !w.is_finite() || w < 0.0 {
                return Err(RiskWatchError::Validation(format!(
                    "weight for {feature} must be finite and non-negative (got {w})"
                )));
            }
        }
        Ok(weights)
    }

    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::ViolentTermHits => self.violent_term_hits,
            Feature::HateTermHits => self.hate_term_hits,
            Feature::IntensifierHits => self.intensifier_hits,
            Feature::ThreatPatternHits => self.threat_pattern_hits,
            Feature::CapsRatio => self.caps_ratio,
            Feature::Density => self.density,
        }
    }
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            violent_term_hits: Self::VIOLENT_TERM_HITS,
            hate_term_hits: Self::HATE_TERM_HITS,
            intensifier_hits: Self::INTENSIFIER_HITS,
            threat_pattern_hits: Self::THREAT_PATTERN_HITS,
            caps_ratio: Self::CAPS_RATIO,
            density: Self::DENSITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Weighted sum clamped to `[0, 1]`.
    pub score: f64,
    /// Strictly positive contributions, largest first.
    pub contributions: Vec<Contribution>,
}

pub struct RecordScorer {
    extractor: FeatureExtractor,
    weights: FeatureWeights,
    thresholds: LabelThresholds,
    detector: Arc<dyn LanguageDetector>,
}

impl RecordScorer {
    pub fn new(
        extractor: FeatureExtractor,
        thresholds: LabelThresholds,
        detector: Arc<dyn LanguageDetector>,
    ) -> Self {
        Self {
            extractor,
            weights: FeatureWeights::default(),
            thresholds,
            detector,
        }
    }

    pub fn with_weights(mut self, weights: FeatureWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn thresholds(&self) -> &LabelThresholds {
        &self.thresholds
    }

    /// Combine signals into a bounded score and a ranked explanation.
    pub fn score(&self, features: &Features) -> ScoreResult {
        let mut contributions: Vec<Contribution> = TIE_BREAK_PRIORITY
            .iter()
            .map(|&f| Contribution {
                feature: f.name().to_string(),
                value: self.weights.get(f) * features.get(f),
            })
            .filter(|c| c.value > 0.0)
            .collect();
        // Stable sort keeps the priority order for equal values.
        contributions.sort_by(|a, b| b.value.total_cmp(&a.value));

        let raw: f64 = contributions.iter().map(|c| c.value).sum();
        ScoreResult {
            score: clamp_score(raw),
            contributions,
        }
    }

    pub fn score_record(&self, record: Record) -> ScoredRecord {
        let extraction = self.extractor.extract_detailed(&record.text);
        let result = self.score(&extraction.features);
        let language = self
            .detector
            .detect(&record.text)
            .unwrap_or_else(LanguageAnnotation::unknown);
        let caveat = language_caveat(&language);
        debug!(
            id = %record.id,
            score = result.score,
            language = %language.code,
            matched = extraction.matched_terms.len(),
            "Scored record"
        );

        ScoredRecord {
            label: self.thresholds.classify(result.score),
            score: result.score,
            explanation: Explanation {
                caveat,
                contributions: result.contributions,
            },
            language,
            matched_terms: extraction.matched_terms,
            record,
        }
    }
}

impl Default for RecordScorer {
    fn default() -> Self {
        Self::new(
            FeatureExtractor::default(),
            LabelThresholds::default(),
            Arc::new(WhatlangDetector::new()),
        )
    }
}

fn language_caveat(language: &LanguageAnnotation) -> Option<String> {
    if language.code == TUNED_LANGUAGE {
        return None;
    }
    if language.is_unknown() {
        return Some(format!(
            "low confidence: language could not be determined (vocabulary tuned for '{TUNED_LANGUAGE}')"
        ));
    }
    Some(format!(
        "low confidence: detected language '{}' ({:.2}) differs from tuned language '{TUNED_LANGUAGE}'",
        language.code, language.confidence
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use riskwatch_common::{RecordKind, RiskLabel};

    use crate::language::NoDetector;

    fn record(text: &str) -> Record {
        Record {
            id: "t3_test".to_string(),
            author: "test_user".to_string(),
            channel: "test".to_string(),
            kind: RecordKind::Submission,
            text: text.to_string(),
            created_at: Utc::now(),
            permalink: "https://www.reddit.com/r/test/comments/test".to_string(),
        }
    }

    fn score_text(text: &str) -> ScoredRecord {
        RecordScorer::default().score_record(record(text))
    }

    #[test]
    fn benign_text_scores_zero_with_empty_explanation() {
        let scored = score_text("hello there, nice day");
        assert_eq!(scored.score, 0.0);
        assert_eq!(scored.label, RiskLabel::Low);
        assert!(scored.explanation.contributions.is_empty());
        assert!(scored.matched_terms.is_empty());
    }

    #[test]
    fn direct_threat_is_high() {
        let scored = score_text("I will kill you");
        // violent 0.20 + threat 0.35 + density 0.5 * 0.5
        assert!((scored.score - 0.80).abs() < 1e-9, "{}", scored.score);
        assert_eq!(scored.label, RiskLabel::High);
        let names: Vec<&str> = scored
            .explanation
            .contributions
            .iter()
            .map(|c| c.feature.as_str())
            .collect();
        assert_eq!(names, vec!["threat_pattern_hits", "density", "violent_term_hits"]);
    }

    #[test]
    fn violent_post_mentions_terms() {
        let scored =
            score_text("We should kill them all and bomb their city, they deserve to die.");
        assert!(scored.label >= RiskLabel::Medium);
        assert!(scored.matched_terms.iter().any(|t| t == "kill" || t == "bomb"));
    }

    #[test]
    fn score_is_clamped_for_extreme_text() {
        let scored = score_text(
            "I WILL KILL AND BOMB AND SHOOT AND STAB THOSE SUBHUMAN VERMIN SCUM, THEY DESERVE TO DIE",
        );
        assert_eq!(scored.score, 1.0);
        assert_eq!(scored.label, RiskLabel::High);
    }

    #[test]
    fn ties_follow_fixed_priority() {
        let scorer = RecordScorer::default();
        let features = Features {
            violent_term_hits: 1.0,
            hate_term_hits: 1.0,
            ..Features::default()
        };
        let result = scorer.score(&features);
        assert_eq!(result.contributions[0].feature, "violent_term_hits");
        assert_eq!(result.contributions[1].feature, "hate_term_hits");
    }

    #[test]
    fn repeated_scoring_is_identical() {
        let text = "They are REALLY garbage and we should attack, totally vermin";
        let first = score_text(text);
        for _ in 0..10 {
            let again = score_text(text);
            assert_eq!(again.score.to_bits(), first.score.to_bits());
            assert_eq!(again.explanation, first.explanation);
            assert_eq!(again.explanation.to_string(), first.explanation.to_string());
        }
    }

    #[test]
    fn adding_a_violent_term_never_lowers_the_score() {
        let scorer = RecordScorer::default();
        let extractor = FeatureExtractor::default();
        let bases = [
            "hello there, nice day",
            "they are garbage",
            "we should attack",
            "i will kill you",
            "people keep talking about the news today and nothing changes",
            "KILL THEM ALL YOU ANIMALS RIGHT NOW",
            "WE WILL ATTACK THEM TONIGHT, EVERY LAST ONE",
            "THE NEWS TODAY IS LOUD AND NOTHING CHANGES",
        ];
        for base in bases {
            for term in ["kill", "massacre", "attack", "KILL"] {
                let before = extractor.extract(base);
                for after_text in [format!("{base} {term}"), format!("{term} {base}")] {
                    let after = extractor.extract(&after_text);
                    // Counts in isolation.
                    assert!(after.violent_term_hits >= before.violent_term_hits);
                    assert!(after.threat_pattern_hits >= before.threat_pattern_hits);
                    assert!(after.intensifier_hits >= before.intensifier_hits);
                    // Score as a whole.
                    assert!(
                        scorer.score(&after).score >= scorer.score(&before).score,
                        "{after_text:?} scored below {base:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn lowercase_repeat_of_a_shouted_term_keeps_the_score() {
        let base = score_text("KILL THEM ALL YOU ANIMALS RIGHT NOW");
        let repeated = score_text("KILL THEM ALL YOU ANIMALS RIGHT NOW kill");
        assert_eq!(repeated.score, base.score);
    }

    #[test]
    fn repeated_occurrence_leaves_density_unchanged() {
        let extractor = FeatureExtractor::default();
        let once = extractor.extract("we must attack now");
        let twice = extractor.extract("we must attack now attack");
        assert_eq!(once.density, twice.density);
        assert_eq!(once.violent_term_hits, twice.violent_term_hits);
    }

    #[test]
    fn missing_detector_adds_caveat_but_keeps_score() {
        let text = "I will kill you";
        let with_detector = score_text(text);
        let without = RecordScorer::new(
            FeatureExtractor::default(),
            LabelThresholds::default(),
            Arc::new(NoDetector),
        )
        .score_record(record(text));

        assert_eq!(with_detector.score, without.score);
        assert!(without.language.is_unknown());
        let caveat = without.explanation.caveat.as_deref().unwrap();
        assert!(caveat.contains("could not be determined"));
        assert!(without.explanation.to_string().starts_with("low confidence"));
    }

    #[test]
    fn foreign_text_gets_caveat_naming_the_language() {
        let scored = score_text(
            "Mañana vamos juntos al mercado central para comprar frutas y verduras frescas",
        );
        assert_eq!(scored.language.code, "spa");
        let caveat = scored.explanation.caveat.as_deref().unwrap();
        assert!(caveat.contains("detected language 'spa'"), "{caveat}");
        assert!(caveat.contains("tuned language 'eng'"), "{caveat}");
        assert_eq!(scored.score, 0.0);
    }

    #[test]
    fn english_text_has_no_caveat() {
        let scored = score_text("We went to the park and it was a very nice day for all of us");
        assert_eq!(scored.language.code, TUNED_LANGUAGE);
        assert!(scored.explanation.caveat.is_none());
    }

    #[test]
    fn negative_weights_are_rejected() {
        assert!(FeatureWeights::new(0.2, 0.2, 0.05, 0.35, -0.1, 0.5).is_err());
        assert!(FeatureWeights::new(0.2, 0.2, 0.05, 0.35, 0.15, f64::NAN).is_err());
        assert!(FeatureWeights::new(0.2, 0.2, 0.05, 0.35, 0.15, 0.5).is_ok());
    }
}
