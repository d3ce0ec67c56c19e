use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::vocab::Vocabulary;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").unwrap());

/// Intensifiers only count when a violent or hate term sits within this many tokens.
pub const INTENSIFIER_WINDOW: usize = 3;

/// Texts with fewer alphabetic characters than this report a caps ratio of 0.
pub const MIN_CAPS_LETTERS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    ViolentTermHits,
    HateTermHits,
    IntensifierHits,
    ThreatPatternHits,
    CapsRatio,
    Density,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::ViolentTermHits,
        Feature::HateTermHits,
        Feature::IntensifierHits,
        Feature::ThreatPatternHits,
        Feature::CapsRatio,
        Feature::Density,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::ViolentTermHits => "violent_term_hits",
            Feature::HateTermHits => "hate_term_hits",
            Feature::IntensifierHits => "intensifier_hits",
            Feature::ThreatPatternHits => "threat_pattern_hits",
            Feature::CapsRatio => "caps_ratio",
            Feature::Density => "density",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The six named signals for one text. All zero for empty text.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Features {
    pub violent_term_hits: f64,
    pub hate_term_hits: f64,
    pub intensifier_hits: f64,
    pub threat_pattern_hits: f64,
    pub caps_ratio: f64,
    pub density: f64,
}

impl Features {
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

    pub fn iter(&self) -> impl Iterator<Item = (Feature, f64)> + '_ {
        Feature::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        self.iter().map(|(f, v)| (f.name(), v)).collect()
    }

    pub fn is_zero(&self) -> bool {
        self.iter().all(|(_, v)| v == 0.0)
    }
}

/// Signals plus the evidence that produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub features: Features,
    /// Matched vocabulary terms and threat phrases, sorted and de-duplicated.
    pub matched_terms: Vec<String>,
    pub token_count: usize,
}

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    vocab: Arc<Vocabulary>,
}

impl FeatureExtractor {
    pub fn new(vocab: Arc<Vocabulary>) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn extract(&self, text: &str) -> Features {
        self.extract_detailed(text).features
    }

    pub fn extract_detailed(&self, text: &str) -> Extraction {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Extraction::default();
        }

        let mut violent = BTreeSet::new();
        let mut hate = BTreeSet::new();
        let mut risk_positions = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if self.vocab.is_violent(token) {
                violent.insert(token.as_str());
                risk_positions.push(i);
            } else if self.vocab.is_hate(token) {
                hate.insert(token.as_str());
                risk_positions.push(i);
            }
        }

        let mut intensifiers = BTreeSet::new();
        for (i, token) in tokens.iter().enumerate() {
            if self.vocab.is_intensifier(token)
                && risk_positions.iter().any(|&p| p.abs_diff(i) <= INTENSIFIER_WINDOW)
            {
                intensifiers.insert(token.as_str());
            }
        }

        // Counted per pattern, so each pattern contributes at most once.
        let mut threat_hits = 0usize;
        let mut threat_phrases = BTreeSet::new();
        for pattern in self.vocab.threat_patterns() {
            if let Some(start) = pattern.find(&tokens) {
                threat_hits += 1;
                threat_phrases.insert(tokens[start..start + pattern.len()].join(" "));
            }
        }

        let distinct_tokens = tokens.iter().collect::<HashSet<_>>().len();
        let term_hits = violent.len() + hate.len() + threat_hits;
        let density = (term_hits as f64 / distinct_tokens as f64).min(1.0);

        let features = Features {
            violent_term_hits: violent.len() as f64,
            hate_term_hits: hate.len() as f64,
            intensifier_hits: intensifiers.len() as f64,
            threat_pattern_hits: threat_hits as f64,
            caps_ratio: caps_ratio(text, &self.vocab),
            density,
        };

        let matched_terms: BTreeSet<String> = violent
            .iter()
            .chain(hate.iter())
            .map(|t| t.to_string())
            .chain(threat_phrases)
            .collect();

        Extraction {
            features,
            matched_terms: matched_terms.into_iter().collect(),
            token_count: tokens.len(),
        }
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(Arc::new(Vocabulary::default()))
    }
}

/// Lowercased runs of letters and digits; everything else is a boundary.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Fraction of alphabetic characters that are uppercase, over the raw text.
///
/// A violent or hate term counts once, in its most-shouted spelling, no
/// matter how often it repeats. Another occurrence of a term already present
/// therefore never dilutes the ratio.
fn caps_ratio(text: &str, vocab: &Vocabulary) -> f64 {
    let mut letters = 0usize;
    let mut upper = 0usize;
    // lowercased risk term -> (letters, most uppercase letters seen)
    let mut risk_terms: HashMap<String, (usize, usize)> = HashMap::new();

    for m in TOKEN_RE.find_iter(text) {
        let raw = m.as_str();
        let token_letters = raw.chars().filter(|c| c.is_alphabetic()).count();
        let token_upper = raw.chars().filter(|c| c.is_uppercase()).count();
        let token = raw.to_lowercase();
        if vocab.is_violent(&token) || vocab.is_hate(&token) {
            let entry = risk_terms.entry(token).or_insert((token_letters, 0));
            entry.1 = entry.1.max(token_upper);
        } else {
            letters += token_letters;
            upper += token_upper;
        }
    }
    for (term_letters, term_upper) in risk_terms.into_values() {
        letters += term_letters;
        upper += term_upper;
    }

    if letters < MIN_CAPS_LETTERS {
        return 0.0;
    }
    upper as f64 / letters as f64
}
