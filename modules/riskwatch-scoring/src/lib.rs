//! Rule-based risk scoring.
//!
//! Text flows through [`features::FeatureExtractor`] into [`scorer::RecordScorer`],
//! and per-author score windows are folded by [`aggregate::AuthorAggregator`].
//! The [`vocab::Vocabulary`] is read-only and can be shared across workers.

pub mod aggregate;
pub mod features;
pub mod language;
pub mod scorer;
pub mod vocab;

pub use aggregate::AuthorAggregator;
pub use features::{Extraction, Feature, FeatureExtractor, Features};
pub use language::{LanguageDetector, NoDetector, WhatlangDetector};
pub use scorer::{FeatureWeights, RecordScorer, ScoreResult};
pub use vocab::Vocabulary;
