use riskwatch_common::LanguageAnnotation;

/// Optional language detection capability. Detection only annotates a
/// score; it never changes it.
pub trait LanguageDetector: Send + Sync {
    /// `None` means the detector could not decide.
    fn detect(&self, text: &str) -> Option<LanguageAnnotation>;
}

/// Stand-in used when no detector is available.
pub struct NoDetector;

impl LanguageDetector for NoDetector {
    fn detect(&self, _text: &str) -> Option<LanguageAnnotation> {
        None
    }
}

/// Texts shorter than this are too noisy to identify.
pub const MIN_DETECT_CHARS: usize = 20;

/// Trigram-based detection backed by `whatlang`. Codes are ISO 639-3
/// (`eng`, `spa`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl WhatlangDetector {
    pub fn new() -> Self {
        Self
    }
}

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<LanguageAnnotation> {
        let text = text.trim();
        if text.chars().count() < MIN_DETECT_CHARS {
            return None;
        }
        let info = whatlang::detect(text)?;
        Some(LanguageAnnotation {
            code: info.lang().code().to_string(),
            confidence: info.confidence(),
        })
    }
}
