use std::collections::HashSet;
use std::sync::LazyLock;

const VIOLENT_TERMS: &[&str] = &[
    "kill", "killing", "murder", "attack", "shoot", "shooting", "bomb", "bombing", "stab",
    "stabbing", "genocide", "execute", "execution", "lynch", "slaughter", "massacre",
    "terrorist", "terrorism",
];

const HATE_TERMS: &[&str] = &[
    "racist", "racism", "nazi", "nazis", "hitler", "subhuman", "vermin", "garbage", "retard",
    "retarded", "scum", "freaks", "trash", "animals",
];

const INTENSIFIERS: &[&str] = &[
    "very", "really", "extremely", "super", "totally", "literally", "so", "utterly",
    "completely",
];

const SUBJECTS: &[&str] = &["i", "we"];
const MODALS: &[&str] = &["will", "shall", "gonna", "must", "should", "would"];
const PROGRESSIVE: &[&str] = &["m", "am", "re", "are"];
const VIOLENT_VERBS: &[&str] = &[
    "kill", "hurt", "beat", "destroy", "shoot", "stab", "bomb", "lynch", "execute",
    "slaughter", "murder", "attack",
];
const PASSIVE_MODALS: &[&str] = &["should", "must", "will", "ought", "needs", "need"];
const PASSIVE_VERBS: &[&str] = &[
    "killed", "shot", "bombed", "lynched", "executed", "hanged", "slaughtered", "stabbed",
    "wiped",
];

static BUILTIN: LazyLock<Vocabulary> = LazyLock::new(|| {
    Vocabulary::new(
        VIOLENT_TERMS,
        HATE_TERMS,
        INTENSIFIERS,
        vec![
            ThreatPattern::new("subject_modal_verb", &[SUBJECTS, MODALS, VIOLENT_VERBS]),
            ThreatPattern::new(
                "subject_going_to_verb",
                &[SUBJECTS, PROGRESSIVE, &["going"], &["to"], VIOLENT_VERBS],
            ),
            ThreatPattern::new("subject_will_contracted_verb", &[SUBJECTS, &["ll"], VIOLENT_VERBS]),
            ThreatPattern::new("subject_modal_wipe_out", &[SUBJECTS, MODALS, &["wipe"], &["out", "them"]]),
            ThreatPattern::new("deserve_to_die", &[&["deserve", "deserves"], &["to"], &["die"]]),
            ThreatPattern::new("should_be_passive_verb", &[PASSIVE_MODALS, &["be"], PASSIVE_VERBS]),
        ],
    )
});

/// An ordered sequence of token slots; each slot lists accepted alternatives.
/// A pattern matches only where consecutive tokens satisfy every slot in order.
#[derive(Debug, Clone)]
pub struct ThreatPattern {
    name: String,
    slots: Vec<HashSet<String>>,
}

impl ThreatPattern {
    pub fn new(name: &str, slots: &[&[&str]]) -> Self {
        Self {
            name: name.to_string(),
            slots: slots
                .iter()
                .map(|alts| alts.iter().map(|a| a.to_lowercase()).collect())
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Start index of the first match in `tokens`, if any.
    pub fn find<S: AsRef<str>>(&self, tokens: &[S]) -> Option<usize> {
        if self.slots.is_empty() || tokens.len() < self.slots.len() {
            return None;
        }
        (0..=tokens.len() - self.slots.len()).find(|&start| {
            self.slots
                .iter()
                .zip(&tokens[start..])
                .all(|(slot, token)| slot.contains(token.as_ref()))
        })
    }
}

/// Static term lists the feature extractor matches against. Read-only once
/// built, so one instance is shared by every worker.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    violent: HashSet<String>,
    hate: HashSet<String>,
    intensifiers: HashSet<String>,
    threats: Vec<ThreatPattern>,
}

impl Vocabulary {
    pub fn new(
        violent: &[&str],
        hate: &[&str],
        intensifiers: &[&str],
        threats: Vec<ThreatPattern>,
    ) -> Self {
        fn set(terms: &[&str]) -> HashSet<String> {
            terms.iter().map(|t| t.to_lowercase()).collect()
        }
        Self {
            violent: set(violent),
            hate: set(hate),
            intensifiers: set(intensifiers),
            threats,
        }
    }

    /// The built-in English vocabulary.
    pub fn builtin() -> &'static Vocabulary {
        &BUILTIN
    }

    pub fn is_violent(&self, token: &str) -> bool {
        self.violent.contains(token)
    }

    pub fn is_hate(&self, token: &str) -> bool {
        self.hate.contains(token)
    }

    pub fn is_intensifier(&self, token: &str) -> bool {
        self.intensifiers.contains(token)
    }

    pub fn threat_patterns(&self) -> &[ThreatPattern] {
        &self.threats
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::builtin().clone()
    }
}
