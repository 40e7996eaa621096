//! Lightweight bias heuristic over model output.
//!
//! Rejection/denial language earns a base score; the score rises sharply when
//! a protected-category term appears within a few words of that language.
//! Protected-category terms on their own score nothing.

use serde::Serialize;

use crate::config::GovernanceSettings;

/// Trailing `*` marks a stem: it matches any word starting with it.
const DECISION_TERMS: &[&str] = &[
    "reject*",
    "deny",
    "denied",
    "denial",
    "declin*",
    "disqualif*",
    "unsuitable",
    "unfit",
    "not a fit",
    "not a good fit",
    "do not hire",
    "should not be hired",
    "not recommended",
    "terminat*",
    "dismiss*",
    "too old",
    "too young",
    "overqualified",
];

const PROTECTED_TERMS: &[&str] = &[
    "age",
    "aged",
    "older",
    "elderly",
    "younger",
    "gender",
    "female",
    "male",
    "woman",
    "women",
    "pregnan*",
    "maternity",
    "paternity",
    "religio*",
    "race",
    "racial",
    "ethnic*",
    "disab*",
    "nationality",
    "national origin",
    "immigra*",
    "accent",
    "marital",
    "married",
    "sexual orientation",
    "veteran",
];

const DECISION_BASE: f64 = 0.3;
const EXTRA_DECISION_STEP: f64 = 0.1;
const EXTRA_DECISION_CAP: f64 = 0.2;
const PROTECTED_PROXIMITY_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BiasAssessment {
    /// 0.0 – 1.0
    pub score: f64,
    pub decision_terms: Vec<String>,
    pub protected_terms_nearby: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BiasScanner {
    decision_terms: Vec<Phrase>,
    protected_terms: Vec<Phrase>,
    /// Max distance in words between a decision and a protected match.
    proximity_window: usize,
}

#[derive(Debug, Clone)]
struct Phrase {
    label: String,
    words: Vec<String>,
    prefix_last: bool,
}

impl Phrase {
    fn parse(raw: &str) -> Self {
        let prefix_last = raw.ends_with('*');
        let label = raw.trim().trim_end_matches('*').to_lowercase();
        let words = label.split_whitespace().map(str::to_string).collect();
        Self {
            label,
            words,
            prefix_last,
        }
    }

    /// Word positions at which this phrase starts.
    fn positions(&self, tokens: &[String]) -> Vec<usize> {
        let n = self.words.len();
        if n == 0 || tokens.len() < n {
            return Vec::new();
        }
        (0..=tokens.len() - n)
            .filter(|&start| {
                self.words.iter().enumerate().all(|(j, word)| {
                    let token = &tokens[start + j];
                    if self.prefix_last && j == n - 1 {
                        token.starts_with(word.as_str())
                    } else {
                        token == word
                    }
                })
            })
            .collect()
    }
}

impl Default for BiasScanner {
    fn default() -> Self {
        Self::new(DECISION_TERMS, PROTECTED_TERMS, 8)
    }
}

impl BiasScanner {
    pub fn new<D: AsRef<str>, P: AsRef<str>>(
        decision_terms: &[D],
        protected_terms: &[P],
        proximity_window: usize,
    ) -> Self {
        Self {
            decision_terms: parse_all(decision_terms),
            protected_terms: parse_all(protected_terms),
            proximity_window,
        }
    }

    /// Built-in vocabularies, each replaced by its configured list when one
    /// is set and not empty.
    pub fn from_settings(settings: &GovernanceSettings) -> Self {
        let defaults = Self::default();
        let configured = |terms: &Option<Vec<String>>| {
            terms
                .as_deref()
                .filter(|terms| !terms.is_empty())
                .map(parse_all)
        };
        Self {
            decision_terms: configured(&settings.decision_terms)
                .unwrap_or(defaults.decision_terms),
            protected_terms: configured(&settings.protected_terms)
                .unwrap_or(defaults.protected_terms),
            proximity_window: defaults.proximity_window,
        }
    }

    pub fn assess(&self, text: &str) -> BiasAssessment {
        let tokens = tokenize(text);

        let decisions: Vec<(&Phrase, Vec<usize>)> = self
            .decision_terms
            .iter()
            .map(|p| (p, p.positions(&tokens)))
            .filter(|(_, pos)| !pos.is_empty())
            .collect();

        if decisions.is_empty() {
            return BiasAssessment::default();
        }

        let decision_positions: Vec<usize> = decisions
            .iter()
            .flat_map(|(_, pos)| pos.iter().copied())
            .collect();

        let protected_terms_nearby: Vec<String> = self
            .protected_terms
            .iter()
            .filter(|p| {
                p.positions(&tokens).into_iter().any(|i| {
                    decision_positions
                        .iter()
                        .any(|&d| i.abs_diff(d) <= self.proximity_window)
                })
            })
            .map(|p| p.label.clone())
            .collect();

        let extra = (EXTRA_DECISION_STEP * (decisions.len() - 1) as f64).min(EXTRA_DECISION_CAP);
        let mut score = DECISION_BASE + extra;
        if !protected_terms_nearby.is_empty() {
            score += PROTECTED_PROXIMITY_WEIGHT;
        }

        BiasAssessment {
            score: score.clamp(0.0, 1.0),
            decision_terms: decisions.iter().map(|(p, _)| p.label.clone()).collect(),
            protected_terms_nearby,
        }
    }
}

fn parse_all<S: AsRef<str>>(terms: &[S]) -> Vec<Phrase> {
    terms.iter().map(|t| Phrase::parse(t.as_ref())).collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
