//! Achievement Extractor: turns a free-text answer into CAR/REST facts.
//!
//! Clause-level pattern classes:
//! - Context: clauses led by situational markers ("when", "while", "at" ...)
//! - Action: verb-led clauses ("led a team of 5 engineers")
//! - Result: outcome clauses led by result verbs, or following a result
//!   connector ("resulting in", "which led to" ...)
//!
//! REST refinements are keyed by unit type across the whole utterance:
//! percentages/multipliers → Efficiency, headcount/volume/money → Scope,
//! durations/year ranges → Time.
//!
//! Extraction never fails. Unparseable input yields no facts. At most one fact
//! per field is returned for a single utterance (highest confidence, first wins).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::coaching::settings::Vocabulary;
use crate::coaching::text::{
    contains_any_term, contains_term, normalize_padded, starts_with_any_term,
};
use crate::models::session::{ExtractedFact, FactField, Phase};

static RESULT_CONNECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\s*,?\s*\b(?:which resulted in|that resulted in|resulting in|which led to|that led to|leading to|so that|thereby)\s+",
    )
    .expect("valid result connector regex")
});

static CLAUSE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:[.!?;]+(?:\s+|$)|,\s+|\s+but\s+)").expect("valid clause split regex")
});

static AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+and\s+(?:then\s+)?").expect("valid conjunction regex"));

static SUBJECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:then|also|so|and)\s+)*(?:(?:i|we)(?:'ve|\s+have|\s+had)?|my team|our team|the team)\s+",
    )
    .expect("valid subject regex")
});

static RESULT_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:as a result|consequently|ultimately|in turn|which)\s*,?\s+")
        .expect("valid result lead regex")
});

const NUMBER_WORDS: &str =
    r"one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|eighteen|twenty|several|a few";
const TIME_UNITS: &str = r"hours?|days?|weeks?|months?|quarters?|years?";

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:\d+(?:\.\d+)?\+?|{NUMBER_WORDS})\s*(?:{TIME_UNITS})\b"
    ))
    .expect("valid duration regex")
});

static TIME_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\s*,?\s*\b(?:over|in|within|during|for|across|after)\s+(?:just\s+|only\s+)?(?:the\s+)?(?:(?:past|last|first|next|following)\s+)?(?:\d+(?:\.\d+)?\+?|{NUMBER_WORDS})\s*(?:{TIME_UNITS})\b"
    ))
    .expect("valid time phrase regex")
});

static YEAR_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:19|20)\d{2}\s*(?:-|–|to|through|until)\s*(?:(?:19|20)\d{2}|present|now|today)\b")
        .expect("valid year range regex")
});

static PERCENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[~+-]?\d+(?:\.\d+)?\s*(?:%|percent\b)").expect("valid percent regex")
});

static MULTIPLIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d+(?:\.\d+)?\s?x\b").expect("valid multiplier regex"));

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[$€£]\s?\d[\d,]*(?:\.\d+)?(?:\s*(?:k|mm|m|bn|b|million|billion|thousand)\b)?")
        .expect("valid money regex")
});

// Base confidences per pattern class.
const CONTEXT_BASE: f64 = 0.6;
const ACTION_KNOWN_VERB: f64 = 0.75;
const ACTION_INFERRED_VERB: f64 = 0.55;
const RESULT_LEAD: f64 = 0.6;
const RESULT_EMBEDDED: f64 = 0.5;
const QUANTIFIED_BONUS: f64 = 0.25;
const IMPACT_BONUS: f64 = 0.1;
const MAX_CONFIDENCE: f64 = 0.95;

/// One clause of an utterance and whether a result connector introduced it.
struct Clause<'a> {
    text: &'a str,
    after_result_connector: bool,
}

/// Pattern-based CAR/REST extractor. Built once from the configured vocabulary.
#[derive(Debug, Clone)]
pub struct AchievementExtractor {
    vocab: Vocabulary,
    scope_re: Option<Regex>,
}

impl AchievementExtractor {
    pub fn new(vocab: &Vocabulary) -> Result<Self> {
        let scope_re = if vocab.scope_units.is_empty() {
            None
        } else {
            let mut units: Vec<&str> = vocab.scope_units.iter().map(String::as_str).collect();
            // Longest first so "direct reports" wins over "reports".
            units.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
            let alternation = units
                .iter()
                .map(|u| regex::escape(u).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            let pattern = format!(
                r"(?i)\b\d[\d,]*(?:\.\d+)?(?:\s*(?:k|m|thousand|million|billion)\b)?\+?\s+(?:[a-z-]+\s+)?(?:{alternation})\b"
            );
            Some(Regex::new(&pattern).context("Failed to compile scope unit pattern")?)
        };

        Ok(Self {
            vocab: vocab.clone(),
            scope_re,
        })
    }

    /// Extracts facts from one utterance captured in `phase` as turn `source_turn`.
    pub fn extract(&self, utterance: &str, phase: Phase, source_turn: u32) -> Vec<ExtractedFact> {
        let mut best: BTreeMap<FactField, (String, f64)> = BTreeMap::new();
        let mut offer = |field: FactField, value: String, confidence: f64| {
            if value.is_empty() {
                return;
            }
            match best.get(&field) {
                Some((_, existing)) if *existing >= confidence => {}
                _ => {
                    best.insert(field, (value, confidence));
                }
            }
        };

        for clause in self.clauses(utterance) {
            if let Some((field, value, confidence)) = self.classify(&clause) {
                offer(field, value, confidence);
            }
        }

        if let Some(m) = PERCENT_RE.find(utterance) {
            offer(FactField::Efficiency, clean(m.as_str()), 0.9);
        } else if let Some(m) = MULTIPLIER_RE.find(utterance) {
            offer(FactField::Efficiency, clean(m.as_str()), 0.8);
        }

        if let Some(m) = self.scope_re.as_ref().and_then(|re| re.find(utterance)) {
            offer(FactField::Scope, clean(m.as_str()), 0.8);
        } else if let Some(m) = MONEY_RE.find(utterance) {
            offer(FactField::Scope, clean(m.as_str()), 0.75);
        }

        if let Some(m) = DURATION_RE.find(utterance) {
            offer(FactField::Time, clean(m.as_str()), 0.85);
        } else if let Some(m) = YEAR_RANGE_RE.find(utterance) {
            offer(FactField::Time, clean(m.as_str()), 0.75);
        }

        let scale = phase_confidence_scale(phase);
        best.into_iter()
            .map(|(field, (value, confidence))| ExtractedFact {
                field,
                value,
                confidence: round2((confidence * scale).clamp(0.0, 1.0)),
                source_turn,
            })
            .collect()
    }

    /// Splits an utterance into clauses: result connectors first, then
    /// sentence punctuation/commas/"but", then "and" when a verb follows.
    fn clauses<'a>(&self, utterance: &'a str) -> Vec<Clause<'a>> {
        let mut out = Vec::new();
        let mut segments = Vec::new();
        let mut start = 0;
        let mut after_connector = false;
        for m in RESULT_CONNECTOR_RE.find_iter(utterance) {
            segments.push((&utterance[start..m.start()], after_connector));
            start = m.end();
            after_connector = true;
        }
        segments.push((&utterance[start..], after_connector));

        for (segment, after_result_connector) in segments {
            for (i, piece) in CLAUSE_SPLIT_RE.split(segment).enumerate() {
                for (j, part) in self.split_on_verb_conjunctions(piece).into_iter().enumerate() {
                    let text = part.trim();
                    if text.is_empty() {
                        continue;
                    }
                    out.push(Clause {
                        text,
                        // Only the clause directly after the connector is its outcome.
                        after_result_connector: after_result_connector && i == 0 && j == 0,
                    });
                }
            }
        }
        out
    }

    /// Splits on " and " only when the following words start a new verb clause,
    /// so "design and implementation" stays intact.
    fn split_on_verb_conjunctions<'a>(&self, clause: &'a str) -> Vec<&'a str> {
        let mut parts = Vec::new();
        let mut start = 0;
        for m in AND_RE.find_iter(clause) {
            if self.starts_with_verb(&clause[m.end()..]) {
                parts.push(&clause[start..m.start()]);
                start = m.end();
            }
        }
        parts.push(&clause[start..]);
        parts
    }

    fn starts_with_verb(&self, text: &str) -> bool {
        let text = strip_subject(text);
        let padded = normalize_padded(text);
        starts_with_any_term(&padded, &self.vocab.action_verbs)
            || starts_with_any_term(&padded, &self.vocab.result_verbs)
    }

    fn classify(&self, clause: &Clause<'_>) -> Option<(FactField, String, f64)> {
        let mut text = strip_subject(clause.text);
        let mut result_hint = clause.after_result_connector;
        if let Some(m) = RESULT_LEAD_RE.find(text) {
            text = &text[m.end()..];
            result_hint = true;
        }
        let text = strip_subject(text);
        let padded = normalize_padded(text);
        let quantified = text.chars().any(|c| c.is_ascii_digit());
        let impact = contains_any_term(&padded, &self.vocab.business_impact);

        let leads_with_result = starts_with_any_term(&padded, &self.vocab.result_verbs);
        if result_hint || leads_with_result {
            let confidence = RESULT_LEAD + bonus(quantified, impact);
            return Some((
                FactField::Result,
                strip_time_phrases(text),
                confidence.min(MAX_CONFIDENCE),
            ));
        }

        if starts_with_any_term(&padded, &self.vocab.context_markers) {
            let words = padded.split_whitespace().count();
            let confidence = if words >= 4 { CONTEXT_BASE + 0.1 } else { CONTEXT_BASE };
            return Some((FactField::Context, clean(text), confidence));
        }

        if starts_with_any_term(&padded, &self.vocab.action_verbs) {
            let confidence = ACTION_KNOWN_VERB + if quantified { 0.1 } else { 0.0 };
            return Some((
                FactField::Action,
                strip_time_phrases(text),
                confidence.min(MAX_CONFIDENCE),
            ));
        }

        let first_word = padded.split_whitespace().next().unwrap_or_default();
        if first_word.len() > 4 && first_word.ends_with("ed") {
            let confidence = ACTION_INFERRED_VERB + if quantified { 0.1 } else { 0.0 };
            return Some((FactField::Action, strip_time_phrases(text), confidence));
        }

        // "revenue grew 20%": outcome verb inside the clause, backed by a number.
        let has_result_verb = self
            .vocab
            .result_verbs
            .iter()
            .any(|v| contains_term(&padded, v));
        if has_result_verb && quantified {
            let confidence = RESULT_EMBEDDED + bonus(quantified, impact);
            return Some((
                FactField::Result,
                strip_time_phrases(text),
                confidence.min(MAX_CONFIDENCE),
            ));
        }

        None
    }
}

fn bonus(quantified: bool, impact: bool) -> f64 {
    let mut b = 0.0;
    if quantified {
        b += QUANTIFIED_BONUS;
    }
    if impact {
        b += IMPACT_BONUS;
    }
    b
}

/// Facts volunteered early in the dialogue are less reliable than mined ones.
fn phase_confidence_scale(phase: Phase) -> f64 {
    match phase {
        Phase::Introduction => 0.8,
        Phase::StoryDiscovery => 0.9,
        Phase::AchievementMining | Phase::Synthesis => 1.0,
    }
}

fn strip_subject(text: &str) -> &str {
    let text = text.trim();
    match SUBJECT_RE.find(text) {
        Some(m) => &text[m.end()..],
        None => text,
    }
}

fn strip_time_phrases(text: &str) -> String {
    clean(&TIME_PHRASE_RE.replace_all(text, ""))
}

fn clean(text: &str) -> String {
    text.trim_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';' | '!' | '?'))
        .to_string()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
