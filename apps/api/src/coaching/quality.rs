//! Response Quality Analyzer. Scores one utterance for how much resume-grade
//! evidence it carries.
//!
//! Pure and deterministic: the same utterance, phase and settings always
//! produce the same analysis.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::coaching::settings::CoachingSettings;
use crate::coaching::text::{contains_any_term, normalize_padded};
use crate::models::session::{Phase, QualitySignals};

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+(?:\.\d+)?\+?\s*(?:hours?|hrs?|days?|weeks?|wks?|months?|mos?|quarters?|years?|yrs?)\b")
        .expect("valid duration regex")
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid year regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QualityError {
    #[error("utterance is empty")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityAnalysis {
    /// 0–100
    pub score: u8,
    pub signals: QualitySignals,
    pub phase: Phase,
}

/// Scores an utterance as the weighted sum of the signals it carries.
///
/// Signals:
/// - quantification: digits, `%`, currency, `~N`, `Nx`, or quantity words
/// - specific role: role/title vocabulary
/// - timeframe: durations (`3 months`), years, or timeframe vocabulary
/// - business impact: impact vocabulary (revenue, efficiency, ROI, scale...)
///
/// Weights come from settings (per-phase override when present) and are
/// normalised so the maximum is always 100.
pub fn analyze(
    utterance: &str,
    phase: Phase,
    settings: &CoachingSettings,
) -> Result<QualityAnalysis, QualityError> {
    if utterance.trim().is_empty() {
        return Err(QualityError::EmptyResponse);
    }

    let vocab = &settings.vocabulary;
    let padded = normalize_padded(utterance);

    let signals = QualitySignals {
        has_quantification: has_numeric_token(utterance)
            || contains_any_term(&padded, &vocab.quantification),
        has_specific_role: contains_any_term(&padded, &vocab.roles),
        has_timeframe: DURATION_RE.is_match(utterance)
            || YEAR_RE.is_match(utterance)
            || contains_any_term(&padded, &vocab.timeframe),
        has_business_impact: contains_any_term(&padded, &vocab.business_impact),
    };

    let weights = settings.quality.weights_for(phase);
    let earned = [
        (signals.has_quantification, weights.quantification),
        (signals.has_specific_role, weights.specific_role),
        (signals.has_timeframe, weights.timeframe),
        (signals.has_business_impact, weights.business_impact),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, w)| w)
    .sum::<f64>();

    let total = weights.total();
    let score = if total > 0.0 {
        ((earned / total) * 100.0).round().clamp(0.0, 100.0) as u8
    } else {
        0
    };

    Ok(QualityAnalysis {
        score,
        signals,
        phase,
    })
}

/// Percentages, currency amounts, `~N` estimates and `Nx` multipliers all carry a digit.
fn has_numeric_token(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}
