//! Resume Synthesizer: turns the fact ledger into at most five summary bullets.
//!
//! Facts extracted from the same turn describe one achievement, so bullets are
//! built per source turn. A turn that stated an outcome without saying what
//! the person did borrows the most recent earlier Action.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::coaching::text::capitalize;
use crate::models::session::{ExtractedFact, FactField, SummaryBullet};

pub const MAX_BULLETS: usize = 5;

const QUALIFIERS: [FactField; 3] = [FactField::Efficiency, FactField::Scope, FactField::Time];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("no Result fact has been extracted yet")]
    InsufficientData,
}

#[derive(Debug)]
struct AchievementGroup<'a> {
    turn: u32,
    result: &'a ExtractedFact,
    action: Option<&'a ExtractedFact>,
    qualifiers: Vec<&'a ExtractedFact>,
}

impl AchievementGroup<'_> {
    fn mean_confidence(&self) -> f64 {
        let confidences: Vec<f64> = std::iter::once(self.result)
            .chain(self.action)
            .chain(self.qualifiers.iter().copied())
            .map(|f| f.confidence)
            .collect();
        confidences.iter().sum::<f64>() / confidences.len() as f64
    }

    fn render(&self, position: u8) -> SummaryBullet {
        let mut text = match self.action {
            Some(action) => format!("{} resulting in {}", action.value, self.result.value),
            None => self.result.value.clone(),
        };

        let lowered = text.to_lowercase();
        let shown: Vec<&str> = self
            .qualifiers
            .iter()
            .map(|q| q.value.as_str())
            .filter(|v| !lowered.contains(&v.to_lowercase()))
            .collect();
        if !shown.is_empty() {
            text.push_str(&format!(" ({})", shown.join(", ")));
        }

        let mut supporting_facts = BTreeSet::from([FactField::Result]);
        if self.action.is_some() {
            supporting_facts.insert(FactField::Action);
        }
        supporting_facts.extend(self.qualifiers.iter().map(|q| q.field));

        SummaryBullet {
            position,
            text: capitalize(&text),
            supporting_facts,
        }
    }
}

/// Builds the bullet set from the append-only fact ledger.
///
/// Deterministic: the same ledger always yields the same bullets in the same
/// order. Fewer than five bullets are returned rather than padding.
pub fn synthesize(fact_log: &[ExtractedFact]) -> Result<Vec<SummaryBullet>, SynthesisError> {
    if !fact_log.iter().any(|f| f.field == FactField::Result) {
        return Err(SynthesisError::InsufficientData);
    }

    // Strongest fact per (turn, field). Ties keep the first logged.
    let mut by_turn: BTreeMap<u32, BTreeMap<FactField, &ExtractedFact>> = BTreeMap::new();
    for fact in fact_log {
        let fields = by_turn.entry(fact.source_turn).or_default();
        match fields.get(&fact.field) {
            Some(existing) if existing.confidence >= fact.confidence => {}
            _ => {
                fields.insert(fact.field, fact);
            }
        }
    }

    let mut groups: Vec<AchievementGroup> = Vec::new();
    let mut last_action: Option<&ExtractedFact> = None;
    for (turn, fields) in &by_turn {
        let own_action = fields.get(&FactField::Action).copied();
        if let Some(result) = fields.get(&FactField::Result).copied() {
            groups.push(AchievementGroup {
                turn: *turn,
                result,
                action: own_action.or(last_action),
                qualifiers: QUALIFIERS
                    .iter()
                    .filter_map(|q| fields.get(q).copied())
                    .collect(),
            });
        }
        if own_action.is_some() {
            last_action = own_action;
        }
    }

    let mut groups = dedup_results(groups);
    groups.sort_by(|a, b| {
        b.result
            .confidence
            .partial_cmp(&a.result.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.mean_confidence()
                    .partial_cmp(&a.mean_confidence())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.turn.cmp(&b.turn))
    });
    groups.truncate(MAX_BULLETS);

    Ok(groups
        .iter()
        .enumerate()
        .map(|(i, g)| g.render(i as u8 + 1))
        .collect())
}

/// Collapses groups whose Result text matches case-insensitively, keeping the
/// more confident one (the earlier turn on ties).
fn dedup_results(groups: Vec<AchievementGroup<'_>>) -> Vec<AchievementGroup<'_>> {
    let mut kept: Vec<AchievementGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        let key = group.result.value.trim().to_lowercase();
        match kept
            .iter()
            .position(|k| k.result.value.trim().to_lowercase() == key)
        {
            Some(i) if group.result.confidence > kept[i].result.confidence => kept[i] = group,
            Some(_) => {}
            None => kept.push(group),
        }
    }
    kept
}
