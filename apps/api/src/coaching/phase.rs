//! Phase State Machine.
//!
//! INTRODUCTION → STORY_DISCOVERY → ACHIEVEMENT_MINING → SYNTHESIS (terminal).
//! A phase is left when the mean quality of its last `window` turns strictly
//! exceeds the phase threshold, or forcibly once `max_turns_per_phase` turns
//! have been spent in it. States are never skipped and never revisited.

use serde::Serialize;
use thiserror::Error;

use crate::coaching::settings::PhaseSettings;
use crate::models::session::{FactField, Phase, Session, TransitionReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PhaseDecision {
    Stay { threshold_met: bool },
    Advance { to: Phase },
    ForceAdvance { to: Phase },
}

impl PhaseDecision {
    /// Whether the quality gate of the phase the turn was captured in was met.
    pub fn threshold_met(&self) -> bool {
        match self {
            PhaseDecision::Stay { threshold_met } => *threshold_met,
            PhaseDecision::Advance { .. } => true,
            PhaseDecision::ForceAdvance { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid phase transition {from} -> {to}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

/// Mean score of the last `window` turns captured in `phase`, or `None`
/// while fewer than `window` turns exist in it.
pub fn window_mean(session: &Session, phase: Phase, window: usize) -> Option<f64> {
    let scores: Vec<u8> = session.turns_in_phase(phase).map(|t| t.quality_score).collect();
    if window == 0 || scores.len() < window {
        return None;
    }
    let recent = &scores[scores.len() - window..];
    Some(recent.iter().map(|s| *s as f64).sum::<f64>() / window as f64)
}

/// Decides whether the session leaves its current phase after the latest turn.
///
/// In SYNTHESIS there is nothing to leave; the gate there is having at least
/// one Result fact to synthesize from.
pub fn evaluate(session: &Session, settings: &PhaseSettings) -> PhaseDecision {
    let phase = session.phase;
    let (Some(threshold), Some(next)) = (settings.thresholds.for_phase(phase), phase.next()) else {
        return PhaseDecision::Stay {
            threshold_met: session.facts.contains_key(&FactField::Result),
        };
    };

    let threshold_met = window_mean(session, phase, settings.window)
        .map(|mean| mean > threshold as f64)
        .unwrap_or(false);
    if threshold_met {
        return PhaseDecision::Advance { to: next };
    }

    let turns_in_phase = session.turns_in_phase(phase).count();
    if turns_in_phase >= settings.max_turns_per_phase {
        return PhaseDecision::ForceAdvance { to: next };
    }

    PhaseDecision::Stay {
        threshold_met: false,
    }
}

/// Applies a decision produced by `evaluate` to the session.
pub fn apply(session: &mut Session, decision: PhaseDecision) {
    match decision {
        PhaseDecision::Stay { .. } => {}
        PhaseDecision::Advance { to } => session.enter_phase(to, TransitionReason::QualityGate),
        PhaseDecision::ForceAdvance { to } => {
            session.enter_phase(to, TransitionReason::ForceAdvanced)
        }
    }
}

/// Caller-requested transition. Only the immediately following phase is a
/// valid target: retreats, no-ops, skips and anything past SYNTHESIS fail.
pub fn request_transition(session: &mut Session, target: Phase) -> Result<(), TransitionError> {
    let from = session.phase;
    match from.next() {
        Some(next) if next == target => {
            session.enter_phase(target, TransitionReason::Requested);
            Ok(())
        }
        _ => Err(TransitionError { from, to: target }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::roles::JobRole;
    use crate::coaching::settings::CoachingSettings;
    use crate::models::session::QualitySignals;

    fn settings() -> PhaseSettings {
        CoachingSettings::builtin().unwrap().phases
    }

    fn push(session: &mut Session, score: u8) -> PhaseDecision {
        session.record_turn("answer".to_string(), false, score, QualitySignals::default());
        let decision = evaluate(session, &settings());
        apply(session, decision);
        decision
    }

    #[test]
    fn test_window_must_be_full_before_advancing() {
        let mut s = Session::new(JobRole::Generic);
        assert_eq!(push(&mut s, 100), PhaseDecision::Stay { threshold_met: false });
        assert_eq!(push(&mut s, 100), PhaseDecision::Stay { threshold_met: false });
        assert_eq!(
            push(&mut s, 100),
            PhaseDecision::Advance {
                to: Phase::StoryDiscovery
            }
        );
        assert_eq!(s.phase, Phase::StoryDiscovery);
        assert!(s.low_confidence_phases.is_empty());
    }

    #[test]
    fn test_threshold_must_be_strictly_exceeded() {
        let mut s = Session::new(JobRole::Generic);
        for _ in 0..3 {
            push(&mut s, 60);
        }
        assert_eq!(s.phase, Phase::Introduction);
        push(&mut s, 63);
        // last three: 60, 60, 63 → 61.0 > 60
        assert_eq!(s.phase, Phase::StoryDiscovery);
    }

    #[test]
    fn test_window_only_counts_current_phase() {
        let mut s = Session::new(JobRole::Generic);
        for _ in 0..3 {
            push(&mut s, 100);
        }
        assert_eq!(s.phase, Phase::StoryDiscovery);
        // Introduction turns do not carry over into the next phase's window.
        assert_eq!(push(&mut s, 100), PhaseDecision::Stay { threshold_met: false });
        assert_eq!(s.phase, Phase::StoryDiscovery);
    }

    #[test]
    fn test_eight_low_quality_turns_force_advance() {
        let mut s = Session::new(JobRole::Generic);
        for i in 1..=7 {
            assert_eq!(push(&mut s, 10), PhaseDecision::Stay { threshold_met: false }, "turn {i}");
        }
        assert_eq!(
            push(&mut s, 10),
            PhaseDecision::ForceAdvance {
                to: Phase::StoryDiscovery
            }
        );
        assert_eq!(s.phase, Phase::StoryDiscovery);
        assert!(s.low_confidence_phases.contains(&Phase::Introduction));
        assert_eq!(s.transitions[0].reason, TransitionReason::ForceAdvanced);
    }

    #[test]
    fn test_never_skips_and_is_monotonic() {
        let mut s = Session::new(JobRole::Generic);
        let mut last = s.phase;
        for _ in 0..40 {
            let before = s.phase;
            push(&mut s, 100);
            assert!(s.phase >= last);
            if s.phase != before {
                assert_eq!(before.next(), Some(s.phase));
            }
            last = s.phase;
        }
        assert_eq!(s.phase, Phase::Synthesis);
    }

    #[test]
    fn test_synthesis_gate_is_result_fact() {
        let mut s = Session::new(JobRole::Generic);
        s.phase = Phase::Synthesis;
        assert_eq!(evaluate(&s, &settings()), PhaseDecision::Stay { threshold_met: false });
        s.upsert_fact(crate::models::session::ExtractedFact {
            field: FactField::Result,
            value: "cut costs by 10%".to_string(),
            confidence: 0.9,
            source_turn: 1,
        });
        assert_eq!(evaluate(&s, &settings()), PhaseDecision::Stay { threshold_met: true });
    }

    #[test]
    fn test_request_transition_rules() {
        let mut s = Session::new(JobRole::Generic);
        // skip
        assert!(request_transition(&mut s, Phase::AchievementMining).is_err());
        // no-op
        assert!(request_transition(&mut s, Phase::Introduction).is_err());
        assert!(request_transition(&mut s, Phase::StoryDiscovery).is_ok());
        // retreat
        let err = request_transition(&mut s, Phase::Introduction).unwrap_err();
        assert_eq!(err.from, Phase::StoryDiscovery);
        assert_eq!(err.to, Phase::Introduction);
        assert!(request_transition(&mut s, Phase::AchievementMining).is_ok());
        assert!(request_transition(&mut s, Phase::Synthesis).is_ok());
        // past the terminal phase
        assert!(request_transition(&mut s, Phase::Synthesis).is_err());
        assert_eq!(s.transitions.last().unwrap().reason, TransitionReason::Requested);
    }
}
