//! Follow-up Strategist: picks the next coaching prompt after a turn.

use serde::Serialize;

use crate::coaching::phase::PhaseDecision;
use crate::coaching::prompts::{field_probe, phase_opening, transition_acknowledgment};
use crate::coaching::settings::CoachingSettings;
use crate::models::session::{FactField, Phase, Session};

/// Probe order when several required fields are missing.
const FIELD_PRIORITY: [FactField; 6] = [
    FactField::Result,
    FactField::Action,
    FactField::Context,
    FactField::Efficiency,
    FactField::Scope,
    FactField::Time,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum FollowUpKind {
    FieldProbe(FactField),
    RoleElaboration,
    PhaseTransition(Phase),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowUp {
    pub kind: FollowUpKind,
    pub prompt: String,
}

pub fn required_fields(phase: Phase) -> &'static [FactField] {
    match phase {
        Phase::Introduction => &[FactField::Context],
        Phase::StoryDiscovery => &[FactField::Context, FactField::Action, FactField::Result],
        Phase::AchievementMining => &FactField::ALL,
        Phase::Synthesis => &[FactField::Result],
    }
}

/// Highest-priority field the current phase requires that has no fact yet.
pub fn missing_field(session: &Session) -> Option<FactField> {
    let required = required_fields(session.phase);
    FIELD_PRIORITY
        .into_iter()
        .find(|f| required.contains(f) && !session.facts.contains_key(f))
}

/// Chooses the next prompt. `session` must already reflect `decision`.
///
/// A forced advance is announced like any other transition rather than
/// probed, since the gate for the phase that was left can no longer be met.
pub fn next_prompt(
    session: &Session,
    decision: &PhaseDecision,
    settings: &CoachingSettings,
) -> FollowUp {
    match decision {
        PhaseDecision::Stay { threshold_met } => {
            if !threshold_met {
                if let Some(field) = missing_field(session) {
                    return FollowUp {
                        kind: FollowUpKind::FieldProbe(field),
                        prompt: field_probe(field).to_string(),
                    };
                }
            }
            role_elaboration(session, settings)
        }
        PhaseDecision::Advance { to } | PhaseDecision::ForceAdvance { to } => FollowUp {
            kind: FollowUpKind::PhaseTransition(*to),
            prompt: format!("{} {}", transition_acknowledgment(*to), phase_opening(*to)),
        },
    }
}

fn role_elaboration(session: &Session, settings: &CoachingSettings) -> FollowUp {
    let questions = settings.roles.questions(session.role, session.phase);
    let prompt = if questions.is_empty() {
        phase_opening(session.phase).to_string()
    } else {
        questions[session.elaborations_asked as usize % questions.len()].clone()
    };
    FollowUp {
        kind: FollowUpKind::RoleElaboration,
        prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::roles::JobRole;
    use crate::models::session::{ExtractedFact, TransitionReason};

    fn settings() -> CoachingSettings {
        CoachingSettings::builtin().unwrap()
    }

    fn add(session: &mut Session, field: FactField) {
        session.upsert_fact(ExtractedFact {
            field,
            value: format!("{field} value"),
            confidence: 0.8,
            source_turn: 1,
        });
    }

    const UNMET: PhaseDecision = PhaseDecision::Stay {
        threshold_met: false,
    };

    #[test]
    fn test_probes_result_before_action_and_context() {
        let mut s = Session::new(JobRole::Generic);
        s.enter_phase(Phase::StoryDiscovery, TransitionReason::Requested);
        let f = next_prompt(&s, &UNMET, &settings());
        assert_eq!(f.kind, FollowUpKind::FieldProbe(FactField::Result));

        add(&mut s, FactField::Result);
        let f = next_prompt(&s, &UNMET, &settings());
        assert_eq!(f.kind, FollowUpKind::FieldProbe(FactField::Action));

        add(&mut s, FactField::Action);
        let f = next_prompt(&s, &UNMET, &settings());
        assert_eq!(f.kind, FollowUpKind::FieldProbe(FactField::Context));
        assert_eq!(f.prompt, field_probe(FactField::Context));
    }

    #[test]
    fn test_only_probes_fields_the_phase_requires() {
        let mut s = Session::new(JobRole::Generic);
        add(&mut s, FactField::Context);
        // Introduction only requires Context, so Result is not probed yet.
        let f = next_prompt(&s, &UNMET, &settings());
        assert_eq!(f.kind, FollowUpKind::RoleElaboration);
    }

    #[test]
    fn test_mining_probes_rest_fields_after_car() {
        let mut s = Session::new(JobRole::Generic);
        s.phase = Phase::AchievementMining;
        for f in [FactField::Context, FactField::Action, FactField::Result, FactField::Efficiency] {
            add(&mut s, f);
        }
        let f = next_prompt(&s, &UNMET, &settings());
        assert_eq!(f.kind, FollowUpKind::FieldProbe(FactField::Scope));
    }

    #[test]
    fn test_threshold_met_asks_role_question_rotated() {
        let mut s = Session::new(JobRole::SoftwareEngineer);
        s.phase = Phase::StoryDiscovery;
        let met = PhaseDecision::Stay { threshold_met: true };
        let table = settings();
        let expected = table.roles.questions(JobRole::SoftwareEngineer, Phase::StoryDiscovery);

        let first = next_prompt(&s, &met, &table);
        assert_eq!(first.kind, FollowUpKind::RoleElaboration);
        assert_eq!(first.prompt, expected[0]);

        s.elaborations_asked = 1;
        assert_eq!(next_prompt(&s, &met, &table).prompt, expected[1]);
        s.elaborations_asked = 2;
        assert_eq!(next_prompt(&s, &met, &table).prompt, expected[0]);
    }

    #[test]
    fn test_role_without_table_falls_back_to_generic() {
        let mut s = Session::new(JobRole::Sales);
        s.phase = Phase::Synthesis;
        add(&mut s, FactField::Result);
        let met = PhaseDecision::Stay { threshold_met: true };
        let table = settings();
        let f = next_prompt(&s, &met, &table);
        assert_eq!(f.prompt, table.roles.questions(JobRole::Generic, Phase::Synthesis)[0]);
    }

    #[test]
    fn test_advance_announces_new_phase() {
        let mut s = Session::new(JobRole::Generic);
        s.enter_phase(Phase::StoryDiscovery, TransitionReason::QualityGate);
        let decision = PhaseDecision::Advance {
            to: Phase::StoryDiscovery,
        };
        let f = next_prompt(&s, &decision, &settings());
        assert_eq!(f.kind, FollowUpKind::PhaseTransition(Phase::StoryDiscovery));
        assert!(f.prompt.ends_with(phase_opening(Phase::StoryDiscovery)));
        assert!(f.prompt.starts_with(transition_acknowledgment(Phase::StoryDiscovery)));
    }

    #[test]
    fn test_force_advance_is_announced_not_probed() {
        let mut s = Session::new(JobRole::Generic);
        s.enter_phase(Phase::StoryDiscovery, TransitionReason::ForceAdvanced);
        let decision = PhaseDecision::ForceAdvance {
            to: Phase::StoryDiscovery,
        };
        let f = next_prompt(&s, &decision, &settings());
        assert_eq!(f.kind, FollowUpKind::PhaseTransition(Phase::StoryDiscovery));
    }

    #[test]
    fn test_deterministic() {
        let s = Session::new(JobRole::DataScientist);
        let table = settings();
        assert_eq!(next_prompt(&s, &UNMET, &table), next_prompt(&s, &UNMET, &table));
    }
}
