use crate::models::session::{FactField, Session};

/// Renders a session as a human-readable markdown snapshot: captured facts,
/// phase history and, once synthesized, the summary bullets.
pub fn render_session_to_md(session: &Session) -> String {
    let mut md = format!("# Coaching Session {}\n\n", session.session_id);
    md.push_str(&format!("- **Role:** {}\n", session.role));
    md.push_str(&format!("- **Phase:** {}\n", session.phase));
    md.push_str(&format!("- **Status:** {}\n", session.status));
    md.push_str(&format!("- **Turns:** {}\n", session.turn_count()));
    md.push_str(&format!(
        "- **Average quality:** {:.1}\n",
        session.cumulative_quality
    ));
    if !session.low_confidence_phases.is_empty() {
        let phases: Vec<&str> = session
            .low_confidence_phases
            .iter()
            .map(|p| p.as_str())
            .collect();
        md.push_str(&format!("- **Low confidence:** {}\n", phases.join(", ")));
    }
    md.push('\n');

    if !session.facts.is_empty() {
        md.push_str("## Achievement Facts\n\n");
        for field in FactField::ALL {
            let Some(fact) = session.facts.get(&field) else {
                continue;
            };
            md.push_str(&format!(
                "- **{}:** {} _(confidence {:.2}, turn {})_\n",
                title_case(field.as_str()),
                fact.value,
                fact.confidence,
                fact.source_turn
            ));
        }
        md.push('\n');
    }

    if !session.transitions.is_empty() {
        md.push_str("## Phase History\n\n");
        for t in &session.transitions {
            md.push_str(&format!(
                "- {} → {} after turn {} ({:?})\n",
                t.from, t.to, t.at_turn, t.reason
            ));
        }
        md.push('\n');
    }

    if let Some(summary) = &session.summary {
        md.push_str("## Summary\n\n");
        for bullet in summary {
            md.push_str(&format!("{}. {}\n", bullet.position, bullet.text));
        }
        md.push('\n');
    }
    md
}

fn title_case(s: &str) -> String {
    s.split('_')
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().to_string() + c.as_str(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coaching::roles::JobRole;
    use crate::models::session::{ExtractedFact, Phase, SummaryBullet, TransitionReason};
    use std::collections::BTreeSet;

    #[test]
    fn test_render_includes_facts_in_field_order() {
        let mut s = Session::new(JobRole::SoftwareEngineer);
        s.upsert_fact(ExtractedFact {
            field: FactField::Time,
            value: "3 months".into(),
            confidence: 0.85,
            source_turn: 1,
        });
        s.upsert_fact(ExtractedFact {
            field: FactField::Action,
            value: "led a team of 5 engineers".into(),
            confidence: 0.75,
            source_turn: 1,
        });
        let md = render_session_to_md(&s);
        assert!(md.starts_with(&format!("# Coaching Session {}", s.session_id)));
        assert!(md.contains("- **Role:** software_engineer"));
        let action = md.find("**Action:**").unwrap();
        let time = md.find("**Time:**").unwrap();
        assert!(action < time);
        assert!(!md.contains("## Summary"));
    }

    #[test]
    fn test_render_summary_and_history() {
        let mut s = Session::new(JobRole::Generic);
        s.enter_phase(Phase::StoryDiscovery, TransitionReason::ForceAdvanced);
        s.summary = Some(vec![SummaryBullet {
            position: 1,
            text: "Cut churn by 12%".into(),
            supporting_facts: BTreeSet::from([FactField::Result]),
        }]);
        let md = render_session_to_md(&s);
        assert!(md.contains("- **Low confidence:** INTRODUCTION"));
        assert!(md.contains("INTRODUCTION → STORY_DISCOVERY after turn 0 (ForceAdvanced)"));
        assert!(md.contains("## Summary\n\n1. Cut churn by 12%\n"));
    }
}
