use crate::models::session::{FactField, Phase};

/// Prompt shown when a session enters `phase`.
pub fn phase_opening(phase: Phase) -> &'static str {
    match phase {
        Phase::Introduction => {
            "Let's start with you. What is your current role, and what does a typical week look like?"
        }
        Phase::StoryDiscovery => {
            "Now pick one piece of work you are proud of. Walk me through the situation and what you did."
        }
        Phase::AchievementMining => {
            "Let's put numbers on it. What changed because of your work, by how much, and over what period?"
        }
        Phase::Synthesis => {
            "I have enough to draft your summary. Add anything you want included, or ask me to synthesize it."
        }
    }
}

pub fn transition_acknowledgment(to: Phase) -> &'static str {
    match to {
        Phase::Introduction => "",
        Phase::StoryDiscovery => "Thanks, that gives me a clear picture of your background.",
        Phase::AchievementMining => "Great story.",
        Phase::Synthesis => "That is exactly the kind of detail recruiters look for.",
    }
}

/// Targeted question for a CAR/REST field that is still missing.
pub fn field_probe(field: FactField) -> &'static str {
    match field {
        FactField::Context => "What was the situation or challenge when you started?",
        FactField::Action => "What did you personally do? Which steps did you take yourself?",
        FactField::Result => "What was the outcome? Can you put a number on it?",
        FactField::Efficiency => "By what percentage or factor did things improve?",
        FactField::Scope => {
            "How large was the scope? Think team size, number of users, or budget."
        }
        FactField::Time => "How long did that take, or over what period did the results show?",
    }
}
