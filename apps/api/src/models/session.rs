use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::coaching::roles::JobRole;

/// Stage of a guided coaching conversation. Ordering follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Introduction,
    StoryDiscovery,
    AchievementMining,
    Synthesis,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::Introduction,
        Phase::StoryDiscovery,
        Phase::AchievementMining,
        Phase::Synthesis,
    ];

    /// The phase that follows this one, or `None` for the terminal phase.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Introduction => Some(Phase::StoryDiscovery),
            Phase::StoryDiscovery => Some(Phase::AchievementMining),
            Phase::AchievementMining => Some(Phase::Synthesis),
            Phase::Synthesis => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Introduction => "INTRODUCTION",
            Phase::StoryDiscovery => "STORY_DISCOVERY",
            Phase::AchievementMining => "ACHIEVEMENT_MINING",
            Phase::Synthesis => "SYNTHESIS",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CAR/REST field names. Declaration order is the stable display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactField {
    Context,
    Action,
    Result,
    Efficiency,
    Scope,
    Time,
}

impl FactField {
    pub const ALL: [FactField; 6] = [
        FactField::Context,
        FactField::Action,
        FactField::Result,
        FactField::Efficiency,
        FactField::Scope,
        FactField::Time,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FactField::Context => "context",
            FactField::Action => "action",
            FactField::Result => "result",
            FactField::Efficiency => "efficiency",
            FactField::Scope => "scope",
            FactField::Time => "time",
        }
    }
}

impl fmt::Display for FactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary signals detected in a single utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySignals {
    pub has_quantification: bool,
    pub has_specific_role: bool,
    pub has_timeframe: bool,
    pub has_business_impact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub sequence: u32,
    pub utterance: String,
    pub truncated: bool,
    pub quality_score: u8,
    pub signals: QualitySignals,
    pub phase: Phase,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub field: FactField,
    pub value: String,
    pub confidence: f64,
    /// Sequence number of the turn the fact was extracted from.
    pub source_turn: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBullet {
    pub position: u8,
    pub text: String,
    pub supporting_facts: BTreeSet<FactField>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    QualityGate,
    ForceAdvanced,
    Requested,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: Phase,
    pub to: Phase,
    /// Number of turns recorded when the transition happened.
    pub at_turn: u32,
    pub reason: TransitionReason,
}

/// One coaching dialogue. Persisted as a single document by the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub role: JobRole,
    pub phase: Phase,
    pub status: SessionStatus,
    pub turns: Vec<Turn>,
    pub facts: BTreeMap<FactField, ExtractedFact>,
    pub fact_log: Vec<ExtractedFact>,
    pub cumulative_quality: f64,
    pub low_confidence_phases: BTreeSet<Phase>,
    pub transitions: Vec<PhaseTransition>,
    pub elaborations_asked: u32,
    pub summary: Option<Vec<SummaryBullet>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(role: JobRole) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            role,
            phase: Phase::Introduction,
            status: SessionStatus::Active,
            turns: Vec::new(),
            facts: BTreeMap::new(),
            fact_log: Vec::new(),
            cumulative_quality: 0.0,
            low_confidence_phases: BTreeSet::new(),
            transitions: Vec::new(),
            elaborations_asked: 0,
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.status != SessionStatus::Active
    }

    pub fn turn_count(&self) -> u32 {
        self.turns.len() as u32
    }

    pub fn next_sequence(&self) -> u32 {
        self.turns.last().map(|t| t.sequence + 1).unwrap_or(1)
    }

    /// Turns captured while the session was in `phase`, oldest first.
    pub fn turns_in_phase(&self, phase: Phase) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(move |t| t.phase == phase)
    }

    /// Cuts an utterance to at most `max_chars` characters. The returned flag
    /// is set when anything was dropped.
    pub fn truncate_utterance(utterance: &str, max_chars: usize) -> (String, bool) {
        match utterance.char_indices().nth(max_chars) {
            Some((cut, _)) => (utterance[..cut].to_string(), true),
            None => (utterance.to_string(), false),
        }
    }

    /// Appends a turn holding `utterance` as stored. Updates the running
    /// quality mean.
    pub fn record_turn(
        &mut self,
        utterance: String,
        truncated: bool,
        quality_score: u8,
        signals: QualitySignals,
    ) -> &Turn {
        let turn = Turn {
            sequence: self.next_sequence(),
            utterance,
            truncated,
            quality_score,
            signals,
            phase: self.phase,
            captured_at: Utc::now(),
        };

        let n = self.turns.len() as f64;
        self.cumulative_quality = (self.cumulative_quality * n + quality_score as f64) / (n + 1.0);
        self.turns.push(turn);
        self.updated_at = Utc::now();
        &self.turns[self.turns.len() - 1]
    }

    /// Logs the fact and upserts it into the canonical table.
    /// An existing value is replaced only by a strictly more confident one.
    /// Returns `true` when the canonical table changed.
    pub fn upsert_fact(&mut self, fact: ExtractedFact) -> bool {
        self.fact_log.push(fact.clone());
        match self.facts.get(&fact.field) {
            Some(existing) if existing.confidence >= fact.confidence => false,
            _ => {
                self.facts.insert(fact.field, fact);
                true
            }
        }
    }

    /// Moves to `to` and records the reason. Callers guarantee `to == phase.next()`.
    pub fn enter_phase(&mut self, to: Phase, reason: TransitionReason) {
        let from = self.phase;
        if reason == TransitionReason::ForceAdvanced {
            self.low_confidence_phases.insert(from);
        }
        self.transitions.push(PhaseTransition {
            from,
            to,
            at_turn: self.turn_count(),
            reason,
        });
        self.phase = to;
        self.elaborations_asked = 0;
        self.updated_at = Utc::now();
    }
}

/// Row layout of the `coaching_sessions` table. `document` holds the serialized `Session`.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub phase: String,
    pub status: String,
    pub document: Value,
    pub updated_at: DateTime<Utc>,
}
