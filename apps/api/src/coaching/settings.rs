//! Coaching configuration: phase gates, quality weights, vocabularies and the
//! role question tables. Loaded from TOML; the default file is embedded.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::coaching::roles::JobRole;
use crate::coaching::text::normalize_term;
use crate::models::session::Phase;

const DEFAULT_SETTINGS: &str = include_str!("../../config/coaching.toml");

fn default_max_utterance_chars() -> usize {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoachingSettings {
    #[serde(default = "default_max_utterance_chars")]
    pub max_utterance_chars: usize,
    pub phases: PhaseSettings,
    #[serde(default)]
    pub quality: QualitySettings,
    pub vocabulary: Vocabulary,
    pub roles: RoleQuestionTables,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhaseSettings {
    pub window: usize,
    pub max_turns_per_phase: usize,
    pub thresholds: PhaseThresholds,
}

/// Minimum window mean (0–100) required to leave each non-terminal phase.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaseThresholds {
    pub introduction: u8,
    pub story_discovery: u8,
    pub achievement_mining: u8,
}

impl PhaseThresholds {
    /// `None` for the terminal phase.
    pub fn for_phase(&self, phase: Phase) -> Option<u8> {
        match phase {
            Phase::Introduction => Some(self.introduction),
            Phase::StoryDiscovery => Some(self.story_discovery),
            Phase::AchievementMining => Some(self.achievement_mining),
            Phase::Synthesis => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityWeights {
    pub quantification: f64,
    pub specific_role: f64,
    pub timeframe: f64,
    pub business_impact: f64,
}

impl QualityWeights {
    pub fn total(&self) -> f64 {
        self.quantification + self.specific_role + self.timeframe + self.business_impact
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            quantification: 30.0,
            specific_role: 20.0,
            timeframe: 15.0,
            business_impact: 35.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhaseWeightOverrides {
    pub introduction: Option<QualityWeights>,
    pub story_discovery: Option<QualityWeights>,
    pub achievement_mining: Option<QualityWeights>,
    pub synthesis: Option<QualityWeights>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QualitySettings {
    #[serde(default)]
    pub weights: QualityWeights,
    #[serde(default)]
    pub phase_weights: PhaseWeightOverrides,
}

impl QualitySettings {
    pub fn weights_for(&self, phase: Phase) -> QualityWeights {
        let override_for_phase = match phase {
            Phase::Introduction => self.phase_weights.introduction,
            Phase::StoryDiscovery => self.phase_weights.story_discovery,
            Phase::AchievementMining => self.phase_weights.achievement_mining,
            Phase::Synthesis => self.phase_weights.synthesis,
        };
        override_for_phase.unwrap_or(self.weights)
    }
}

/// Term lists used by the analyzer and the extractor. Normalized on load.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Vocabulary {
    #[serde(default)]
    pub quantification: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub timeframe: Vec<String>,
    #[serde(default)]
    pub business_impact: Vec<String>,
    #[serde(default)]
    pub action_verbs: Vec<String>,
    #[serde(default)]
    pub result_verbs: Vec<String>,
    #[serde(default)]
    pub context_markers: Vec<String>,
    #[serde(default)]
    pub scope_units: Vec<String>,
}

impl Vocabulary {
    fn normalize(&mut self) {
        for list in [
            &mut self.quantification,
            &mut self.roles,
            &mut self.timeframe,
            &mut self.business_impact,
            &mut self.action_verbs,
            &mut self.result_verbs,
            &mut self.context_markers,
            &mut self.scope_units,
        ] {
            let mut normalized: Vec<String> = list
                .iter()
                .map(|t| normalize_term(t))
                .filter(|t| !t.is_empty())
                .collect();
            normalized.sort();
            normalized.dedup();
            *list = normalized;
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleQuestions {
    #[serde(default)]
    pub introduction: Vec<String>,
    #[serde(default)]
    pub story_discovery: Vec<String>,
    #[serde(default)]
    pub achievement_mining: Vec<String>,
    #[serde(default)]
    pub synthesis: Vec<String>,
}

impl RoleQuestions {
    pub fn for_phase(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Introduction => &self.introduction,
            Phase::StoryDiscovery => &self.story_discovery,
            Phase::AchievementMining => &self.achievement_mining,
            Phase::Synthesis => &self.synthesis,
        }
    }
}

/// Elaboration questions per supported role. Keys outside `JobRole` are rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "BTreeMap<String, RoleQuestions>")]
pub struct RoleQuestionTables {
    tables: HashMap<JobRole, RoleQuestions>,
}

impl TryFrom<BTreeMap<String, RoleQuestions>> for RoleQuestionTables {
    type Error = String;

    fn try_from(raw: BTreeMap<String, RoleQuestions>) -> Result<Self, Self::Error> {
        let mut tables = HashMap::with_capacity(raw.len());
        for (key, questions) in raw {
            let role: JobRole = key.parse().map_err(|e| format!("roles.{key}: {e}"))?;
            tables.insert(role, questions);
        }
        Ok(Self { tables })
    }
}

impl RoleQuestionTables {
    /// Questions for `role` in `phase`, falling back to the generic table when
    /// the role has none.
    pub fn questions(&self, role: JobRole, phase: Phase) -> &[String] {
        let own = self
            .tables
            .get(&role)
            .map(|q| q.for_phase(phase))
            .unwrap_or(&[]);
        if !own.is_empty() {
            return own;
        }
        self.tables
            .get(&JobRole::Generic)
            .map(|q| q.for_phase(phase))
            .unwrap_or(&[])
    }

    pub fn has_role(&self, role: JobRole) -> bool {
        self.tables.contains_key(&role)
    }
}

impl CoachingSettings {
    /// The configuration shipped with the service.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(DEFAULT_SETTINGS).context("Embedded coaching.toml is invalid")
    }

    /// Loads settings from `path`, or the embedded defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read coaching config '{}'", path.display())
                })?;
                let settings = Self::from_toml_str(&raw)
                    .with_context(|| format!("Invalid coaching config '{}'", path.display()))?;
                info!("Loaded coaching config from {}", path.display());
                Ok(settings)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut settings: CoachingSettings = toml::from_str(raw)?;
        settings.vocabulary.normalize();
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_utterance_chars == 0 {
            bail!("max_utterance_chars must be positive");
        }
        if self.phases.window == 0 {
            bail!("phases.window must be at least 1");
        }
        if self.phases.max_turns_per_phase < self.phases.window {
            bail!(
                "phases.max_turns_per_phase ({}) must be >= phases.window ({})",
                self.phases.max_turns_per_phase,
                self.phases.window
            );
        }
        for phase in Phase::ALL {
            if let Some(t) = self.phases.thresholds.for_phase(phase) {
                if t > 100 {
                    bail!("threshold for {phase} must be within 0-100, got {t}");
                }
            }
            let w = self.quality.weights_for(phase);
            let parts = [w.quantification, w.specific_role, w.timeframe, w.business_impact];
            if parts.iter().any(|p| *p < 0.0 || !p.is_finite()) {
                bail!("quality weights for {phase} must be finite and non-negative");
            }
            if w.total() <= 0.0 {
                bail!("quality weights for {phase} must not all be zero");
            }
        }
        if !self.roles.has_role(JobRole::Generic) {
            bail!("roles.generic question table is required");
        }
        for phase in Phase::ALL {
            if self.roles.questions(JobRole::Generic, phase).is_empty() {
                bail!("roles.generic needs at least one question for {phase}");
            }
        }
        Ok(())
    }
}
