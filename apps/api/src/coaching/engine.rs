//! Coaching Engine: runs the per-utterance pipeline and owns session
//! concurrency.
//!
//! Every mutating operation holds the session's lock for the whole
//! load → analyze → extract → transition → save cycle, so operations on one
//! session are strictly serialized while different sessions run in parallel.
//! A failed save discards the mutated copy; nothing partial is ever committed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::coaching::export::render_session_to_md;
use crate::coaching::extractor::AchievementExtractor;
use crate::coaching::phase::{self, PhaseDecision};
use crate::coaching::prompts::phase_opening;
use crate::coaching::quality::{self, QualityError};
use crate::coaching::roles::JobRole;
use crate::coaching::settings::CoachingSettings;
use crate::coaching::store::{PersistencePolicy, ResilientStore, SessionStore};
use crate::coaching::strategist::{self, FollowUpKind};
use crate::coaching::synthesizer::{self, SynthesisError};
use crate::errors::CoachError;
use crate::models::session::{
    ExtractedFact, FactField, Phase, PhaseTransition, QualitySignals, Session, SessionStatus,
    SummaryBullet,
};

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub role: JobRole,
    pub phase: Phase,
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub session_id: Uuid,
    pub turn_sequence: u32,
    pub truncated: bool,
    pub quality_score: u8,
    pub signals: QualitySignals,
    pub threshold_met: bool,
    pub phase: Phase,
    pub follow_up: FollowUpKind,
    pub next_prompt: String,
    pub facts_extracted: Vec<ExtractedFact>,
}

/// Read-only snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub role: JobRole,
    pub phase: Phase,
    pub status: SessionStatus,
    pub fact_summary: BTreeMap<FactField, ExtractedFact>,
    pub turn_count: u32,
    pub cumulative_quality: f64,
    pub low_confidence_phases: BTreeSet<Phase>,
    pub transitions: Vec<PhaseTransition>,
    pub summary: Option<Vec<SummaryBullet>>,
}

impl From<&Session> for SessionState {
    fn from(s: &Session) -> Self {
        Self {
            session_id: s.session_id,
            role: s.role,
            phase: s.phase,
            status: s.status,
            fact_summary: s.facts.clone(),
            turn_count: s.turn_count(),
            cumulative_quality: s.cumulative_quality,
            low_confidence_phases: s.low_confidence_phases.clone(),
            transitions: s.transitions.clone(),
            summary: s.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub session_id: Uuid,
    pub from: Phase,
    pub phase: Phase,
    pub prompt: String,
}

/// Per-session async locks. Entries are dropped once nobody holds or waits
/// on them, so the map only grows with concurrently active sessions.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>,
}

struct SessionGuard<'a> {
    registry: &'a SessionLocks,
    session_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLocks {
    async fn acquire(&self, session_id: Uuid) -> SessionGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.entry(session_id).or_default().clone()
        };
        SessionGuard {
            registry: self,
            session_id,
            _guard: lock.lock_owned().await,
        }
    }

    fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        let mut map = self
            .registry
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one in this guard: no waiters remain.
        if map
            .get(&self.session_id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            map.remove(&self.session_id);
        }
    }
}

pub struct CoachingEngine {
    settings: Arc<CoachingSettings>,
    extractor: AchievementExtractor,
    store: ResilientStore,
    locks: SessionLocks,
}

impl CoachingEngine {
    pub fn new(
        settings: CoachingSettings,
        store: Arc<dyn SessionStore>,
        policy: PersistencePolicy,
    ) -> Result<Self> {
        let extractor = AchievementExtractor::new(&settings.vocabulary)?;
        Ok(Self {
            settings: Arc::new(settings),
            extractor,
            store: ResilientStore::new(store, policy),
            locks: SessionLocks::default(),
        })
    }

    pub fn settings(&self) -> &CoachingSettings {
        &self.settings
    }

    /// Number of sessions with a lock currently held or awaited.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    pub async fn start_session(
        &self,
        declared_role: Option<&str>,
    ) -> Result<SessionStarted, CoachError> {
        let role = declared_role.map(JobRole::from_declared).unwrap_or_default();
        let session = Session::new(role);
        self.persist(&session).await?;
        info!("Started coaching session {} (role: {role})", session.session_id);

        Ok(SessionStarted {
            session_id: session.session_id,
            role,
            phase: session.phase,
            prompt: phase_opening(session.phase).to_string(),
        })
    }

    /// Records one utterance and returns the next coaching prompt.
    pub async fn submit_turn(
        &self,
        session_id: Uuid,
        utterance: &str,
    ) -> Result<TurnOutcome, CoachError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_active(session_id).await?;

        // Everything downstream sees only the text the turn keeps.
        let (stored, truncated) =
            Session::truncate_utterance(utterance, self.settings.max_utterance_chars);
        let analysis = quality::analyze(&stored, session.phase, &self.settings).map_err(
            |QualityError::EmptyResponse| CoachError::EmptyResponse {
                session_id,
                phase: session.phase,
            },
        )?;

        let captured_in = session.phase;
        let facts_extracted = self
            .extractor
            .extract(&stored, captured_in, session.next_sequence());
        let turn_sequence = session
            .record_turn(stored, truncated, analysis.score, analysis.signals)
            .sequence;
        if truncated {
            warn!(
                "Session {session_id}: turn {turn_sequence} truncated to {} chars",
                self.settings.max_utterance_chars
            );
        }

        let replaced = facts_extracted
            .iter()
            .filter(|f| session.upsert_fact((*f).clone()))
            .count();
        debug!(
            "Session {session_id}: turn {turn_sequence} scored {} in {captured_in}, {} facts extracted ({replaced} kept)",
            analysis.score,
            facts_extracted.len()
        );

        let decision = phase::evaluate(&session, &self.settings.phases);
        phase::apply(&mut session, decision);
        match decision {
            PhaseDecision::Advance { to } => {
                info!("Session {session_id}: {captured_in} -> {to} after turn {turn_sequence}")
            }
            PhaseDecision::ForceAdvance { to } => warn!(
                "Session {session_id}: force-advanced {captured_in} -> {to} after {} turns without meeting the gate",
                self.settings.phases.max_turns_per_phase
            ),
            PhaseDecision::Stay { .. } => {}
        }

        let follow_up = strategist::next_prompt(&session, &decision, &self.settings);
        if follow_up.kind == FollowUpKind::RoleElaboration {
            session.elaborations_asked += 1;
        }

        self.persist(&session).await?;

        Ok(TurnOutcome {
            session_id,
            turn_sequence,
            truncated,
            quality_score: analysis.score,
            signals: analysis.signals,
            threshold_met: decision.threshold_met(),
            phase: session.phase,
            follow_up: follow_up.kind,
            next_prompt: follow_up.prompt,
            facts_extracted,
        })
    }

    /// Consistent snapshot of the last committed state. Does not take the
    /// session lock.
    pub async fn get_session_state(&self, session_id: Uuid) -> Result<SessionState, CoachError> {
        let session = self.load(session_id).await?;
        Ok(SessionState::from(&session))
    }

    /// Produces the summary bullets. The first success completes the session;
    /// asking again returns the same bullets.
    pub async fn synthesize(&self, session_id: Uuid) -> Result<Vec<SummaryBullet>, CoachError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load(session_id).await?;

        if session.status == SessionStatus::Abandoned {
            return Err(terminated(&session));
        }
        if session.phase != Phase::Synthesis {
            return Err(CoachError::InvalidPhase {
                session_id,
                phase: session.phase,
                required: Phase::Synthesis,
            });
        }

        let bullets = synthesizer::synthesize(&session.fact_log).map_err(
            |SynthesisError::InsufficientData| CoachError::InsufficientData {
                session_id,
                phase: session.phase,
            },
        )?;

        if session.status == SessionStatus::Completed {
            return Ok(bullets);
        }

        session.summary = Some(bullets.clone());
        session.status = SessionStatus::Completed;
        session.updated_at = chrono::Utc::now();
        self.persist(&session).await?;
        info!(
            "Session {session_id} completed with {} summary bullets",
            bullets.len()
        );
        Ok(bullets)
    }

    /// Caller-driven move to the next phase.
    pub async fn request_transition(
        &self,
        session_id: Uuid,
        target: Phase,
    ) -> Result<TransitionOutcome, CoachError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_active(session_id).await?;

        let from = session.phase;
        phase::request_transition(&mut session, target).map_err(|e| {
            CoachError::InvalidTransition {
                session_id,
                phase: e.from,
                target: e.to,
            }
        })?;
        self.persist(&session).await?;
        info!("Session {session_id}: {from} -> {target} on request");

        Ok(TransitionOutcome {
            session_id,
            from,
            phase: session.phase,
            prompt: phase_opening(session.phase).to_string(),
        })
    }

    pub async fn abandon_session(&self, session_id: Uuid) -> Result<SessionState, CoachError> {
        let _guard = self.locks.acquire(session_id).await;
        let mut session = self.load_active(session_id).await?;

        session.status = SessionStatus::Abandoned;
        session.updated_at = chrono::Utc::now();
        self.persist(&session).await?;
        info!("Session {session_id} abandoned in {}", session.phase);
        Ok(SessionState::from(&session))
    }

    pub async fn export_markdown(&self, session_id: Uuid) -> Result<String, CoachError> {
        let session = self.load(session_id).await?;
        Ok(render_session_to_md(&session))
    }

    async fn load(&self, session_id: Uuid) -> Result<Session, CoachError> {
        self.store
            .load(session_id)
            .await
            .map_err(|source| {
                error!("Session {session_id}: load failed: {source:#}");
                CoachError::PersistenceUnavailable {
                    session_id,
                    phase: None,
                    source,
                }
            })?
            .ok_or(CoachError::SessionNotFound { session_id })
    }

    async fn load_active(&self, session_id: Uuid) -> Result<Session, CoachError> {
        let session = self.load(session_id).await?;
        if session.is_terminated() {
            return Err(terminated(&session));
        }
        Ok(session)
    }

    async fn persist(&self, session: &Session) -> Result<(), CoachError> {
        self.store.save(session).await.map_err(|source| {
            error!("Session {}: save failed: {source:#}", session.session_id);
            CoachError::PersistenceUnavailable {
                session_id: session.session_id,
                phase: Some(session.phase),
                source,
            }
        })
    }
}

fn terminated(session: &Session) -> CoachError {
    CoachError::SessionTerminated {
        session_id: session.session_id,
        phase: session.phase,
        status: session.status,
    }
}
