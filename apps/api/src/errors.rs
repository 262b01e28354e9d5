use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::session::{Phase, SessionStatus};

/// Failures of coaching operations. Every variant names the session and,
/// when it is known, the phase the session was in.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Session {session_id} not found")]
    SessionNotFound { session_id: Uuid },

    #[error("Session {session_id} is {status} and accepts no further changes")]
    SessionTerminated {
        session_id: Uuid,
        phase: Phase,
        status: SessionStatus,
    },

    #[error("Cannot move session {session_id} from {phase} to {target}")]
    InvalidTransition {
        session_id: Uuid,
        phase: Phase,
        target: Phase,
    },

    #[error("Session {session_id} is in {phase}; this operation requires {required}")]
    InvalidPhase {
        session_id: Uuid,
        phase: Phase,
        required: Phase,
    },

    #[error("Utterance for session {session_id} is empty")]
    EmptyResponse { session_id: Uuid, phase: Phase },

    #[error("Session {session_id} has no measurable result to summarize yet")]
    InsufficientData { session_id: Uuid, phase: Phase },

    #[error("Session store unavailable for session {session_id}")]
    PersistenceUnavailable {
        session_id: Uuid,
        phase: Option<Phase>,
        #[source]
        source: anyhow::Error,
    },
}

impl CoachError {
    pub fn session_id(&self) -> Uuid {
        match self {
            CoachError::SessionNotFound { session_id }
            | CoachError::SessionTerminated { session_id, .. }
            | CoachError::InvalidTransition { session_id, .. }
            | CoachError::InvalidPhase { session_id, .. }
            | CoachError::EmptyResponse { session_id, .. }
            | CoachError::InsufficientData { session_id, .. }
            | CoachError::PersistenceUnavailable { session_id, .. } => *session_id,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            CoachError::SessionNotFound { .. } => None,
            CoachError::SessionTerminated { phase, .. }
            | CoachError::InvalidTransition { phase, .. }
            | CoachError::InvalidPhase { phase, .. }
            | CoachError::EmptyResponse { phase, .. }
            | CoachError::InsufficientData { phase, .. } => Some(*phase),
            CoachError::PersistenceUnavailable { phase, .. } => *phase,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoachError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            CoachError::SessionTerminated { .. } => "SESSION_TERMINATED",
            CoachError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoachError::InvalidPhase { .. } => "INVALID_PHASE",
            CoachError::EmptyResponse { .. } => "EMPTY_RESPONSE",
            CoachError::InsufficientData { .. } => "INSUFFICIENT_DATA",
            CoachError::PersistenceUnavailable { .. } => "PERSISTENCE_UNAVAILABLE",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoachError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            CoachError::SessionTerminated { .. }
            | CoachError::InvalidTransition { .. }
            | CoachError::InvalidPhase { .. } => StatusCode::CONFLICT,
            CoachError::EmptyResponse { .. } | CoachError::InsufficientData { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoachError::PersistenceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Coach(#[from] CoachError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                json!({
                    "error": {
                        "code": "VALIDATION_ERROR",
                        "message": msg,
                        "session_id": null,
                        "phase": null
                    }
                }),
            ),
            AppError::Coach(e) => {
                if let CoachError::PersistenceUnavailable { source, .. } = e {
                    tracing::error!("Persistence error: {source:?}");
                }
                (
                    e.status(),
                    json!({
                        "error": {
                            "code": e.code(),
                            "message": e.to_string(),
                            "session_id": e.session_id(),
                            "phase": e.phase()
                        }
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
