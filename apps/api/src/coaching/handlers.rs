use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coaching::engine::{SessionStarted, SessionState, TransitionOutcome, TurnOutcome};
use crate::errors::AppError;
use crate::models::session::{Phase, SummaryBullet};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartSessionRequest {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitTurnRequest {
    pub utterance: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub target: Phase,
}

#[derive(Serialize)]
pub struct SynthesisResponse {
    pub session_id: Uuid,
    pub bullets: Vec<SummaryBullet>,
}

/// `:id` path segment parsed as a session UUID. A malformed id is rejected
/// with the JSON validation error body instead of axum's plain-text one.
pub struct SessionId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Uuid::parse_str(&raw)
            .map(SessionId)
            .map_err(|_| AppError::Validation(format!("'{raw}' is not a valid session id")))
    }
}

/// POST /api/v1/sessions
pub async fn handle_start_session(
    State(state): State<AppState>,
    body: Option<Json<StartSessionRequest>>,
) -> Result<(StatusCode, Json<SessionStarted>), AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let started = state.engine.start_session(req.role.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    SessionId(id): SessionId,
) -> Result<Json<SessionState>, AppError> {
    Ok(Json(state.engine.get_session_state(id).await?))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_abandon_session(
    State(state): State<AppState>,
    SessionId(id): SessionId,
) -> Result<Json<SessionState>, AppError> {
    Ok(Json(state.engine.abandon_session(id).await?))
}

/// POST /api/v1/sessions/:id/turns
pub async fn handle_submit_turn(
    State(state): State<AppState>,
    SessionId(id): SessionId,
    Json(req): Json<SubmitTurnRequest>,
) -> Result<Json<TurnOutcome>, AppError> {
    Ok(Json(state.engine.submit_turn(id, &req.utterance).await?))
}

/// POST /api/v1/sessions/:id/phase
pub async fn handle_request_transition(
    State(state): State<AppState>,
    SessionId(id): SessionId,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<TransitionOutcome>, AppError> {
    Ok(Json(state.engine.request_transition(id, req.target).await?))
}

/// POST /api/v1/sessions/:id/synthesize
pub async fn handle_synthesize(
    State(state): State<AppState>,
    SessionId(id): SessionId,
) -> Result<Json<SynthesisResponse>, AppError> {
    let bullets = state.engine.synthesize(id).await?;
    Ok(Json(SynthesisResponse {
        session_id: id,
        bullets,
    }))
}

/// GET /api/v1/sessions/:id/export
pub async fn handle_export(
    State(state): State<AppState>,
    SessionId(id): SessionId,
) -> Result<impl IntoResponse, AppError> {
    let md = state.engine.export_markdown(id).await?;
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], md))
}
