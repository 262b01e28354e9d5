use std::sync::Arc;

use crate::coaching::engine::CoachingEngine;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CoachingEngine>,
    pub config: Config,
}
