pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::coaching::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Coaching sessions
        .route("/api/v1/sessions", post(handlers::handle_start_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_abandon_session),
        )
        .route(
            "/api/v1/sessions/:id/turns",
            post(handlers::handle_submit_turn),
        )
        .route(
            "/api/v1/sessions/:id/phase",
            post(handlers::handle_request_transition),
        )
        .route(
            "/api/v1/sessions/:id/synthesize",
            post(handlers::handle_synthesize),
        )
        .route("/api/v1/sessions/:id/export", get(handlers::handle_export))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::coaching::engine::CoachingEngine;
    use crate::coaching::settings::CoachingSettings;
    use crate::coaching::store::{InMemorySessionStore, PersistencePolicy};
    use crate::config::{Config, StoreBackend};

    fn app() -> Router {
        let engine = CoachingEngine::new(
            CoachingSettings::builtin().unwrap(),
            Arc::new(InMemorySessionStore::new()),
            PersistencePolicy::default(),
        )
        .unwrap();
        let config = Config {
            store: StoreBackend::Memory,
            database_url: None,
            redis_url: None,
            coaching_config_path: None,
            persistence: PersistencePolicy::default(),
            port: 0,
            rust_log: "info".to_string(),
        };
        build_router(AppState {
            engine: Arc::new(engine),
            config,
        })
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, String) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn start(app: &Router) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/sessions",
            Some(json!({ "role": "product manager" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["role"], "product_manager");
        assert_eq!(v["phase"], "INTRODUCTION");
        v["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["session_store"], "memory");
    }

    #[tokio::test]
    async fn test_start_session_without_body() {
        let (status, body) = send(&app(), Method::POST, "/api/v1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["role"], "generic");
    }

    #[tokio::test]
    async fn test_error_statuses_and_body() {
        let app = app();
        let missing = uuid::Uuid::new_v4();
        let (status, body) = send(&app, Method::GET, &format!("/api/v1/sessions/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["error"]["code"], "SESSION_NOT_FOUND");
        assert_eq!(v["error"]["session_id"], missing.to_string());
        assert_eq!(v["error"]["phase"], Value::Null);

        for (method, uri) in [
            (Method::GET, "/api/v1/sessions/not-a-uuid"),
            (Method::POST, "/api/v1/sessions/not-a-uuid/synthesize"),
        ] {
            let (status, body) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let v: Value = serde_json::from_str(&body).unwrap();
            assert_eq!(v["error"]["code"], "VALIDATION_ERROR");
            assert!(v["error"]["message"].as_str().unwrap().contains("not-a-uuid"));
        }

        let id = start(&app).await;
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{id}/turns"),
            Some(json!({ "utterance": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["error"]["code"], "EMPTY_RESPONSE");
        assert_eq!(v["error"]["phase"], "INTRODUCTION");

        let (status, _) = send(&app, Method::POST, &format!("/api/v1/sessions/{id}/synthesize"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{id}/phase"),
            Some(json!({ "target": "SYNTHESIS" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_full_session_flow() {
        let app = app();
        let id = start(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{id}/turns"),
            Some(json!({ "utterance": "I am a product manager at a logistics startup since 2020" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["turn_sequence"], 1);
        assert!(v["next_prompt"].as_str().is_some_and(|p| !p.is_empty()));

        for target in ["STORY_DISCOVERY", "ACHIEVEMENT_MINING", "SYNTHESIS"] {
            let (status, body) = send(
                &app,
                Method::POST,
                &format!("/api/v1/sessions/{id}/phase"),
                Some(json!({ "target": target })),
            )
            .await;
            assert_eq!(status, StatusCode::OK, "{body}");
        }

        let (status, body) = send(&app, Method::POST, &format!("/api/v1/sessions/{id}/synthesize"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("INSUFFICIENT_DATA"));

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{id}/turns"),
            Some(json!({
                "utterance": "I led a team of 5 engineers and increased deployment speed by 40% over 3 months"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::POST, &format!("/api/v1/sessions/{id}/synthesize"), None).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["bullets"][0]["position"], 1);

        let (status, body) = send(&app, Method::GET, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["status"], "completed");
        assert_eq!(v["phase"], "SYNTHESIS");

        let (status, body) = send(&app, Method::GET, &format!("/api/v1/sessions/{id}/export"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("## Summary"));

        let (status, body) = send(&app, Method::DELETE, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.contains("SESSION_TERMINATED"));
    }

    #[tokio::test]
    async fn test_abandon_session() {
        let app = app();
        let id = start(&app).await;
        let (status, body) = send(&app, Method::DELETE, &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let v: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["status"], "abandoned");
    }
}
