//! Route definitions for the REST API.

mod health;
mod messages;
mod users;

use axum::{
    http::Uri,
    routing::{get, post, put},
    Router,
};

use crate::error::ApiError;
use crate::state::AppState;

/// Create the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(health::health_check))
        .route("/system/health", get(health::system_health))
        // Messages
        .route("/users/:id/messages", get(messages::list_messages))
        .route("/users/:id/messages/generate", post(messages::generate_messages))
        .route("/messages/:id/interactions", post(messages::record_interaction))
        // Profile and insights
        .route("/users/:id/profile", put(users::update_profile))
        .route("/users/:id/insights", get(users::get_insights))
        .fallback(not_found)
        // Attach state
        .with_state(state)
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}

pub use health::*;
pub use messages::*;
pub use users::*;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::{Duration, Utc};
    use coach_core::types::UserRecord;
    use coach_core::{CoachConfig, CoachingEngine, SqliteCoachStore};
    use coach_providers::{HeuristicPredictor, LogNotifier};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    fn app() -> Router {
        let store = Arc::new(SqliteCoachStore::in_memory().unwrap());
        store
            .insert_user(&UserRecord::new("u1", "Ada", Utc::now() - Duration::days(30)))
            .unwrap();
        let engine = CoachingEngine::new(
            CoachConfig::default(),
            store.clone(),
            store,
            Arc::new(HeuristicPredictor::new()),
            Arc::new(LogNotifier::new()),
        );
        engine.seed_default_templates().unwrap();
        create_router(AppState::new(Arc::new(engine)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_system_health_reports_empty_queue() {
        let (status, body) = send(app(), get("/system/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["queue_depth"], 0);
    }

    #[tokio::test]
    async fn test_generate_for_unknown_user_is_404() {
        let request = Request::builder()
            .method("POST")
            .uri("/users/nobody/messages/generate")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NF_002");
    }

    #[tokio::test]
    async fn test_list_messages_rejects_oversized_page() {
        let (status, body) = send(app(), get("/users/u1/messages?limit=500")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "VAL_003");
    }

    #[tokio::test]
    async fn test_list_messages_empty_page() {
        let (status, body) = send(app(), get("/users/u1/messages?status=sent")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 0);
        assert_eq!(body["items"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_update_profile_then_insights() {
        let app = app();
        let update = serde_json::json!({ "frequency": "minimal", "quiet_hours": [22, 23, 0] });
        let (status, body) = send(app.clone(), json("PUT", "/users/u1/profile", update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["frequency"], "minimal");

        let (status, body) = send(app, get("/users/u1/insights")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "u1");
        assert_eq!(body["frequency"], "minimal");
    }

    #[tokio::test]
    async fn test_invalid_profile_hour_is_rejected() {
        let update = serde_json::json!({ "preferred_hours": [9, 24] });
        let (status, _) = send(app(), json("PUT", "/users/u1/profile", update)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_interaction_with_bad_id() {
        let body = serde_json::json!({ "type": "read" });
        let (status, _) = send(app(), json("POST", "/messages/not-a-uuid/interactions", body)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_interaction_with_unknown_message() {
        let body = serde_json::json!({ "type": "acted_on" });
        let uri = format!("/messages/{}/interactions", uuid::Uuid::new_v4());
        let (status, _) = send(app(), json("POST", &uri, body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, body) = send(app(), get("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
