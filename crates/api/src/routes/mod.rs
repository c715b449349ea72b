//! API routes

pub mod admin;
pub mod chat;
pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::require_staff,
    state::AppState,
    websocket::{admin_ws_handler, customer_ws_handler},
};

/// Request bodies are small JSON documents
const MAX_BODY_BYTES: usize = 64 * 1024;

/// CORS policy from configured origins; any origin when none are listed
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Chat widget routes (no auth; customers are anonymous)
    let public_api_routes = Router::new()
        .route("/chat/start", post(chat::start_chat))
        .route("/chat/message", post(chat::send_message))
        .route("/chat/:customer_id/history", get(chat::chat_history));

    // Dashboard routes (staff token required)
    let admin_api_routes = Router::new()
        .route("/admin/sessions", get(admin::list_sessions))
        .route("/admin/sessions/:session_id", get(admin::session_detail))
        .route("/admin/sessions/:session_id/status", patch(admin::update_status))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_staff));

    // WebSocket routes (admin auth handled in handler via query parameter)
    let websocket_routes = Router::new()
        .route("/ws/chat/:customer_id", get(customer_ws_handler))
        .route("/ws/admin", get(admin_ws_handler));

    let api_routes = Router::new()
        .merge(public_api_routes)
        .merge(admin_api_routes);

    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .merge(health_routes)
        .merge(websocket_routes)
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::MemoryStore;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "router-test-secret-at-least-32-characters";

    fn app() -> (Router, AppState) {
        let store = Arc::new(MemoryStore::new());
        let config = Config {
            jwt_secret: SECRET.to_string(),
            ..Config::default()
        };
        let state = AppState::new(config, store.clone(), store);
        (create_router(state.clone()), state)
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn staff_token(state: &AppState, role: &str) -> String {
        state
            .jwt
            .generate_token(Uuid::new_v4(), "Grace", "grace@example.com", role)
            .unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_reports_websocket_stats() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["database"], "healthy");
        assert_eq!(body["websocket"]["connections"], 0);
    }

    #[tokio::test]
    async fn test_start_chat_creates_then_resumes() {
        let (app, _) = app();
        let request = json!({"customer_id": "c1", "customer_name": "Ada"});

        let response = app.clone().oneshot(post_json("/api/chat/start", request.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["created"], true);
        assert_eq!(body["chat_session"]["customer_name"], "Ada");
        assert_eq!(body["chat_session"]["status"], "open");

        let response = app.oneshot(post_json("/api/chat/start", request)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["created"], false);
    }

    #[tokio::test]
    async fn test_start_chat_generates_customer_id() {
        let (app, _) = app();
        let response = app.oneshot(post_json("/api/chat/start", json!({}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        let customer_id = body["customer_id"].as_str().unwrap();
        assert!(Uuid::parse_str(customer_id).is_ok());
    }

    #[tokio::test]
    async fn test_history_of_unknown_customer_is_404() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/api/chat/nobody/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_send_message_then_history() {
        let (app, _) = app();
        app.clone()
            .oneshot(post_json("/api/chat/start", json!({"customer_id": "c1"})))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/chat/message",
                json!({"customer_id": "c1", "message": "is anyone there?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .oneshot(Request::builder().uri("/api/chat/c1/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body[0]["content"], "is anyone there?");
        assert_eq!(body[0]["sender_type"], "customer");
    }

    #[tokio::test]
    async fn test_send_message_to_unknown_customer_is_404() {
        let (app, _) = app();
        let response = app
            .oneshot(post_json(
                "/api/chat/message",
                json!({"customer_id": "ghost", "message": "hello"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_admin_routes_require_staff_token() {
        let (app, state) = app();

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/api/admin/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let customer = staff_token(&state, "customer");
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/admin/sessions")
                    .header("authorization", format!("Bearer {customer}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let staff = staff_token(&state, "staff");
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/admin/sessions?status=open")
                    .header("authorization", format!("Bearer {staff}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_status_update_and_detail() {
        let (app, state) = app();
        let token = staff_token(&state, "admin");

        let response = app
            .clone()
            .oneshot(post_json("/api/chat/start", json!({"customer_id": "c1"})))
            .await
            .unwrap();
        let session_id = json_body(response).await["chat_session"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri(format!("/api/admin/sessions/{session_id}/status"))
                    .header("authorization", format!("Bearer {token}"))
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"status": "closed"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "closed");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/admin/sessions/{session_id}"))
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["messages"][0]["content"], "Conversation closed by Grace");
    }

    #[tokio::test]
    async fn test_invalid_status_filter_is_400() {
        let (app, state) = app();
        let token = staff_token(&state, "staff");
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/admin/sessions?status=archived")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
