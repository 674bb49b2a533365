//! HTTP router construction.

use axum::{
    Router,
    http::{HeaderValue, header::InvalidHeaderValue},
    middleware as axum_middleware,
    routing::{delete, get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::Config, handlers, middleware, state::AppState};

/// Build the full router.
///
/// # Routes
///
/// Public:
/// - `GET /health`
/// - `POST /api/v1/webhooks/clerk` (authenticated by SVIX signature)
///
/// API key protected:
/// - `GET /api/v1/users/me`
/// - `POST /api/v1/files/presigned-upload`
/// - `GET /api/v1/files`
/// - `GET|DELETE /api/v1/files/{id}`
/// - `POST /api/v1/files/{id}/complete`
/// - `GET /api/v1/files/{id}/download`
/// - `GET|POST /api/v1/api-keys`
/// - `DELETE /api/v1/api-keys/{id}`
pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let authenticated_routes = Router::new()
        .route("/api/v1/users/me", get(handlers::users::get_current_user))
        .route(
            "/api/v1/files/presigned-upload",
            post(handlers::files::create_presigned_upload),
        )
        .route("/api/v1/files", get(handlers::files::list_files))
        .route(
            "/api/v1/files/{id}",
            get(handlers::files::get_file).delete(handlers::files::delete_file),
        )
        .route(
            "/api/v1/files/{id}/complete",
            post(handlers::files::complete_upload),
        )
        .route(
            "/api/v1/files/{id}/download",
            get(handlers::files::download_file),
        )
        .route(
            "/api/v1/api-keys",
            get(handlers::api_keys::list_api_keys).post(handlers::api_keys::create_api_key),
        )
        .route(
            "/api/v1/api-keys/{id}",
            delete(handlers::api_keys::revoke_api_key),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api/v1/webhooks/clerk",
            post(handlers::clerk_webhooks::receive_clerk_webhook),
        )
        .merge(authenticated_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the browser frontend: the configured origin only, or any origin
/// when none is configured.
pub fn cors_layer(config: &Config) -> Result<CorsLayer, InvalidHeaderValue> {
    let layer = match &config.frontend_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::svix;
    use crate::state::test_state;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        let state = test_state();
        let router = build_router(state.clone(), CorsLayer::permissive());
        (router, state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn signed_webhook(state: &AppState, body: &'static str) -> Request<Body> {
        let timestamp = chrono::Utc::now().timestamp();
        let signature = state
            .verifier
            .sign("msg_test", timestamp, body.as_bytes());
        Request::post("/api/v1/webhooks/clerk")
            .header(svix::HEADER_ID, "msg_test")
            .header(svix::HEADER_TIMESTAMP, timestamp.to_string())
            .header(svix::HEADER_SIGNATURE, signature)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn protected_routes_require_bearer_key() {
        let (app, _) = app();
        for (method, uri) in [
            ("GET", "/api/v1/users/me"),
            ("GET", "/api/v1/files"),
            ("POST", "/api/v1/files/presigned-upload"),
            ("DELETE", "/api/v1/files/550e8400-e29b-41d4-a716-446655440000"),
            ("POST", "/api/v1/api-keys"),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
            let body = body_json(response).await;
            assert_eq!(body["error"]["code"], "invalid_api_key");
        }
    }

    #[tokio::test]
    async fn webhook_without_signature_headers_is_rejected() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::post("/api/v1/webhooks/clerk")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"type":"user.created","data":{}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["error"]["code"], "invalid_signature");
    }

    #[tokio::test]
    async fn webhook_with_forged_signature_is_rejected() {
        let (app, _) = app();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let response = app
            .oneshot(
                Request::post("/api/v1/webhooks/clerk")
                    .header(svix::HEADER_ID, "msg_forged")
                    .header(svix::HEADER_TIMESTAMP, timestamp)
                    .header(
                        svix::HEADER_SIGNATURE,
                        "v1,g0hM9SsE+OTPJTGt/tmIKtSyZlE3uFJELVlNIOLJ1OE=",
                    )
                    .body(Body::from(r#"{"type":"user.deleted","data":{"id":"user_1"}}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signed_webhook_with_malformed_body_is_bad_request() {
        let (app, state) = app();
        let response = app
            .oneshot(signed_webhook(&state, "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn signed_webhook_without_event_type_is_bad_request() {
        let (app, state) = app();
        let response = app
            .oneshot(signed_webhook(&state, r#"{"data": {"id": "user_1"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn health_reports_unreachable_database() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["database"], "unreachable");
    }

    #[test]
    fn cors_rejects_invalid_origin() {
        let mut config = crate::config::test_config();
        config.frontend_origin = Some("http://localhost:5173".to_string());
        assert!(cors_layer(&config).is_ok());
        config.frontend_origin = Some("bad\norigin".to_string());
        assert!(cors_layer(&config).is_err());
    }
}
