//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod compare;
mod connection;
mod erd;
mod impact;
mod metadata;
mod query;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Credentials and connections
        .route("/api/credentials", post(connection::set_credentials))
        .route(
            "/api/connections",
            post(connection::connect).get(connection::list_connections),
        )
        .route("/api/connections/schema-diff", get(connection::schema_diff))
        .route("/api/connections/{environment}", delete(connection::disconnect))
        .route("/api/connections/{environment}/schemas", get(connection::list_schemas))

        // Metadata cache
        .route("/api/metadata/{environment}/{schema}", get(metadata::get_metadata))
        .route(
            "/api/metadata/{environment}/{schema}/reload",
            post(metadata::reload_metadata),
        )

        // ERD
        .route("/api/erd", post(erd::generate))
        .route("/api/erd/export", post(erd::export))
        .route("/api/erd/exclusions", get(erd::exclusions))

        // Query runner
        .route("/api/query", post(query::execute))
        .route("/api/query/csv", post(query::execute_csv))
        .route("/api/query/suggest", post(query::suggest))

        // Environment compare
        .route("/api/compare", post(compare::compare))

        // Code impact
        .route("/api/impact/table", post(impact::table_impact))
        .route("/api/impact/column", post(impact::column_impact))
        .route("/api/impact/unused", post(impact::unused_objects))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_DISPOSITION])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let settings = Settings::default();
        let state = Arc::new(AppState::new(settings.clone()).unwrap());
        create_router(state, &settings)
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_unknown_environment_is_not_found() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/connections/NOPE/schemas")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exclusions_require_a_schema() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/api/erd/exclusions?environment=QA&schemas=%20,")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_validation_rejects_empty_sql() {
        let body = r#"{"environment":"QA","schema":"app","sql":""}"#;
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/query")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
