use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use scribe_compose::{GenerateRequest, GenerationService, RewriteRequest, ServiceError, TextStream};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn GenerationService>,
}

/// HTTP API over any generation service
pub fn router(service: Arc<dyn GenerationService>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/rewrite", post(rewrite))
        .with_state(AppState { service })
        .layer(CorsLayer::permissive())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "message": "Scribe gateway is running" }))
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerateRequest>,
) -> Response {
    tracing::info!(template = %request.template_type, "Received generate request");

    match state.service.generate(request).await {
        Ok(stream) => text_response(stream),
        Err(e) => service_error(e),
    }
}

async fn rewrite(State(state): State<AppState>, Json(request): Json<RewriteRequest>) -> Response {
    tracing::info!(command = %request.command, "Received rewrite request");

    match state.service.rewrite(request).await {
        Ok(stream) => text_response(stream),
        Err(e) => service_error(e),
    }
}

fn text_response(stream: TextStream) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response()
}

fn service_error(error: ServiceError) -> Response {
    tracing::warn!(error = %error, "Generation service refused request");
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "error": error.to_string() })),
    )
        .into_response()
}
