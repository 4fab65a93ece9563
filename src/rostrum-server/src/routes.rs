//! Route table for the debate API.

use std::path::Path;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

const JSON_BODY_LIMIT: usize = 5 * 1024 * 1024;
const UPLOAD_BODY_LIMIT: usize = 15 * 1024 * 1024;

/// Build the router. `sessions_dir` is served statically so synthesized
/// audio files are reachable at their public URLs.
pub fn router(state: AppState, sessions_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/start", post(handlers::start))
        .route("/reply", post(handlers::reply))
        .route(
            "/transcribe",
            post(handlers::transcribe).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/speak", post(handlers::speak))
        .route("/feedback", post(handlers::feedback))
        .route("/training-analysis", get(handlers::training_analysis))
        .route("/export-training-data", get(handlers::export_training_data))
        .nest_service("/sessions", ServeDir::new(sessions_dir))
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
