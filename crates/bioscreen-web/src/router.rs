//! Axum router: maps URL paths to handlers.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::page::home;
use crate::handlers::session::{cancel, download_predictions, predict, select, status, upload};
use crate::sse::sse_handler;
use crate::state::{AppState, SharedState};

const STATIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/static");

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.web.max_upload_bytes();
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Page
        .route("/",            get(home))

        // Session actions
        .route("/upload",      post(upload).layer(DefaultBodyLimit::max(upload_limit)))
        .route("/select",      post(select))
        .route("/predict",     post(predict))
        .route("/cancel",      post(cancel))
        .route("/predictions", get(download_predictions))

        // API
        .route("/api/status",  get(status))
        .route("/api/events",  get(sse_handler))

        .nest_service("/static", ServeDir::new(STATIC_DIR))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
