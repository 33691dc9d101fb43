use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_update_id, update_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/events", post(handlers::handle_event))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_update_id))
        .layer(middleware::from_fn(update_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
