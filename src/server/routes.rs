//! Route table for the dispatch layer.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/pipeline", post(handlers::pipeline))
        .route("/api/portrait", post(handlers::portrait))
        .route("/api/portrait/query", post(handlers::portrait_query))
        .route("/api/portrait/delete", post(handlers::portrait_delete))
        .route("/api/portraits", get(handlers::list_portraits))
        .route("/api/collections", get(handlers::list_collections))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
