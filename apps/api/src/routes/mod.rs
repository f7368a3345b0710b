pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Poster API
        .route("/api/v1/posters", post(handlers::handle_create_poster))
        .route(
            "/api/v1/posters/keywords",
            post(handlers::handle_preview_keywords),
        )
        .route("/api/v1/posters/:id", get(handlers::handle_get_poster))
        .route(
            "/api/v1/posters/:id/status",
            get(handlers::handle_get_status),
        )
        .with_state(state)
}
