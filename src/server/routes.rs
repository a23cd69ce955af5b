//! Router configuration for the catalog API.

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/vehicles", get(handlers::list_vehicles))
        .route("/api/vehicles/:id", get(handlers::vehicle_detail))
        .route(
            "/api/vehicles/:id/specifications",
            get(handlers::vehicle_specifications),
        )
        .route("/api/failures/stats", get(handlers::failure_stats))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
