//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Service discovery
        .route("/servicedocument", get(handlers::service_document))
        // Deposit ingress: create, then continue at the edit-media IRI
        .route("/collection", post(handlers::create_deposit))
        .route(
            "/media/{deposit_id}",
            post(handlers::continue_deposit).put(handlers::continue_deposit),
        )
        // Deposit statement (state + description)
        .route("/statement/{deposit_id}", get(handlers::get_statement))
        // Health check (intentionally unauthenticated for load balancers)
        .route("/healthz", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
