//! Axum router construction for the control surface.
//!
//! Assembles all routes into a single [`Router`] with CORS middleware
//! enabled for the browser frontend.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health`, `GET /ready` -- liveness and readiness
/// - `POST /start`, `PUT /pause`, `PUT /resume`, `POST /reset` -- run control
/// - `GET /initial`, `GET /dynamic`, `GET /history` -- data
/// - `POST /slider` -- parameter updates
///
/// CORS allows any origin; the frontend is served from a different port.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        // Run control
        .route("/start", post(operator::start))
        .route("/pause", put(operator::pause))
        .route("/resume", put(operator::resume))
        .route("/reset", post(operator::reset))
        // Data
        .route("/initial", get(handlers::initial))
        .route("/dynamic", get(handlers::dynamic))
        .route("/history", get(handlers::history))
        // Parameters
        .route("/slider", post(operator::slider))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
