//! Read-only endpoint handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/health` | Run state and worker liveness |
//! | `GET` | `/ready` | Readiness check (204) |
//! | `GET` | `/initial` | Static metadata merged with the latest frame |
//! | `GET` | `/dynamic` | Latest data bundle |
//! | `GET` | `/history` | Rolling frame window |

#![allow(clippy::unused_async)] // axum handlers are async by signature

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use catalyst_types::{DataBundle, Frame, HealthReport};
use serde::Serialize;

use crate::error::ObserverError;
use crate::state::AppState;

/// Successful response body: `{"success": true, ...payload}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    /// Always `true`.
    pub success: bool,
    /// Payload fields, inlined.
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wrap a payload.
    pub const fn ok(payload: T) -> Self {
        Self {
            success: true,
            payload,
        }
    }
}

/// Payload of `GET /dynamic`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicPayload<'a> {
    /// `false` if this bundle was already returned by an earlier call.
    pub fresh: bool,
    /// The bundle.
    #[serde(flatten)]
    pub bundle: &'a DataBundle,
}

/// Payload of `GET /history`.
#[derive(Debug, Serialize)]
pub struct HistoryPayload {
    /// Frames, oldest first.
    pub history: Vec<Frame>,
}

// ---------------------------------------------------------------------------
// GET /health, GET /ready
// ---------------------------------------------------------------------------

/// Report the run state.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Envelope<HealthReport>> {
    Json(Envelope::ok(state.controller.health()))
}

/// Readiness check. The server only accepts connections once the worker
/// has been spawned, so reaching this handler means ready.
pub async fn ready() -> StatusCode {
    StatusCode::NO_CONTENT
}

// ---------------------------------------------------------------------------
// GET /initial
// ---------------------------------------------------------------------------

/// Static model metadata merged with the latest frame (or a zero frame).
pub async fn initial(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let document = state.controller.initial()?;
    Ok(Json(Envelope::ok(document)))
}

// ---------------------------------------------------------------------------
// GET /dynamic, GET /history
// ---------------------------------------------------------------------------

/// Take the latest bundle.
///
/// While paused, returns the bundle published before the pause.
pub async fn dynamic(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let delivery = state.controller.consume()?;
    let body = serde_json::to_value(Envelope::ok(DynamicPayload {
        fresh: delivery.fresh,
        bundle: &delivery.bundle,
    }))?;
    Ok(Json(body))
}

/// Return the rolling history window for plot backfill.
pub async fn history(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let history = state.controller.history()?;
    Ok(Json(Envelope::ok(HistoryPayload { history })))
}
