//! Control endpoint handlers.
//!
//! These endpoints drive the run state and feed parameter updates to the
//! worker. None of them waits on the worker: transitions are applied to
//! the shared control state and updates are queued with `try_send`.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/start` | `Stopped -> Running` (201) |
//! | `PUT` | `/pause` | `Running -> Paused` |
//! | `PUT` | `/resume` | `Paused -> Running` |
//! | `POST` | `/reset` | Discard the run and return to `Stopped` (201) |
//! | `POST` | `/slider` | Queue a parameter update (201) |

#![allow(clippy::unused_async)] // axum handlers are async by signature

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use catalyst_types::ParameterUpdate;
use serde_json::Value;

use crate::error::ObserverError;
use crate::handlers::Envelope;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// POST /start
// ---------------------------------------------------------------------------

/// Start a run.
///
/// A second start while running answers 200 with `success: false`.
pub async fn start(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let report = state.controller.start()?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(report))))
}

// ---------------------------------------------------------------------------
// PUT /pause, PUT /resume
// ---------------------------------------------------------------------------

/// Pause at the next iteration boundary.
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let report = state.controller.pause()?;
    Ok(Json(Envelope::ok(report)))
}

/// Resume a paused run.
pub async fn resume(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let report = state.controller.resume()?;
    Ok(Json(Envelope::ok(report)))
}

// ---------------------------------------------------------------------------
// POST /reset
// ---------------------------------------------------------------------------

/// Discard the current run. Parameters return to their defaults and the
/// next start allocates a fresh engine.
pub async fn reset(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let report = state.controller.reset()?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(report))))
}

// ---------------------------------------------------------------------------
// POST /slider
// ---------------------------------------------------------------------------

/// Validate and queue a parameter update.
///
/// The body is parsed by hand so that every malformed shape gets its own
/// 400 reason instead of the extractor's generic rejection.
pub async fn slider(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ObserverError> {
    let update = parse_slider(&body)?;
    tracing::debug!(label = %update.label, value = update.value, "Slider update received");
    state.controller.submit(update)?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "success": true }))))
}

/// Turn a raw `/slider` body into a [`ParameterUpdate`].
///
/// `value` may be a JSON number or a string holding one.
///
/// # Errors
///
/// [`ObserverError::BadRequest`] for an empty or non-JSON body, a missing
/// or non-string `label`, and a missing or non-numeric `value`.
pub fn parse_slider(body: &[u8]) -> Result<ParameterUpdate, ObserverError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ObserverError::BadRequest(String::from("missing JSON body")));
    }
    let json: Value = serde_json::from_slice(body)
        .map_err(|e| ObserverError::BadRequest(format!("invalid JSON body: {e}")))?;
    let Some(object) = json.as_object() else {
        return Err(ObserverError::BadRequest(String::from(
            "body must be a JSON object",
        )));
    };

    let label = match object.get("label") {
        None | Some(Value::Null) => {
            return Err(ObserverError::BadRequest(String::from("missing label")));
        }
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(ObserverError::BadRequest(String::from(
                "label must be a string",
            )));
        }
    };

    let value = match object.get("value") {
        None | Some(Value::Null) => {
            return Err(ObserverError::BadRequest(String::from("missing value")));
        }
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    }
    .ok_or_else(|| ObserverError::BadRequest(format!("value for {label} is not numeric")))?;

    Ok(ParameterUpdate { label, value })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn reason(body: &str) -> String {
        match parse_slider(body.as_bytes()) {
            Err(ObserverError::BadRequest(reason)) => reason,
            other => panic!("expected BadRequest, got {other:?}"),
        }
    }

    #[test]
    fn parses_numbers_and_numeric_strings() {
        let update = parse_slider(br#"{"label":"T","value":550}"#).unwrap();
        assert_eq!(update.label, "T");
        assert!((update.value - 550.0).abs() < f64::EPSILON);

        let update = parse_slider(br#"{"label":"p_COgas","value":" 0.25 "}"#).unwrap();
        assert!((update.value - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn distinguishes_malformed_bodies() {
        assert_eq!(reason(""), "missing JSON body");
        assert!(reason("{not json").starts_with("invalid JSON body"));
        assert_eq!(reason("[1,2]"), "body must be a JSON object");
        assert_eq!(reason(r#"{"value":1}"#), "missing label");
        assert_eq!(reason(r#"{"label":3,"value":1}"#), "label must be a string");
        assert_eq!(reason(r#"{"label":"T"}"#), "missing value");
        assert_eq!(reason(r#"{"label":"T","value":"hot"}"#), "value for T is not numeric");
        assert_eq!(reason(r#"{"label":"T","value":[1]}"#), "value for T is not numeric");
    }
}
