//! Error types for the control surface.
//!
//! [`ObserverError`] unifies request-shape failures and controller
//! failures into a single enum that converts into an Axum response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Every
//! error body has the form `{"success": false, "reason": ..., "status": ...}`,
//! plus `"retryable": true` when the client may resend unchanged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalyst_core::error::ControlError;

/// Errors that can occur in the control surface.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The request body or parameters are malformed.
    #[error("{0}")]
    BadRequest(String),

    /// The controller refused the operation.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// A response could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ObserverError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Control(e) => match e {
                ControlError::Backpressure { .. } => StatusCode::SERVICE_UNAVAILABLE,
                ControlError::AlreadyInState { .. } => StatusCode::OK,
                ControlError::Merge(_) | ControlError::Serialization(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                ControlError::Validation(_)
                | ControlError::NotRunning
                | ControlError::NoData
                | ControlError::InvalidTransition { .. }
                | ControlError::WorkerUnavailable { .. } => StatusCode::BAD_REQUEST,
            },
            Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the client may resend the same request.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Control(e) if e.is_retryable())
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = serde_json::json!({
            "success": false,
            "reason": self.to_string(),
            "status": status.as_u16(),
        });
        if self.is_retryable() {
            if let Some(map) = body.as_object_mut() {
                map.insert(String::from("retryable"), serde_json::Value::Bool(true));
            }
        }

        (status, axum::Json(body)).into_response()
    }
}
