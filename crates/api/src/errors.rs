//! Error-to-HTTP mapping for the gateway.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use billfold_core::DomainError;
use billfold_orchestrator::{ActivityError, CloseError, HostError};
use billfold_store::StoreError;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn validation_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        DomainError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        other => json_error(StatusCode::BAD_REQUEST, "validation_error", other.to_string()),
    }
}

/// Read-path store failures. Absence is handled by callers; everything else
/// is a backend fault.
pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "bill not found"),
        other => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            other.to_string(),
        ),
    }
}

pub fn host_error_to_response(err: HostError) -> axum::response::Response {
    match err {
        HostError::NotRunning(_) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "bill not found or no longer active",
        ),
        HostError::AlreadyRunning(_) => json_error(
            StatusCode::CONFLICT,
            "conflict",
            "a bill with this id is already active",
        ),
        HostError::Stopped(_) => json_error(
            StatusCode::CONFLICT,
            "not_open",
            "bill stopped accepting changes",
        ),
        HostError::Close(close) => close_error_to_response(close),
    }
}

pub fn close_error_to_response(err: CloseError) -> axum::response::Response {
    match err {
        CloseError::AlreadyClosed => {
            json_error(StatusCode::CONFLICT, "already_closed", "bill already closed")
        }
        CloseError::Closing => json_error(
            StatusCode::CONFLICT,
            "close_in_progress",
            "bill is in the middle of closing",
        ),
        CloseError::Activity(activity) => match activity {
            ActivityError::UserInput(msg) => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, "rejected_input", msg)
            }
            ActivityError::InvalidRequest(msg) => {
                json_error(StatusCode::BAD_REQUEST, "invalid_request", msg)
            }
            ActivityError::BillAlreadyClosed => json_error(
                StatusCode::CONFLICT,
                "already_closed",
                "bill already closed by a different request",
            ),
            // Mapped to success inside the orchestrator; kept here so an
            // unexpected leak still yields a sane response.
            ActivityError::DuplicateRequest => json_error(
                StatusCode::CONFLICT,
                "duplicate_request",
                "close request already processed",
            ),
            err @ ActivityError::Exhausted { .. } => {
                json_error(StatusCode::BAD_GATEWAY, "close_failed", err.to_string())
            }
        },
    }
}
