//! Error types for the REST API.
//!
//! [`ApiError`] unifies request-level failures with [`StoreError`] and
//! converts into an HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The body
//! is always `{"error": <message>, "status": <code>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use scims_core::{CraftError, StoreError};
use scims_ledger::LedgerError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A request body failed field validation.
    #[error("invalid request: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A UUID could not be parsed from the request.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The `x-scims-user` header is missing or malformed.
    #[error("missing or invalid requester: {0}")]
    Requester(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Store(err) => store_status(err),
            Self::Validation(_) | Self::InvalidUuid(_) => StatusCode::BAD_REQUEST,
            Self::Requester(_) => StatusCode::UNAUTHORIZED,
        }
    }
}

const fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict(_) => StatusCode::CONFLICT,
        StoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        StoreError::Validation(_) | StoreError::Location(_) => StatusCode::BAD_REQUEST,
        StoreError::Craft(craft) => match craft {
            CraftError::InvalidTransition { .. } => StatusCode::CONFLICT,
            CraftError::InsufficientStock { .. } | CraftError::UnresolvedIngredient { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CraftError::InvariantViolation { .. } | CraftError::ArithmeticOverflow { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        StoreError::Ledger(ledger) => match ledger {
            LedgerError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::NonPositiveQuantity { .. } | LedgerError::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::InvariantViolation { .. } | LedgerError::ArithmeticOverflow { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
