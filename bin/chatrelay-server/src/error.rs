//! Unified server error type.
//!
//! Every JSON handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body of the form
//! `{"error": <code>, "message": <text>}` with a matching status code.
//!
//! **Security note:** upstream, template and internal errors are logged with
//! full detail but only a generic message is returned to the caller, so API
//! responses, file paths and credentials never leak to clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chatrelay_core::RelayError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the chatrelay-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Propagated from the relay or the upstream API.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// A page template failed to render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Relay(e) => relay_status(e),
            ServerError::Template(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// HTTP status for a relay failure.
pub fn relay_status(e: &RelayError) -> StatusCode {
    match e {
        RelayError::Validation(_) => StatusCode::BAD_REQUEST,
        RelayError::UnknownSession(_) => StatusCode::NOT_FOUND,
        RelayError::Network(_) | RelayError::MissingCredential => StatusCode::SERVICE_UNAVAILABLE,
        RelayError::Upstream { .. } | RelayError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match &self {
            // Client-facing errors: expose the message directly.
            ServerError::NotFound(m) => ("not_found", m.clone()),
            ServerError::BadRequest(m) => ("invalid_request", m.clone()),
            ServerError::Relay(e @ (RelayError::Validation(_) | RelayError::UnknownSession(_))) => {
                (e.code(), e.client_message())
            }

            // Internal errors: log the full detail, return a generic message.
            ServerError::Relay(e) => {
                error!(error = %e, code = e.code(), "upstream request failed");
                (e.code(), e.client_message())
            }
            ServerError::Template(e) => {
                error!(error = ?e, "template rendering failed");
                ("internal_error", "internal server error".to_owned())
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                ("internal_error", "internal server error".to_owned())
            }
        };
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        // Keep the full chain in the server log; clients only see a generic message.
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
