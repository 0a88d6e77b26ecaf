//! Error taxonomy for the relay and its upstream API.
//!
//! Every variant carries full diagnostic detail for server-side logs.  What a
//! client is allowed to see is decided by [`RelayError::code`] and
//! [`RelayError::client_message`], which never include that detail.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The upstream API could not be reached or the connection dropped.
    #[error("network error: {0}")]
    Network(String),

    /// The upstream API answered with a non-success status.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The upstream answered 2xx but the body did not have the expected shape.
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// No API credential is configured.
    #[error("upstream credential is not configured")]
    MissingCredential,

    /// The caller supplied input the relay refuses to forward.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced session does not exist.
    #[error("unknown session: {0}")]
    UnknownSession(String),
}

impl RelayError {
    /// Stable, client-safe error code.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Network(_) | RelayError::MissingCredential => "upstream_unavailable",
            RelayError::Upstream { .. } | RelayError::MalformedResponse(_) => "upstream_error",
            RelayError::Validation(_) => "invalid_request",
            RelayError::UnknownSession(_) => "not_found",
        }
    }

    /// Generic message suitable for showing to an untrusted client.
    ///
    /// Validation messages are produced locally from the caller's own input
    /// and are passed through; everything else is replaced by fixed text.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::Validation(m) => m.clone(),
            RelayError::UnknownSession(_) => "session not found".to_owned(),
            RelayError::Network(_) | RelayError::MissingCredential => {
                "the completion service is currently unavailable".to_owned()
            }
            RelayError::Upstream { .. } | RelayError::MalformedResponse(_) => {
                "the completion service returned an error".to_owned()
            }
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            RelayError::MalformedResponse(e.to_string())
        } else if let Some(status) = e.status() {
            RelayError::Upstream { status: status.as_u16(), message: e.to_string() }
        } else {
            RelayError::Network(e.to_string())
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
