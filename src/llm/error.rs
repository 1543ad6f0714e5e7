//! Errors surfaced by the chat client.
//!
//! Every failure is terminal for the call that produced it; nothing here is
//! retried. Callers decide how to present the message.

use thiserror::Error;

/// Errors returned by [`ChatBackend`](super::ChatBackend) operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The credential is missing, malformed, or was rejected by the service.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// Any other failure talking to the inference service.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request was rejected locally, before any network attempt.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

/// Transport and provider failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection, TLS, or timeout failure in the HTTP transport.
    #[error("could not reach {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    /// The provider throttled the request (HTTP 429).
    #[error("rate limited by the inference service: {body}")]
    RateLimited { body: String },

    /// Any other non-2xx response.
    #[error("inference service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A 2xx response whose body was not the expected shape.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// The SSE stream broke or carried an unparseable event.
    #[error("stream error: {reason}")]
    Stream { reason: String },
}

impl ChatError {
    pub(crate) fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Returns `true` for credential problems.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Maps a non-2xx status from the provider onto the error taxonomy.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Authentication {
                reason: if body.is_empty() {
                    format!("credential rejected (HTTP {status})")
                } else {
                    format!("credential rejected (HTTP {status}): {body}")
                },
            },
            429 => Self::Service(ServiceError::RateLimited { body }),
            _ => Self::Service(ServiceError::Http { status, body }),
        }
    }
}
