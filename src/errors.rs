//! Service-wide error taxonomy.
//!
//! Probe failures are *not* errors: a failed check is a successful
//! observation and flows through [`crate::probes::ProbeResult`]. The variants
//! here cover configuration problems, upstream (Prometheus) query failures,
//! and the API surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data (bad query parameters, unknown bucket kind, ...)
    #[error("{message}")]
    BadRequest { message: String },

    /// The endpoints definitions file could not be loaded or is inconsistent
    #[error("invalid endpoints file: {reason}")]
    InvalidEndpoints { reason: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// The external metrics backend rejected or failed a historical query
    #[error("upstream query failed: {reason}")]
    Upstream { reason: String },

    /// Metrics registration/exposition error
    #[error(transparent)]
    Metrics(#[from] prometheus::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::InvalidEndpoints { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Metrics(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A user-safe message, without leaking internal implementation details.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::Upstream { .. } => "Historical data backend is unavailable".to_string(),
            Error::InvalidEndpoints { .. } | Error::Internal { .. } | Error::Metrics(_) | Error::Other(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::BadRequest { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Upstream { .. } => {
                tracing::warn!("Upstream error: {}", self);
            }
            _ => {
                tracing::error!("Internal service error: {:#}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;
