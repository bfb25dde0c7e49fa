//! Tunnel request errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::tunnel::DestinationError;

/// Everything that can end a tunnel request early.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("Direct access not allowed")]
    IdentityMissing,

    #[error("Missing destination")]
    MissingDestination,

    #[error(transparent)]
    Destination(#[from] DestinationError),

    #[error("Missing session ID")]
    MissingSessionId,

    #[error("failed to dial {destination}: {source}")]
    Dial {
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read request body: {0}")]
    Body(#[source] axum::Error),

    #[error("failed to write to destination: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to read from destination: {0}")]
    Read(#[source] std::io::Error),

    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TunnelError {
    pub fn status(&self) -> StatusCode {
        match self {
            TunnelError::IdentityMissing => StatusCode::FORBIDDEN,
            TunnelError::MissingDestination | TunnelError::MissingSessionId => {
                StatusCode::BAD_REQUEST
            }
            TunnelError::Destination(e) if e.is_shape() => StatusCode::FORBIDDEN,
            TunnelError::Destination(_) => StatusCode::BAD_REQUEST,
            TunnelError::Dial { .. }
            | TunnelError::Body(_)
            | TunnelError::Write(_)
            | TunnelError::Read(_)
            | TunnelError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TunnelError {
    fn into_response(self) -> Response {
        (self.status(), format!("{}\n", self)).into_response()
    }
}
