//! Unified error type for the Portwarden supervisor.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use portwarden_access::AccessError;
use portwarden_actuator::ActuatorError;
use portwarden_protocol::{Outcome, ProtocolError};

use crate::signature::SignatureError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so `?` converts sub-crate errors inside handlers. Every variant maps
/// to an HTTP status and an [`Outcome`] body via [`IntoResponse`].
#[derive(Debug, thiserror::Error)]
pub enum PortwardenError {
    /// Bad request fields (missing, unparsable address, bad identity).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry operation failed.
    #[error(transparent)]
    Access(#[from] AccessError),

    /// A collaborator call made outside the registry failed.
    #[error(transparent)]
    Actuator(#[from] ActuatorError),

    /// The request signature was missing, wrong or stale.
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// The request body wasn't the expected JSON.
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// A local-only route was called from a non-loopback peer.
    #[error("forbidden")]
    Forbidden,

    /// The environment configuration is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortwardenError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Protocol(_) | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Access(AccessError::InvalidIdentity(_)) => StatusCode::BAD_REQUEST,
            Self::Access(AccessError::NotAuthorized(_))
            | Self::Access(AccessError::SlotLimitReached { .. }) => StatusCode::FORBIDDEN,
            Self::Access(AccessError::Actuator(_)) | Self::Actuator(_) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Signature(SignatureError::Missing) => StatusCode::BAD_REQUEST,
            Self::Signature(_) | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Config(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PortwardenError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request refused");
        }
        (status, Json(Outcome::failure(self.to_string()))).into_response()
    }
}
