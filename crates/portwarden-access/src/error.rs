//! Error types for the access layer.

use portwarden_actuator::ActuatorError;
use portwarden_protocol::RootIdentity;

/// Errors returned by [`AccessRegistry`](crate::AccessRegistry) operations.
///
/// Only [`AccessError::Actuator`] involves the outside world; the rest are
/// decided locally and are never worth retrying.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// The login name doesn't match `root[-N]` with `N` in the allowed
    /// alias range.
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),

    /// No grant is tracked for this root.
    #[error("{0} is not authorized")]
    NotAuthorized(RootIdentity),

    /// The root already has `limit` slots logged in.
    #[error("{root} already has {limit} active logins")]
    SlotLimitReached { root: RootIdentity, limit: usize },

    /// Opening or closing the firewall rule failed or timed out.
    #[error("access actuator failed: {0}")]
    Actuator(#[from] ActuatorError),
}
