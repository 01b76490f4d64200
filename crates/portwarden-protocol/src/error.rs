//! Error types for the protocol layer.

/// Errors raised while turning raw request fields into typed values.
///
/// These are always local input problems. They are reported to the
/// caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The identity string is empty or contains characters outside
    /// `[A-Za-z0-9_]`.
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),

    /// The address field is not a valid IPv4 or IPv6 address.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// A required request field was missing or blank.
    #[error("missing field: {0}")]
    MissingField(&'static str),
}
