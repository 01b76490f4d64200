use std::time::Duration;

/// Errors raised by an external collaborator call.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    /// The call did not finish within its bound.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The HTTP request could not be sent or its reply could not be read.
    #[cfg(feature = "http")]
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The collaborator answered but refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The stop command could not be spawned.
    #[error("command failed to start: {0}")]
    Spawn(#[source] std::io::Error),

    /// The stop command ran and exited unsuccessfully.
    #[error("command exited with {0}")]
    CommandFailed(std::process::ExitStatus),
}
