//! External collaborators for Portwarden.
//!
//! The access and idle layers never talk to the network directly. They
//! drive three narrow traits:
//!
//! - [`AccessActuator`]: opens and closes a per-address firewall rule
//! - [`ResourceActuator`]: stops the managed compute resource
//! - [`PresenceProbe`]: lists players connected to the game server
//!
//! Concrete implementations live behind feature flags:
//!
//! - `http` (default): [`HttpAccessActuator`] and [`HttpPresenceProbe`]
//!   via `reqwest`
//!
//! [`CommandResourceActuator`] and [`DryRunActuator`] are always available.
//!
//! Every call made through these traits by the core goes through
//! [`bounded`], so a hung collaborator surfaces as
//! [`ActuatorError::Timeout`] instead of stalling the registry.

#![allow(async_fn_in_trait)]

mod command;
mod dry_run;
mod error;
#[cfg(feature = "http")]
mod http;

pub use command::CommandResourceActuator;
pub use dry_run::DryRunActuator;
pub use error::ActuatorError;
#[cfg(feature = "http")]
pub use http::{HttpAccessActuator, HttpPresenceProbe};

use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use portwarden_protocol::OnlinePlayers;

/// Opens and closes network access for a single address.
///
/// Implementations should make `close` idempotent: closing an address
/// that has no open rule is not a failure.
pub trait AccessActuator: Send + Sync + 'static {
    /// Opens access for `address`. `label` names the grant holder and is
    /// attached to the rule for operators.
    fn open(
        &self,
        address: IpAddr,
        label: &str,
    ) -> impl Future<Output = Result<(), ActuatorError>> + Send;

    /// Closes access for `address`.
    fn close(&self, address: IpAddr) -> impl Future<Output = Result<(), ActuatorError>> + Send;
}

/// Stops the single managed compute resource.
pub trait ResourceActuator: Send + Sync + 'static {
    fn stop(&self) -> impl Future<Output = Result<(), ActuatorError>> + Send;
}

/// Samples who is connected to the game server right now.
pub trait PresenceProbe: Send + Sync + 'static {
    /// Returns the listing in the order the game server reports it.
    fn list_connected_players(
        &self,
    ) -> impl Future<Output = Result<OnlinePlayers, ActuatorError>> + Send;
}

impl<T: AccessActuator> AccessActuator for Arc<T> {
    fn open(
        &self,
        address: IpAddr,
        label: &str,
    ) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        (**self).open(address, label)
    }

    fn close(&self, address: IpAddr) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        (**self).close(address)
    }
}

impl<T: ResourceActuator> ResourceActuator for Arc<T> {
    fn stop(&self) -> impl Future<Output = Result<(), ActuatorError>> + Send {
        (**self).stop()
    }
}

impl<T: PresenceProbe> PresenceProbe for Arc<T> {
    fn list_connected_players(
        &self,
    ) -> impl Future<Output = Result<OnlinePlayers, ActuatorError>> + Send {
        (**self).list_connected_players()
    }
}

/// Runs `fut` with an upper bound of `limit`.
///
/// Elapsing the bound yields [`ActuatorError::Timeout`] tagged with
/// `operation`, so logs say which collaborator stalled.
pub async fn bounded<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ActuatorError>
where
    F: Future<Output = Result<T, ActuatorError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ActuatorError::Timeout {
            operation,
            after: limit,
        }),
    }
}
