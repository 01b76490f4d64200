//! Development stand-in that logs every action and always succeeds.

use std::net::IpAddr;

use crate::{AccessActuator, ActuatorError, ResourceActuator};

/// Accepts every open/close/stop without touching anything.
///
/// Selected by `DRY_RUN=1`, so the supervisor can run on a workstation
/// without firewall or cloud credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunActuator;

impl AccessActuator for DryRunActuator {
    async fn open(&self, address: IpAddr, label: &str) -> Result<(), ActuatorError> {
        tracing::info!(%address, label, "dry run: open access");
        Ok(())
    }

    async fn close(&self, address: IpAddr) -> Result<(), ActuatorError> {
        tracing::info!(%address, "dry run: close access");
        Ok(())
    }
}

impl ResourceActuator for DryRunActuator {
    async fn stop(&self) -> Result<(), ActuatorError> {
        tracing::info!("dry run: stop resource");
        Ok(())
    }
}
