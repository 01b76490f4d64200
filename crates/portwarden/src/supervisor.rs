//! Wires configuration, collaborators, the registry, the idle loop and the
//! HTTP server into one running supervisor.

use std::future::Future;
use std::sync::Arc;

use portwarden_access::AccessRegistry;
use portwarden_actuator::{
    AccessActuator, CommandResourceActuator, DryRunActuator, HttpAccessActuator,
    HttpPresenceProbe, PresenceProbe, ResourceActuator,
};
use portwarden_idle::IdlenessAggregator;
use tokio::sync::oneshot;

use crate::PortwardenError;
use crate::config::SupervisorConfig;
use crate::server::{AppState, PortwardenServer};

/// Runs the supervisor until `shutdown` resolves.
///
/// In dry-run mode firewall and stop calls are only logged; the presence
/// probe is always real.
pub async fn run(
    config: SupervisorConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PortwardenError> {
    let probe = HttpPresenceProbe::new(config.probe_url.clone(), config.idle.probe_timeout)?;

    if config.dry_run {
        tracing::warn!("DRY_RUN set: firewall and stop calls are logged, not executed");
        return serve(config, DryRunActuator, DryRunActuator, probe, shutdown).await;
    }

    let firewall_url = config
        .firewall_url
        .clone()
        .ok_or_else(|| PortwardenError::Config("FIREWALL_URL is not set".into()))?;
    let access = HttpAccessActuator::new(firewall_url, config.access.actuator_timeout)?;
    let resource = config
        .stop_command
        .as_deref()
        .and_then(CommandResourceActuator::from_command_line)
        .ok_or_else(|| PortwardenError::Config("STOP_COMMAND is not set".into()))?;

    serve(config, access, resource, probe, shutdown).await
}

async fn serve<A, R, P>(
    config: SupervisorConfig,
    access: A,
    resource: R,
    probe: P,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PortwardenError>
where
    A: AccessActuator,
    R: ResourceActuator,
    P: PresenceProbe,
{
    if config.auth_secret.is_none() {
        tracing::warn!("AUTH_SECRET not set: /authorize accepts unsigned requests");
    }

    let registry = AccessRegistry::new(config.access.clone(), access);
    let probe = Arc::new(probe);

    let state = AppState::new(registry.clone(), Arc::clone(&probe))
        .with_verifier(config.verifier())
        .with_game_port(config.game_port)
        .with_probe_timeout(config.idle.probe_timeout);
    let server = PortwardenServer::bind(config.bind, state).await?;

    let aggregator = IdlenessAggregator::new(config.idle.clone(), probe, resource, registry);
    let (stop_idle, idle_stopped) = oneshot::channel::<()>();
    let idle_task = tokio::spawn(aggregator.run(async move {
        let _ = idle_stopped.await;
    }));

    let result = server.run(shutdown).await;

    let _ = stop_idle.send(());
    if let Err(e) = idle_task.await {
        tracing::error!(error = %e, "idle loop ended abnormally");
    }
    result
}
