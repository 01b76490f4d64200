//! Route handlers. Each one translates a request into a single registry
//! call and the result into an [`Outcome`].

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use portwarden_access::{DisconnectOutcome, LoginOutcome};
use portwarden_actuator::{AccessActuator, PresenceProbe, bounded};
use portwarden_protocol::{
    EntrySnapshot, GrantRequest, Outcome, PlayerEvent, ReconcileReport, ReconcileRequest,
    RootIdentity, StatusReport,
};

use crate::PortwardenError;
use crate::server::AppState;

type Shared<A, P> = State<Arc<AppState<A, P>>>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, PortwardenError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| PortwardenError::InvalidBody(rejection.body_text()))
}

/// `POST /authorize`: verify the signature, then grant.
///
/// The body is taken raw because the signature covers its exact bytes.
pub(crate) async fn authorize<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
    headers: HeaderMap,
    raw: Bytes,
) -> Result<Json<Outcome>, PortwardenError> {
    if let Some(verifier) = &state.verifier {
        verifier.verify_headers(&headers, &raw)?;
    }

    let request: GrantRequest = serde_json::from_slice(&raw)
        .map_err(|e| PortwardenError::InvalidBody(e.to_string()))?;
    let (root, address) = request.parse()?;

    tracing::info!(%root, %address, "authorize requested");
    let receipt = state.registry.grant(root, address).await?;

    Ok(Json(Outcome::success(format!(
        "Player {} authorized",
        receipt.root
    ))))
}

/// `POST /logged`: the game server saw a login complete.
pub(crate) async fn logged<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
    payload: Result<Json<PlayerEvent>, JsonRejection>,
) -> Result<Json<Outcome>, PortwardenError> {
    let event = body(payload)?;
    let name = event.username()?;

    let message = match state.registry.confirm_login(name).await? {
        LoginOutcome::LoggedIn { .. } => format!("Player {name} logged in"),
        LoginOutcome::AlreadyLoggedIn { .. } => format!("Player {name} already logged in"),
    };
    Ok(Json(Outcome::success(message)))
}

/// `POST /deauthorize`: the game server saw a player leave.
pub(crate) async fn deauthorize<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
    payload: Result<Json<PlayerEvent>, JsonRejection>,
) -> Result<Json<Outcome>, PortwardenError> {
    let event = body(payload)?;
    let name = event.username()?;

    let message = match state.registry.disconnect(name).await? {
        DisconnectOutcome::Disconnected { .. } => format!("Player {name} deauthorized"),
        DisconnectOutcome::NotAuthorized => format!("Player {name} was not authorized"),
    };
    Ok(Json(Outcome::success(message)))
}

/// `POST /revoke`: drop a root's grant immediately.
pub(crate) async fn revoke<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
    payload: Result<Json<PlayerEvent>, JsonRejection>,
) -> Result<Json<Outcome>, PortwardenError> {
    let event = body(payload)?;
    let root = RootIdentity::new(event.username()?)?;

    state.registry.revoke(&root).await?;
    Ok(Json(Outcome::success(format!("Access for {root} revoked"))))
}

/// `POST /reconcile`: align slot state with a full online listing.
pub(crate) async fn reconcile<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
    payload: Result<Json<ReconcileRequest>, JsonRejection>,
) -> Result<Json<ReconcileReport>, PortwardenError> {
    let request = body(payload)?;
    Ok(Json(state.registry.reconcile(&request.players).await))
}

pub(crate) async fn entries<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
) -> Json<Vec<EntrySnapshot>> {
    Json(state.registry.snapshot().await)
}

/// `GET /status`: who is on the game server right now.
///
/// Never fails: an unreachable game server is reported as offline.
pub(crate) async fn status<A: AccessActuator, P: PresenceProbe>(
    State(state): Shared<A, P>,
) -> Json<StatusReport> {
    let result = bounded(
        "probe",
        state.probe_timeout,
        state.probe.list_connected_players(),
    )
    .await;

    let report = match result {
        Ok(online) => StatusReport {
            ok: true,
            port: Some(online.port.unwrap_or(state.game_port)),
            players: online.names(),
            message: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "status check failed");
            StatusReport {
                ok: false,
                port: None,
                players: Vec::new(),
                message: Some("server offline".to_string()),
            }
        }
    };
    Json(report)
}
