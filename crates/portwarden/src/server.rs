//! HTTP surface: router, shared state and the server loop.
//!
//! Routes:
//!
//! | Route | Access | Calls |
//! |---|---|---|
//! | `POST /authorize` | signed | `grant` |
//! | `POST /logged` | loopback | `confirm_login` |
//! | `POST /deauthorize` | loopback | `disconnect` |
//! | `POST /revoke` | loopback | `revoke` |
//! | `POST /reconcile` | loopback | `reconcile` |
//! | `GET /entries` | loopback | `snapshot` |
//! | `GET /status` | public | presence probe |
//!
//! Loopback routes sit behind [`require_loopback`]; anything else gets
//! `403 forbidden`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{ConnectInfo, Request};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use portwarden_access::AccessRegistry;
use portwarden_actuator::{AccessActuator, PresenceProbe};
use tokio::net::TcpListener;

use crate::PortwardenError;
use crate::handler;
use crate::signature::SignatureVerifier;

/// Shared state passed to every handler.
///
/// Wrapped in `Arc` so it can be cheaply cloned across requests.
pub struct AppState<A: AccessActuator, P: PresenceProbe> {
    pub(crate) registry: AccessRegistry<A>,
    pub(crate) probe: P,
    pub(crate) verifier: Option<SignatureVerifier>,
    pub(crate) game_port: u16,
    pub(crate) probe_timeout: Duration,
}

impl<A: AccessActuator, P: PresenceProbe> AppState<A, P> {
    /// State with no signature check, game port 24111 and a 1.5 s probe
    /// bound. Use the `with_*` methods to change them.
    pub fn new(registry: AccessRegistry<A>, probe: P) -> Self {
        Self {
            registry,
            probe,
            verifier: None,
            game_port: 24111,
            probe_timeout: Duration::from_millis(1500),
        }
    }

    /// Requires `/authorize` to carry a valid signature. `None` disables
    /// the check.
    pub fn with_verifier(mut self, verifier: Option<SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn with_game_port(mut self, port: u16) -> Self {
        self.game_port = port;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &AccessRegistry<A> {
        &self.registry
    }
}

/// Builds the router over `state`.
///
/// Must be served with `into_make_service_with_connect_info::<SocketAddr>()`
/// so the loopback check can see the peer address.
pub fn router<A, P>(state: Arc<AppState<A, P>>) -> Router
where
    A: AccessActuator,
    P: PresenceProbe,
{
    let local = Router::new()
        .route("/logged", post(handler::logged::<A, P>))
        .route("/deauthorize", post(handler::deauthorize::<A, P>))
        .route("/revoke", post(handler::revoke::<A, P>))
        .route("/reconcile", post(handler::reconcile::<A, P>))
        .route("/entries", get(handler::entries::<A, P>))
        .route_layer(middleware::from_fn(require_loopback));

    Router::new()
        .route("/authorize", post(handler::authorize::<A, P>))
        .route("/status", get(handler::status::<A, P>))
        .merge(local)
        .with_state(state)
}

/// Rejects requests whose peer isn't a loopback address.
pub async fn require_loopback(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if peer.ip().to_canonical().is_loopback() {
        next.run(request).await
    } else {
        tracing::warn!(%peer, path = %request.uri().path(), "non-local call to local-only route");
        PortwardenError::Forbidden.into_response()
    }
}

/// A bound Portwarden HTTP server.
///
/// Call [`run()`](Self::run) to start serving.
pub struct PortwardenServer<A: AccessActuator, P: PresenceProbe> {
    listener: TcpListener,
    state: Arc<AppState<A, P>>,
}

impl<A, P> PortwardenServer<A, P>
where
    A: AccessActuator,
    P: PresenceProbe,
{
    /// Binds `addr`. Port 0 picks a free port; see
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: SocketAddr, state: AppState<A, P>) -> Result<Self, PortwardenError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(state),
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), PortwardenError> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, signed = self.state.verifier.is_some(), "Portwarden listening");

        let app = router(self.state).into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Portwarden HTTP server stopped");
        Ok(())
    }
}
