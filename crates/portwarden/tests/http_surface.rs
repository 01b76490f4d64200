//! End-to-end tests for the HTTP surface.
//!
//! Each test binds a real server on 127.0.0.1:0 with a recording firewall
//! and a scripted presence probe, then talks to it with `reqwest`.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::connect_info::MockConnectInfo;
use portwarden::access::{AccessConfig, AccessRegistry};
use portwarden::actuator::{AccessActuator, ActuatorError, PresenceProbe};
use portwarden::protocol::{
    EntrySnapshot, OnlinePlayer, OnlinePlayers, Outcome, ReconcileReport, StatusReport,
};
use portwarden::{
    AppState, PortwardenServer, SIGNATURE_HEADER, SignatureVerifier, TIMESTAMP_HEADER,
    now_millis, router,
};
use reqwest::StatusCode;

// =========================================================================
// Helpers
// =========================================================================

#[derive(Default)]
struct Firewall {
    opened: Mutex<Vec<IpAddr>>,
    closed: Mutex<Vec<IpAddr>>,
    fail_open: AtomicBool,
}

impl AccessActuator for Firewall {
    async fn open(&self, address: IpAddr, _label: &str) -> Result<(), ActuatorError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ActuatorError::Rejected("rule quota exceeded".into()));
        }
        self.opened.lock().unwrap().push(address);
        Ok(())
    }

    async fn close(&self, address: IpAddr) -> Result<(), ActuatorError> {
        self.closed.lock().unwrap().push(address);
        Ok(())
    }
}

/// Returns the configured listing, or fails when there is none.
#[derive(Default)]
struct Probe(Mutex<Option<OnlinePlayers>>);

impl Probe {
    fn set(&self, listing: Option<OnlinePlayers>) {
        *self.0.lock().unwrap() = listing;
    }
}

impl PresenceProbe for Probe {
    async fn list_connected_players(&self) -> Result<OnlinePlayers, ActuatorError> {
        let listing = self.0.lock().unwrap().clone();
        listing.ok_or_else(|| ActuatorError::Rejected("connection refused".into()))
    }
}

const SECRET: &str = "test-secret-key";

struct Harness {
    base: String,
    client: reqwest::Client,
    firewall: Arc<Firewall>,
    probe: Arc<Probe>,
    verifier: SignatureVerifier,
}

fn state(firewall: &Arc<Firewall>, probe: &Arc<Probe>) -> AppState<Arc<Firewall>, Arc<Probe>> {
    let registry = AccessRegistry::new(AccessConfig::default(), Arc::clone(firewall));
    AppState::new(registry, Arc::clone(probe))
        .with_verifier(Some(SignatureVerifier::new(
            SECRET,
            SignatureVerifier::DEFAULT_MAX_AGE,
        )))
        .with_game_port(24111)
        .with_probe_timeout(Duration::from_millis(500))
}

fn harness(addr: SocketAddr, firewall: Arc<Firewall>, probe: Arc<Probe>) -> Harness {
    Harness {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        firewall,
        probe,
        verifier: SignatureVerifier::new(SECRET, SignatureVerifier::DEFAULT_MAX_AGE),
    }
}

/// Starts the real server; requests arrive from loopback.
async fn start() -> Harness {
    let firewall = Arc::new(Firewall::default());
    let probe = Arc::new(Probe::default());
    let server = PortwardenServer::bind(
        "127.0.0.1:0".parse().unwrap(),
        state(&firewall, &probe),
    )
    .await
    .expect("should bind");
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(std::future::pending()));
    harness(addr, firewall, probe)
}

/// Starts the router with every request appearing to come from `peer`.
async fn start_as_peer(peer: SocketAddr) -> Harness {
    let firewall = Arc::new(Firewall::default());
    let probe = Arc::new(Probe::default());
    let app = router(Arc::new(state(&firewall, &probe))).layer(MockConnectInfo(peer));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server runs");
    });
    harness(addr, firewall, probe)
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn authorize_at(&self, body: &str, timestamp: u64) -> reqwest::Response {
        let signature = self.verifier.sign(timestamp, body.as_bytes());
        self.client
            .post(self.url("/authorize"))
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .body(body.to_string())
            .send()
            .await
            .unwrap()
    }

    async fn authorize(&self, body: &str) -> reqwest::Response {
        self.authorize_at(body, now_millis()).await
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> reqwest::Response {
        self.client.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn entries(&self) -> Vec<EntrySnapshot> {
        self.client
            .get(self.url("/entries"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }
}

const STEVE: &str = r#"{"ip":"1.2.3.4","username":"Steve"}"#;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

// =========================================================================
// /authorize
// =========================================================================

#[tokio::test]
async fn test_authorize_signed_request_grants_access() {
    let h = start().await;

    let resp = h.authorize(STEVE).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Outcome = resp.json().await.unwrap();
    assert!(outcome.ok);
    assert_eq!(outcome.message.as_deref(), Some("Player Steve authorized"));
    assert_eq!(*h.firewall.opened.lock().unwrap(), vec![ip("1.2.3.4")]);

    let entries = h.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].root.as_str(), "Steve");
    assert_eq!(entries[0].address, ip("1.2.3.4"));
}

#[tokio::test]
async fn test_authorize_without_headers_is_missing_signature() {
    let h = start().await;

    let resp = h
        .client
        .post(h.url("/authorize"))
        .header("content-type", "application/json")
        .body(STEVE)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let outcome: Outcome = resp.json().await.unwrap();
    assert!(!outcome.ok);
    assert_eq!(outcome.error.as_deref(), Some("missing signature"));
    assert!(h.firewall.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_authorize_wrong_signature_is_forbidden() {
    let h = start().await;
    let now = now_millis();
    let forged =
        SignatureVerifier::new("other", Duration::from_secs(300)).sign(now, STEVE.as_bytes());

    let resp = h
        .client
        .post(h.url("/authorize"))
        .header(SIGNATURE_HEADER, forged)
        .header(TIMESTAMP_HEADER, now.to_string())
        .body(STEVE)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let outcome: Outcome = resp.json().await.unwrap();
    assert_eq!(outcome.error.as_deref(), Some("invalid signature"));
}

#[tokio::test]
async fn test_authorize_old_timestamp_is_stale() {
    let h = start().await;

    let resp = h.authorize_at(STEVE, now_millis() - 10 * 60 * 1000).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let outcome: Outcome = resp.json().await.unwrap();
    assert_eq!(outcome.error.as_deref(), Some("stale signature"));
}

#[tokio::test]
async fn test_authorize_bad_fields_are_bad_request() {
    let h = start().await;

    for body in [
        r#"{"ip":"1.2.3.4","username":"Steve-1"}"#,
        r#"{"ip":"1.2.3.4"}"#,
        r#"{"ip":"not-an-ip","username":"Steve"}"#,
        r#"not json"#,
    ] {
        let resp = h.authorize(body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        let outcome: Outcome = resp.json().await.unwrap();
        assert!(!outcome.ok);
    }
    assert!(h.entries().await.is_empty());
}

#[tokio::test]
async fn test_authorize_firewall_failure_is_bad_gateway_and_not_committed() {
    let h = start().await;
    h.firewall.fail_open.store(true, Ordering::SeqCst);

    let resp = h.authorize(STEVE).await;

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let outcome: Outcome = resp.json().await.unwrap();
    assert!(outcome.error.unwrap().contains("rule quota exceeded"));
    assert!(h.entries().await.is_empty());
}

// =========================================================================
// /logged, /deauthorize, /revoke
// =========================================================================

#[tokio::test]
async fn test_logged_before_grant_is_forbidden() {
    let h = start().await;

    let resp = h.post("/logged", serde_json::json!({ "username": "Steve-1" })).await;

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logged_after_grant_marks_slot() {
    let h = start().await;
    h.authorize(STEVE).await;

    let resp = h.post("/logged", serde_json::json!({ "username": "Steve-1" })).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Outcome = resp.json().await.unwrap();
    assert_eq!(outcome.message.as_deref(), Some("Player Steve-1 logged in"));

    let again: Outcome = h
        .post("/logged", serde_json::json!({ "username": "Steve-1" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(again.message.as_deref(), Some("Player Steve-1 already logged in"));

    let entries = h.entries().await;
    assert!(entries[0].slots[1].logged_in);
    assert_eq!(entries[0].pending_timer, None);
}

#[tokio::test]
async fn test_logged_bad_alias_or_body_is_bad_request() {
    let h = start().await;
    h.authorize(STEVE).await;

    let resp = h.post("/logged", serde_json::json!({ "username": "Steve-7" })).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h.post("/logged", serde_json::json!({})).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = h
        .client
        .post(h.url("/logged"))
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let outcome: Outcome = resp.json().await.unwrap();
    assert!(!outcome.ok);
}

#[tokio::test]
async fn test_deauthorize_untracked_is_ok() {
    let h = start().await;

    let resp = h.post("/deauthorize", serde_json::json!({ "username": "Ghost" })).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let outcome: Outcome = resp.json().await.unwrap();
    assert_eq!(outcome.message.as_deref(), Some("Player Ghost was not authorized"));
}

#[tokio::test]
async fn test_deauthorize_last_slot_starts_grace() {
    let h = start().await;
    h.authorize(STEVE).await;
    h.post("/logged", serde_json::json!({ "username": "Steve" })).await;

    let resp = h.post("/deauthorize", serde_json::json!({ "username": "Steve" })).await;

    assert_eq!(resp.status(), StatusCode::OK);
    let entries = h.entries().await;
    assert_eq!(
        entries[0].pending_timer,
        Some(portwarden::protocol::PendingTimer::Grace)
    );
}

#[tokio::test]
async fn test_revoke_closes_address() {
    let h = start().await;
    h.authorize(STEVE).await;

    let resp = h.post("/revoke", serde_json::json!({ "username": "Steve" })).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(*h.firewall.closed.lock().unwrap(), vec![ip("1.2.3.4")]);
    assert!(h.entries().await.is_empty());

    let resp = h.post("/revoke", serde_json::json!({ "username": "Steve" })).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

// =========================================================================
// /reconcile
// =========================================================================

#[tokio::test]
async fn test_reconcile_reports_counts() {
    let h = start().await;
    h.authorize(STEVE).await;

    let resp = h
        .post(
            "/reconcile",
            serde_json::json!({ "players": ["Steve", "Steve-2", "Stranger"] }),
        )
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    let report: ReconcileReport = resp.json().await.unwrap();
    assert_eq!(
        report,
        ReconcileReport { logged_in: 2, disconnected: 0, rejected: 0 }
    );
}

// =========================================================================
// /status
// =========================================================================

#[tokio::test]
async fn test_status_lists_players_and_falls_back_to_game_port() {
    let h = start().await;
    h.probe.set(Some(OnlinePlayers {
        players: vec![
            OnlinePlayer { name: "Steve".into(), ip: "1.2.3.4".into() },
            OnlinePlayer { name: "Alex".into(), ip: "5.6.7.8".into() },
        ],
        port: None,
    }));

    let report: StatusReport = h
        .client
        .get(h.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(report.ok);
    assert_eq!(report.port, Some(24111));
    assert_eq!(report.players, ["Steve", "Alex"]);
}

#[tokio::test]
async fn test_status_probe_failure_reports_offline() {
    let h = start().await;
    h.probe.set(None);

    let resp = h.client.get(h.url("/status")).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let report: StatusReport = resp.json().await.unwrap();
    assert!(!report.ok);
    assert_eq!(report.message.as_deref(), Some("server offline"));
}

// =========================================================================
// Loopback restriction
// =========================================================================

#[tokio::test]
async fn test_local_routes_reject_remote_peer() {
    let h = start_as_peer("203.0.113.9:40000".parse().unwrap()).await;

    for path in ["/logged", "/deauthorize", "/revoke", "/reconcile"] {
        let resp = h.post(path, serde_json::json!({ "username": "Steve" })).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{path}");
        let outcome: Outcome = resp.json().await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some("forbidden"));
    }
    let resp = h.client.get(h.url("/entries")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_public_routes_accept_remote_peer() {
    let h = start_as_peer("203.0.113.9:40000".parse().unwrap()).await;
    h.probe.set(Some(OnlinePlayers::default()));

    let resp = h.authorize(STEVE).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h.client.get(h.url("/status")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ipv4_mapped_loopback_counts_as_local() {
    let h = start_as_peer("[::ffff:127.0.0.1]:40000".parse().unwrap()).await;

    let resp = h.client.get(h.url("/entries")).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
}
