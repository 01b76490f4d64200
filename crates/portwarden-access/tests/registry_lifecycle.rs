//! End-to-end lifecycle tests for `AccessRegistry`, driven only through the
//! public API with a recording actuator standing in for the firewall.
//!
//! All tests run with a paused clock; sleeping past a window fires the
//! registry's timers without real waiting.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portwarden_access::{
    AccessConfig, AccessError, AccessRegistry, AliasSlot, DisconnectOutcome,
    LoginOutcome,
};
use portwarden_actuator::{AccessActuator, ActuatorError};
use portwarden_protocol::{PendingTimer, RootIdentity};

#[derive(Default)]
struct Firewall {
    log: Mutex<Vec<String>>,
}

impl Firewall {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn closes(&self) -> usize {
        self.log().iter().filter(|l| l.starts_with("close")).count()
    }
}

impl AccessActuator for Firewall {
    async fn open(&self, address: IpAddr, label: &str) -> Result<(), ActuatorError> {
        self.log.lock().unwrap().push(format!("open {address} {label}"));
        Ok(())
    }

    async fn close(&self, address: IpAddr) -> Result<(), ActuatorError> {
        self.log.lock().unwrap().push(format!("close {address}"));
        Ok(())
    }
}

fn setup() -> (AccessRegistry<Arc<Firewall>>, Arc<Firewall>) {
    let firewall = Arc::new(Firewall::default());
    let registry = AccessRegistry::new(AccessConfig::default(), Arc::clone(&firewall));
    (registry, firewall)
}

fn root(name: &str) -> RootIdentity {
    RootIdentity::new(name).unwrap()
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

const WINDOW: Duration = Duration::from_secs(300);

#[tokio::test(start_paused = true)]
async fn test_grant_then_root_login_leaves_no_timer_and_slot_zero_set() {
    let (registry, _) = setup();

    for name in ["Steve", "alex_2", "X", "Player123"] {
        registry.grant(root(name), ip("10.0.0.1")).await.unwrap();
        registry.confirm_login(name).await.unwrap();
    }

    for entry in registry.snapshot().await {
        assert_eq!(entry.pending_timer, None, "{}", entry.root);
        assert!(entry.slots[0].logged_in, "{}", entry.root);
        assert!(entry.slots[1..].iter().all(|s| !s.logged_in));
    }
}

#[tokio::test(start_paused = true)]
async fn test_alias_login_before_any_grant_is_not_authorized() {
    let (registry, firewall) = setup();

    for raw in ["Steve-1", "Steve-2", "alex_2-1", "Player123-2"] {
        assert!(
            matches!(
                registry.confirm_login(raw).await,
                Err(AccessError::NotAuthorized(_))
            ),
            "{raw}"
        );
    }
    assert!(registry.is_empty().await);
    assert!(firewall.log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_steve_two_slot_session_closes_once_after_grace() {
    let (registry, firewall) = setup();

    registry.grant(root("Steve"), ip("1.2.3.4")).await.unwrap();
    assert_eq!(
        registry.confirm_login("Steve-1").await.unwrap(),
        LoginOutcome::LoggedIn { slot: AliasSlot::new(1) }
    );

    // Slot 0 was never logged in; slot 1 keeps the grant alive.
    let outcome = registry.disconnect("Steve").await.unwrap();
    assert_eq!(
        outcome,
        DisconnectOutcome::Disconnected { slot: AliasSlot::ROOT, grace_armed: false }
    );
    let snap = registry.snapshot().await;
    assert_eq!(snap.len(), 1);
    assert!(snap[0].slots[1].logged_in);
    assert_eq!(snap[0].pending_timer, None);

    let outcome = registry.disconnect("Steve-1").await.unwrap();
    assert_eq!(
        outcome,
        DisconnectOutcome::Disconnected { slot: AliasSlot::new(1), grace_armed: true }
    );
    assert_eq!(
        registry.snapshot().await[0].pending_timer,
        Some(PendingTimer::Grace)
    );

    tokio::time::sleep(WINDOW + Duration::from_secs(1)).await;

    assert!(registry.is_empty().await);
    assert_eq!(firewall.log(), ["open 1.2.3.4 Steve", "close 1.2.3.4"]);
}

#[tokio::test(start_paused = true)]
async fn test_three_slots_full_then_fourth_alias_changes_nothing() {
    let (registry, _) = setup();
    registry.grant(root("Steve"), ip("1.2.3.4")).await.unwrap();
    for raw in ["Steve", "Steve-1", "Steve-2"] {
        registry.confirm_login(raw).await.unwrap();
    }
    let before = registry.snapshot().await;

    // There is no fourth slot to log into.
    assert!(registry.confirm_login("Steve-3").await.is_err());
    // Re-confirming an occupied slot is idempotent, never a limit error.
    assert_eq!(
        registry.confirm_login("Steve-2").await.unwrap(),
        LoginOutcome::AlreadyLoggedIn { slot: AliasSlot::new(2) }
    );

    assert_eq!(registry.snapshot().await, before);
}

#[tokio::test(start_paused = true)]
async fn test_unconfirmed_grants_expire_independently() {
    let (registry, firewall) = setup();
    registry.grant(root("Early"), ip("1.1.1.1")).await.unwrap();
    tokio::time::sleep(Duration::from_secs(120)).await;
    registry.grant(root("Late"), ip("2.2.2.2")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(200)).await;
    let roots: Vec<_> = registry
        .snapshot()
        .await
        .into_iter()
        .map(|e| e.root.to_string())
        .collect();
    assert_eq!(roots, ["Late"]);

    tokio::time::sleep(Duration::from_secs(200)).await;
    assert!(registry.is_empty().await);
    assert_eq!(firewall.closes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_regrant_during_grace_starts_fresh_window() {
    let (registry, firewall) = setup();
    registry.grant(root("Steve"), ip("1.2.3.4")).await.unwrap();
    registry.confirm_login("Steve").await.unwrap();
    registry.disconnect("Steve").await.unwrap();
    tokio::time::sleep(Duration::from_secs(250)).await;

    registry.grant(root("Steve"), ip("1.2.3.4")).await.unwrap();
    let snap = registry.snapshot().await;
    assert_eq!(snap[0].pending_timer, Some(PendingTimer::Grant));
    assert!(snap[0].slots.iter().all(|s| !s.logged_in));

    // Past where grace would have fired.
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(registry.len().await, 1);
    assert_eq!(firewall.closes(), 0);

    tokio::time::sleep(Duration::from_secs(201)).await;
    assert!(registry.is_empty().await);
    assert_eq!(firewall.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_registry_timers_do_nothing() {
    let (registry, firewall) = setup();
    registry.grant(root("Steve"), ip("1.2.3.4")).await.unwrap();

    drop(registry);
    tokio::time::sleep(WINDOW * 2).await;

    assert_eq!(firewall.closes(), 0);
}
