//! The authorization registry: every live grant and its expiry timer.
//!
//! This is the central piece of the access layer. It's responsible for:
//! - Opening firewall access when a grant is issued
//! - Tracking which alias slots of each root are logged in
//! - Arming and cancelling grant/grace timers
//! - Closing access when a timer expires or an operator revokes
//!
//! # Concurrency note
//!
//! All state sits behind one `tokio::sync::Mutex`, and every operation,
//! timer callbacks included, holds it for its full duration, actuator
//! calls too. Mutations therefore never interleave, and a close issued by
//! an expiring timer can't race a fresh grant for the same address. A
//! slow actuator delays other operations by at most `actuator_timeout`,
//! the bound on every actuator call.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use portwarden_actuator::{AccessActuator, bounded};
use portwarden_protocol::{EntrySnapshot, ReconcileReport, RootIdentity};
use tokio::sync::Mutex;

use crate::entry::AuthorizationEntry;
use crate::timer::{ArmedTimer, TimerKind};
use crate::{AccessConfig, AccessError, AliasSlot, ResolvedIdentity, resolve};

/// What a successful [`AccessRegistry::grant`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantReceipt {
    pub root: RootIdentity,
    pub address: IpAddr,
    /// How long the grant waits for a first login.
    pub expires_in: Duration,
    /// `true` if an existing entry for this root was replaced.
    pub superseded: bool,
}

/// Result of [`AccessRegistry::confirm_login`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The slot is now logged in and any pending timer was cancelled.
    LoggedIn { slot: AliasSlot },
    /// The slot was already logged in; nothing changed.
    AlreadyLoggedIn { slot: AliasSlot },
}

/// Result of [`AccessRegistry::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// The slot is now logged out. `grace_armed` says whether this left
    /// the entry idle and started its grace timer.
    Disconnected { slot: AliasSlot, grace_armed: bool },
    /// No grant is tracked for this root. Not an error.
    NotAuthorized,
}

/// Owns every authorization entry and the timers that expire them.
///
/// Cheap to clone; clones share the same state.
///
/// ## Lifecycle
///
/// ```text
///  grant() ──→ [granted, grant timer] ──(no login in window)──→ removed + close
///                    │
///              confirm_login()
///                    ▼
///            [≥1 slot logged in] ←──── confirm_login() ────┐
///                    │                                     │
///            disconnect() of last slot                     │
///                    ▼                                     │
///            [idle, grace timer] ──────────────────────────┘
///                    │
///              (no login in window)
///                    ▼
///             removed + close
/// ```
///
/// `grant()` on an existing root starts over from the top; `revoke()`
/// removes the entry from any state.
pub struct AccessRegistry<A: AccessActuator> {
    shared: Arc<Shared<A>>,
}

struct Shared<A> {
    state: Mutex<RegistryState>,
    actuator: A,
    config: AccessConfig,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<RootIdentity, AuthorizationEntry>,
    /// Source of timer epochs. Monotonic for the registry's lifetime, so
    /// an epoch is never reused even across delete/re-create of a root.
    next_epoch: u64,
}

impl RegistryState {
    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    /// `true` if some tracked entry still relies on `address` being open.
    fn address_in_use(&self, address: IpAddr) -> bool {
        self.entries.values().any(|entry| entry.address == address)
    }
}

impl<A: AccessActuator> Clone for AccessRegistry<A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: AccessActuator> AccessRegistry<A> {
    /// Creates an empty registry driving `actuator`.
    pub fn new(config: AccessConfig, actuator: A) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RegistryState::default()),
                actuator,
                config: config.validated(),
            }),
        }
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &AccessConfig {
        &self.shared.config
    }

    /// Resolves a raw login name with this registry's alias policy.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedIdentity, AccessError> {
        resolve(raw, self.shared.config.max_aliases)
    }

    /// Grants `root` access from `address`.
    ///
    /// Access is opened first; the entry is committed only once the open
    /// succeeded. An existing entry for `root` is replaced: its timer is
    /// cancelled and its login history discarded. If the replaced entry
    /// was for a different address, that address is closed afterwards
    /// unless another root is still granted from it.
    ///
    /// # Errors
    /// Returns [`AccessError::Actuator`] if opening access failed or timed
    /// out. The registry is left exactly as it was.
    pub async fn grant(
        &self,
        root: RootIdentity,
        address: IpAddr,
    ) -> Result<GrantReceipt, AccessError> {
        let mut state = self.shared.state.lock().await;

        bounded(
            "open",
            self.shared.config.actuator_timeout,
            self.shared.actuator.open(address, root.as_str()),
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(%root, %address, error = %e, "grant not committed: open failed");
        })?;

        let previous_address = state.entries.remove(&root).map(|mut previous| {
            previous.cancel_timer();
            previous.address
        });

        let timer = self.arm(&mut state, &root, TimerKind::Grant);
        let epoch = timer.epoch;
        state
            .entries
            .insert(root.clone(), AuthorizationEntry::new(root.clone(), address, timer));

        tracing::info!(
            %root,
            %address,
            epoch,
            superseded = previous_address.is_some(),
            "access granted"
        );

        if let Some(old) = previous_address.filter(|old| *old != address) {
            self.close_quietly(&state, &root, old).await;
        }

        Ok(GrantReceipt {
            root,
            address,
            expires_in: self.shared.config.grant_window,
            superseded: previous_address.is_some(),
        })
    }

    /// Records that `raw` (a root or alias) finished logging in.
    ///
    /// Any pending grant or grace timer on the root is cancelled: a live
    /// session now holds the grant.
    ///
    /// # Errors
    /// - [`AccessError::InvalidIdentity`]: `raw` doesn't resolve
    /// - [`AccessError::NotAuthorized`]: no grant for the root
    /// - [`AccessError::SlotLimitReached`]: the root is at its cap
    pub async fn confirm_login(&self, raw: &str) -> Result<LoginOutcome, AccessError> {
        let identity = self.resolve(raw)?;
        let mut state = self.shared.state.lock().await;
        self.login_slot(&mut state, &identity)
    }

    /// Records that `raw` (a root or alias) left the game server.
    ///
    /// When this leaves every slot of the root logged out, a grace timer
    /// starts. If a timer is already pending (the root never logged in at
    /// all), it is left untouched.
    ///
    /// # Errors
    /// Returns [`AccessError::InvalidIdentity`] if `raw` doesn't resolve.
    /// An untracked root is reported as [`DisconnectOutcome::NotAuthorized`].
    pub async fn disconnect(&self, raw: &str) -> Result<DisconnectOutcome, AccessError> {
        let identity = self.resolve(raw)?;
        let mut state = self.shared.state.lock().await;
        Ok(self.release_slot(&mut state, &identity))
    }

    /// Removes `root`'s grant immediately and closes its address, unless
    /// another root is still granted from the same address.
    ///
    /// # Errors
    /// - [`AccessError::NotAuthorized`]: nothing tracked for `root`
    /// - [`AccessError::Actuator`]: the entry is gone but the close
    ///   failed; the caller may retry the close out of band
    pub async fn revoke(&self, root: &RootIdentity) -> Result<(), AccessError> {
        let mut state = self.shared.state.lock().await;

        let mut entry = state
            .entries
            .remove(root)
            .ok_or_else(|| AccessError::NotAuthorized(root.clone()))?;
        entry.cancel_timer();

        tracing::info!(%root, address = %entry.address, "access revoked");

        if state.address_in_use(entry.address) {
            tracing::debug!(
                %root,
                address = %entry.address,
                "address shared with another grant, left open"
            );
            return Ok(());
        }

        bounded(
            "close",
            self.shared.config.actuator_timeout,
            self.shared.actuator.close(entry.address),
        )
        .await
        .inspect_err(|e| {
            tracing::warn!(
                %root,
                address = %entry.address,
                error = %e,
                "close after revoke failed"
            );
        })?;
        Ok(())
    }

    /// Brings slot state in line with the full list of names the game
    /// server reports online.
    ///
    /// Tracked slots missing from `online` are disconnected first, then
    /// online names that resolve to a tracked root are logged in. Names
    /// that don't resolve, or whose root isn't tracked, are ignored.
    pub async fn reconcile(&self, online: &[String]) -> ReconcileReport {
        let max_aliases = self.shared.config.max_aliases;
        let present: HashSet<ResolvedIdentity> = online
            .iter()
            .filter_map(|name| resolve(name, max_aliases).ok())
            .collect();

        let mut state = self.shared.state.lock().await;
        let mut report = ReconcileReport::default();

        let stale: Vec<ResolvedIdentity> = state
            .entries
            .values()
            .flat_map(|entry| {
                entry.logged_in.iter().map(move |slot| ResolvedIdentity {
                    root: entry.root.clone(),
                    slot: *slot,
                })
            })
            .filter(|identity| !present.contains(identity))
            .collect();

        for identity in &stale {
            self.release_slot(&mut state, identity);
            report.disconnected += 1;
        }

        for identity in &present {
            match self.login_slot(&mut state, identity) {
                Ok(LoginOutcome::LoggedIn { .. }) => report.logged_in += 1,
                Ok(LoginOutcome::AlreadyLoggedIn { .. }) => {}
                Err(AccessError::NotAuthorized(_)) => {}
                Err(_) => report.rejected += 1,
            }
        }

        if report != ReconcileReport::default() {
            tracing::info!(
                logged_in = report.logged_in,
                disconnected = report.disconnected,
                rejected = report.rejected,
                "reconciled against online list"
            );
        }
        report
    }

    /// Read-only listing of every entry, sorted by root.
    pub async fn snapshot(&self) -> Vec<EntrySnapshot> {
        let state = self.shared.state.lock().await;
        let slot_count = self.shared.config.slot_count();
        let mut entries: Vec<EntrySnapshot> = state
            .entries
            .values()
            .map(|entry| entry.snapshot(slot_count))
            .collect();
        entries.sort_by(|a, b| a.root.cmp(&b.root));
        entries
    }

    /// `true` if any entry has a logged-in slot or a pending timer.
    ///
    /// This is the only view of the registry the idleness aggregator gets.
    pub async fn has_activity(&self) -> bool {
        let state = self.shared.state.lock().await;
        state.entries.values().any(AuthorizationEntry::is_live)
    }

    /// Number of tracked entries.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.entries.len()
    }

    /// `true` if nothing is tracked.
    pub async fn is_empty(&self) -> bool {
        self.shared.state.lock().await.entries.is_empty()
    }

    // -----------------------------------------------------------------
    // Internals. Callers hold the state lock.
    // -----------------------------------------------------------------

    fn login_slot(
        &self,
        state: &mut RegistryState,
        identity: &ResolvedIdentity,
    ) -> Result<LoginOutcome, AccessError> {
        let ResolvedIdentity { root, slot } = identity;
        let slot = *slot;

        let entry = state
            .entries
            .get_mut(root)
            .ok_or_else(|| AccessError::NotAuthorized(root.clone()))?;

        if entry.is_logged_in(slot) {
            tracing::debug!(%identity, "login already recorded");
            return Ok(LoginOutcome::AlreadyLoggedIn { slot });
        }

        let limit = self.shared.config.max_active_slots;
        if entry.active_slots() >= limit {
            tracing::warn!(%identity, limit, "login refused: slot limit reached");
            return Err(AccessError::SlotLimitReached {
                root: root.clone(),
                limit,
            });
        }

        entry.logged_in.insert(slot);
        entry.cancel_timer();

        tracing::info!(
            %identity,
            active = entry.active_slots(),
            "login confirmed"
        );
        Ok(LoginOutcome::LoggedIn { slot })
    }

    fn release_slot(
        &self,
        state: &mut RegistryState,
        identity: &ResolvedIdentity,
    ) -> DisconnectOutcome {
        let ResolvedIdentity { root, slot } = identity;
        let slot = *slot;

        if !state.entries.contains_key(root) {
            tracing::debug!(%identity, "disconnect for untracked root ignored");
            return DisconnectOutcome::NotAuthorized;
        }

        // Arm before borrowing the entry: arming needs the epoch counter.
        let needs_grace = state
            .entries
            .get(root)
            .is_some_and(|entry| {
                let remaining = entry.active_slots() - usize::from(entry.is_logged_in(slot));
                remaining == 0 && entry.timer.is_none()
            });
        let grace = needs_grace.then(|| self.arm(state, root, TimerKind::Grace));

        let Some(entry) = state.entries.get_mut(root) else {
            return DisconnectOutcome::NotAuthorized;
        };
        entry.logged_in.remove(&slot);

        let grace_armed = grace.is_some();
        if let Some(timer) = grace {
            tracing::info!(
                %identity,
                epoch = timer.epoch,
                window = ?self.shared.config.grace_window,
                "last slot disconnected, grace period started"
            );
            entry.timer = Some(timer);
        } else {
            tracing::info!(
                %identity,
                active = entry.active_slots(),
                "slot disconnected"
            );
        }

        DisconnectOutcome::Disconnected { slot, grace_armed }
    }

    /// Spawns an expiry task for `root` and returns its handle.
    fn arm(&self, state: &mut RegistryState, root: &RootIdentity, kind: TimerKind) -> ArmedTimer {
        let epoch = state.bump_epoch();
        let window = match kind {
            TimerKind::Grant => self.shared.config.grant_window,
            TimerKind::Grace => self.shared.config.grace_window,
        };

        let weak: Weak<Shared<A>> = Arc::downgrade(&self.shared);
        let root = root.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // The registry may have been dropped while we slept.
            if let Some(shared) = weak.upgrade() {
                AccessRegistry { shared }.expire(root, kind, epoch).await;
            }
        });

        ArmedTimer::new(kind, epoch, handle)
    }

    /// Timer callback: removes `root` if the timer that fired is still
    /// the one armed on it and nobody is logged in.
    async fn expire(&self, root: RootIdentity, kind: TimerKind, epoch: u64) {
        let mut state = self.shared.state.lock().await;

        let Some(entry) = state.entries.get_mut(&root) else {
            tracing::debug!(%root, ?kind, epoch, "stale timer: entry gone");
            return;
        };
        if entry.timer.as_ref().map(|t| t.epoch) != Some(epoch) {
            tracing::debug!(%root, ?kind, epoch, "stale timer: superseded");
            return;
        }
        // This task is the timer; detach rather than abort ourselves.
        entry.timer = None;

        if entry.has_active_slot() {
            tracing::debug!(%root, ?kind, epoch, "timer fired with a live slot, keeping entry");
            return;
        }

        let Some(entry) = state.entries.remove(&root) else {
            return;
        };
        tracing::info!(%root, address = %entry.address, ?kind, "grant expired");

        self.close_quietly(&state, &root, entry.address).await;
    }

    /// Closes `address`, logging instead of propagating a failure. An
    /// address another entry still holds is left open.
    async fn close_quietly(&self, state: &RegistryState, root: &RootIdentity, address: IpAddr) {
        if state.address_in_use(address) {
            tracing::debug!(%root, %address, "address shared with another grant, left open");
            return;
        }
        if let Err(e) = bounded(
            "close",
            self.shared.config.actuator_timeout,
            self.shared.actuator.close(address),
        )
        .await
        {
            tracing::warn!(%root, %address, error = %e, "close failed");
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
