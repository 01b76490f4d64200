//! The per-root authorization record.

use std::collections::BTreeSet;
use std::net::IpAddr;

use portwarden_protocol::{EntrySnapshot, RootIdentity, SlotSnapshot};

use crate::AliasSlot;
use crate::timer::ArmedTimer;

/// One grant, shared by the root and its aliases.
///
/// Invariants, upheld by the registry:
/// - at most one timer is armed (the `Option` makes two impossible)
/// - `timer` is `None` whenever a slot is logged in
/// - an entry with no logged-in slot and no timer is removed at once
#[derive(Debug)]
pub(crate) struct AuthorizationEntry {
    pub(crate) root: RootIdentity,
    pub(crate) address: IpAddr,
    /// Slots currently logged in. Empty means nobody is on.
    pub(crate) logged_in: BTreeSet<AliasSlot>,
    pub(crate) timer: Option<ArmedTimer>,
}

impl AuthorizationEntry {
    pub(crate) fn new(root: RootIdentity, address: IpAddr, timer: ArmedTimer) -> Self {
        Self {
            root,
            address,
            logged_in: BTreeSet::new(),
            timer: Some(timer),
        }
    }

    pub(crate) fn is_logged_in(&self, slot: AliasSlot) -> bool {
        self.logged_in.contains(&slot)
    }

    pub(crate) fn active_slots(&self) -> usize {
        self.logged_in.len()
    }

    pub(crate) fn has_active_slot(&self) -> bool {
        !self.logged_in.is_empty()
    }

    /// Whether this entry justifies keeping the resource up.
    pub(crate) fn is_live(&self) -> bool {
        self.has_active_slot() || self.timer.is_some()
    }

    /// Cancels the armed timer, if any.
    pub(crate) fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            tracing::debug!(
                root = %self.root,
                kind = ?timer.kind,
                epoch = timer.epoch,
                "timer cancelled"
            );
            timer.cancel();
        }
    }

    pub(crate) fn snapshot(&self, slot_count: usize) -> EntrySnapshot {
        let slots = (0..slot_count)
            .map(|i| {
                let slot = AliasSlot::new(i as u8);
                SlotSnapshot {
                    slot: slot.index(),
                    identity: slot.login_name(&self.root),
                    logged_in: self.is_logged_in(slot),
                }
            })
            .collect();

        EntrySnapshot {
            root: self.root.clone(),
            address: self.address,
            slots,
            pending_timer: self.timer.as_ref().map(|t| t.kind.into()),
        }
    }
}
