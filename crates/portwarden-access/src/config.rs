//! Access-layer configuration.

use std::time::Duration;

use tracing::warn;

/// Timing and policy knobs for the [`AccessRegistry`](crate::AccessRegistry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// How long a fresh grant waits for its first login before the
    /// firewall rule is closed. Default: 5 minutes.
    pub grant_window: Duration,

    /// How long an entry survives after its last logged-in slot
    /// disconnects. Default: 5 minutes.
    pub grace_window: Duration,

    /// Number of numbered aliases (`root-1` ..= `root-N`) a root may use.
    /// Default: 2.
    pub max_aliases: u8,

    /// Maximum slots logged in at once for one root. Clamped to
    /// `1..=max_aliases + 1`. Default: 3.
    pub max_active_slots: usize,

    /// Upper bound on each open/close call. Default: 10 seconds.
    pub actuator_timeout: Duration,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            grant_window: Duration::from_secs(5 * 60),
            grace_window: Duration::from_secs(5 * 60),
            max_aliases: 2,
            max_active_slots: 3,
            actuator_timeout: Duration::from_secs(10),
        }
    }
}

impl AccessConfig {
    /// Total number of slots a root has (root + aliases).
    pub fn slot_count(&self) -> usize {
        self.max_aliases as usize + 1
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`AccessRegistry::new`](crate::AccessRegistry::new).
    pub fn validated(mut self) -> Self {
        let slots = self.slot_count();
        if self.max_active_slots == 0 || self.max_active_slots > slots {
            let clamped = self.max_active_slots.clamp(1, slots);
            warn!(
                requested = self.max_active_slots,
                clamped, "max_active_slots out of range, clamping"
            );
            self.max_active_slots = clamped;
        }
        if self.actuator_timeout.is_zero() {
            warn!("actuator_timeout is zero, using default");
            self.actuator_timeout = Self::default().actuator_timeout;
        }
        self
    }
}
