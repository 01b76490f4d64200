//! Grant and grace timer handles.
//!
//! A timer is a spawned task that sleeps for its window and then asks the
//! registry to expire the entry. Each armed timer carries an epoch drawn
//! from a registry-wide counter. When the task wakes it compares that
//! epoch with the one stored on the entry; any mismatch means the timer
//! was superseded in the meantime and the callback does nothing.
//!
//! Cancelling also aborts the task, but the epoch check is what makes a
//! cancel that races an already-fired timer harmless.

use portwarden_protocol::PendingTimer;
use tokio::task::JoinHandle;

/// Which expiry class a timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Armed by `grant`; fires if nobody ever logs in.
    Grant,
    /// Armed by `disconnect` once every slot is idle.
    Grace,
}

impl From<TimerKind> for PendingTimer {
    fn from(kind: TimerKind) -> Self {
        match kind {
            TimerKind::Grant => PendingTimer::Grant,
            TimerKind::Grace => PendingTimer::Grace,
        }
    }
}

/// Handle to a pending expiry task.
///
/// Dropping the handle detaches the task; call [`ArmedTimer::cancel`] to
/// stop it.
#[derive(Debug)]
pub(crate) struct ArmedTimer {
    pub(crate) kind: TimerKind,
    pub(crate) epoch: u64,
    handle: JoinHandle<()>,
}

impl ArmedTimer {
    pub(crate) fn new(kind: TimerKind, epoch: u64, handle: JoinHandle<()>) -> Self {
        Self {
            kind,
            epoch,
            handle,
        }
    }

    /// Aborts the task. A no-op if it has already finished.
    pub(crate) fn cancel(self) {
        self.handle.abort();
    }
}
