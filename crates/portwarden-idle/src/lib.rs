//! Presence polling and idle shutdown for Portwarden.
//!
//! The [`IdlenessAggregator`] samples the game server's player list on a
//! fixed interval and stops the managed resource once enough consecutive
//! samples came back empty *and* the access registry reports no activity.
//!
//! # Integration
//!
//! One aggregator per supervisor, spawned next to the HTTP surface:
//!
//! ```ignore
//! let aggregator = IdlenessAggregator::new(config, probe, stopper, registry.clone());
//! tokio::spawn(aggregator.run(shutdown_signal()));
//! ```
//!
//! Every probe and stop call is bounded by the configured timeouts, so a
//! wedged collaborator costs one poll, never the loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use portwarden_access::AccessRegistry;
use portwarden_actuator::{AccessActuator, PresenceProbe, ResourceActuator, bounded};
use rand::Rng;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How a failed presence probe is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeFailurePolicy {
    /// Count the poll as empty. An unreachable game server eventually
    /// leads to a stop.
    #[default]
    CountAsEmpty,
    /// Count the poll as occupied and reset the counter. An unreachable
    /// game server is never stopped on idleness alone.
    CountAsOccupied,
}

impl ProbeFailurePolicy {
    /// Parses `empty` or `occupied`, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "empty" => Some(Self::CountAsEmpty),
            "occupied" => Some(Self::CountAsOccupied),
            _ => None,
        }
    }
}

/// Full configuration for the idleness aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleConfig {
    /// Time between presence polls. The first poll happens one interval
    /// (plus jitter) after start.
    pub poll_interval: Duration,
    /// Consecutive empty polls that trigger a stop attempt.
    pub empty_poll_threshold: u32,
    /// Upper bound on a single presence probe.
    pub probe_timeout: Duration,
    /// Upper bound on a single stop call.
    pub stop_timeout: Duration,
    pub probe_failure: ProbeFailurePolicy,
    /// Random delay (0–max ms) added before the first poll.
    pub initial_jitter_ms: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(180),
            empty_poll_threshold: 3,
            probe_timeout: Duration::from_millis(1500),
            stop_timeout: Duration::from_secs(30),
            probe_failure: ProbeFailurePolicy::default(),
            initial_jitter_ms: 5_000,
        }
    }
}

impl IdleConfig {
    /// Shortest accepted poll interval.
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Clamp and fix any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`IdlenessAggregator::new`]. Rules:
    /// - `poll_interval` raised to at least [`Self::MIN_POLL_INTERVAL`].
    /// - `empty_poll_threshold` of 0 becomes 1.
    /// - Zero timeouts are replaced with the defaults.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();
        if self.poll_interval < Self::MIN_POLL_INTERVAL {
            warn!(
                interval = ?self.poll_interval,
                min = ?Self::MIN_POLL_INTERVAL,
                "poll_interval below minimum, clamping"
            );
            self.poll_interval = Self::MIN_POLL_INTERVAL;
        }
        if self.empty_poll_threshold == 0 {
            warn!("empty_poll_threshold of 0 would stop on every poll, using 1");
            self.empty_poll_threshold = 1;
        }
        if self.probe_timeout.is_zero() {
            self.probe_timeout = defaults.probe_timeout;
        }
        if self.stop_timeout.is_zero() {
            self.stop_timeout = defaults.stop_timeout;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Registry view
// ---------------------------------------------------------------------------

/// The one question the aggregator asks the access layer: is anyone
/// logged in, or is a grant or grace window still open?
pub trait ActivityCheck: Send + Sync + 'static {
    fn is_active(&self) -> impl Future<Output = bool> + Send;
}

impl<T: ActivityCheck> ActivityCheck for Arc<T> {
    fn is_active(&self) -> impl Future<Output = bool> + Send {
        (**self).is_active()
    }
}

impl<A: AccessActuator> ActivityCheck for AccessRegistry<A> {
    fn is_active(&self) -> impl Future<Output = bool> + Send {
        self.has_activity()
    }
}

// ---------------------------------------------------------------------------
// Poll outcome (returned to caller each poll)
// ---------------------------------------------------------------------------

/// What the presence probe reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSample {
    Occupied { players: usize },
    Empty,
    /// The probe failed or timed out; counted per [`ProbeFailurePolicy`].
    Unavailable,
}

/// What the aggregator did after counting the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    /// Below threshold, or the server is occupied.
    None,
    /// Threshold reached but the registry reported activity.
    Deferred,
    Stopped,
    /// Threshold reached and the stop call failed. Retried after the next
    /// full threshold run.
    StopFailed,
}

/// Information about one completed poll, returned by
/// [`IdlenessAggregator::poll_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Monotonically increasing poll number (starts at 1).
    pub poll: u64,
    pub sample: PresenceSample,
    pub action: IdleAction,
    /// Counter value after this poll.
    pub consecutive_empty: u32,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Running totals since the aggregator was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdleMetrics {
    pub total_polls: u64,
    pub probe_failures: u64,
    pub stops_issued: u64,
    pub stops_deferred: u64,
    pub stop_failures: u64,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Counts consecutive empty presence polls and stops the resource when the
/// server has been idle long enough.
pub struct IdlenessAggregator<P, R, C> {
    config: IdleConfig,
    probe: P,
    resource: R,
    activity: C,
    consecutive_empty: u32,
    poll_count: u64,
    metrics: IdleMetrics,
}

impl<P, R, C> IdlenessAggregator<P, R, C>
where
    P: PresenceProbe,
    R: ResourceActuator,
    C: ActivityCheck,
{
    pub fn new(config: IdleConfig, probe: P, resource: R, activity: C) -> Self {
        let config = config.validated();
        debug!(
            interval = ?config.poll_interval,
            threshold = config.empty_poll_threshold,
            probe_failure = ?config.probe_failure,
            "idleness aggregator created"
        );
        Self {
            config,
            probe,
            resource,
            activity,
            consecutive_empty: 0,
            poll_count: 0,
            metrics: IdleMetrics::default(),
        }
    }

    /// Samples presence once and acts on the result.
    ///
    /// When the counter reaches the threshold it always resets, whether
    /// the stop was issued, deferred because of registry activity, or
    /// failed. A stop therefore happens at most once per threshold run.
    pub async fn poll_once(&mut self) -> PollOutcome {
        self.poll_count += 1;
        self.metrics.total_polls += 1;

        let sample = self.sample().await;
        let counts_as_empty = match sample {
            PresenceSample::Occupied { .. } => false,
            PresenceSample::Empty => true,
            PresenceSample::Unavailable => {
                self.config.probe_failure == ProbeFailurePolicy::CountAsEmpty
            }
        };

        if !counts_as_empty {
            if self.consecutive_empty > 0 {
                debug!(poll = self.poll_count, ?sample, "idle counter reset");
            }
            self.consecutive_empty = 0;
            return self.outcome(sample, IdleAction::None);
        }

        self.consecutive_empty += 1;
        debug!(
            poll = self.poll_count,
            ?sample,
            consecutive = self.consecutive_empty,
            threshold = self.config.empty_poll_threshold,
            "empty poll"
        );
        if self.consecutive_empty < self.config.empty_poll_threshold {
            return self.outcome(sample, IdleAction::None);
        }

        self.consecutive_empty = 0;
        let action = self.on_threshold().await;
        self.outcome(sample, action)
    }

    /// Polls every `poll_interval` until `shutdown` resolves.
    ///
    /// A poll in progress when `shutdown` resolves is finished first.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) {
        let interval_len = self.config.poll_interval;
        let start = Instant::now() + interval_len + self.initial_jitter();
        let mut interval = time::interval_at(start, interval_len);
        // A slow stop must not cause a burst of back-to-back polls.
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?interval_len, "idleness aggregator running");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(polls = self.poll_count, "idleness aggregator stopped");
                    return;
                }
                _ = interval.tick() => {
                    self.poll_once().await;
                }
            }
        }
    }

    /// Current value of the empty-poll counter.
    pub fn consecutive_empty_polls(&self) -> u32 {
        self.consecutive_empty
    }

    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    pub fn metrics(&self) -> &IdleMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &IdleConfig {
        &self.config
    }

    async fn sample(&mut self) -> PresenceSample {
        let result = bounded(
            "probe",
            self.config.probe_timeout,
            self.probe.list_connected_players(),
        )
        .await;

        match result {
            Ok(online) if online.players.is_empty() => PresenceSample::Empty,
            Ok(online) => PresenceSample::Occupied {
                players: online.players.len(),
            },
            Err(e) => {
                self.metrics.probe_failures += 1;
                warn!(
                    poll = self.poll_count,
                    error = %e,
                    policy = ?self.config.probe_failure,
                    "presence probe failed"
                );
                PresenceSample::Unavailable
            }
        }
    }

    async fn on_threshold(&mut self) -> IdleAction {
        if self.activity.is_active().await {
            self.metrics.stops_deferred += 1;
            info!(
                poll = self.poll_count,
                "idle threshold reached but grants are active, not stopping"
            );
            return IdleAction::Deferred;
        }

        info!(poll = self.poll_count, "idle threshold reached, stopping resource");
        match bounded("stop", self.config.stop_timeout, self.resource.stop()).await {
            Ok(()) => {
                self.metrics.stops_issued += 1;
                info!(poll = self.poll_count, "resource stop issued");
                IdleAction::Stopped
            }
            Err(e) => {
                self.metrics.stop_failures += 1;
                warn!(poll = self.poll_count, error = %e, "resource stop failed");
                IdleAction::StopFailed
            }
        }
    }

    fn outcome(&self, sample: PresenceSample, action: IdleAction) -> PollOutcome {
        PollOutcome {
            poll: self.poll_count,
            sample,
            action,
            consecutive_empty: self.consecutive_empty,
        }
    }

    fn initial_jitter(&self) -> Duration {
        if self.config.initial_jitter_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::rng().random_range(0..self.config.initial_jitter_ms);
        Duration::from_millis(ms)
    }
}
