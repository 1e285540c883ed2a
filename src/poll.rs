//! Waits for a loading model to have geometry before running a one-shot
//! consumer such as the auto-framer.

use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::bounds::{compute_bounds, BoundingBox};
use crate::node::SceneNode;
use crate::schedule::{TimerId, Timers};

/// Shortest wait between two checks; a retry never lands on the same tick.
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// How the delay between checks grows while the model is not ready.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    Fixed,
    Exponential {
        factor: f32,
        #[serde(with = "crate::travel::millis")]
        max_delay: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            factor: 2.0,
            max_delay: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Grace period between mounting and the first check.
    #[serde(with = "crate::travel::millis")]
    pub initial_delay: Duration,
    /// Base delay while the model node does not exist yet.
    #[serde(with = "crate::travel::millis")]
    pub missing_node_delay: Duration,
    /// Base delay while the node exists but has no geometry.
    #[serde(with = "crate::travel::millis")]
    pub not_ready_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            missing_node_delay: Duration::from_millis(100),
            not_ready_delay: Duration::from_millis(200),
            backoff: Backoff::default(),
        }
    }
}

impl RetryPolicy {
    /// Fixed cadence: every retry waits exactly its base delay.
    pub fn fixed() -> Self {
        Self {
            backoff: Backoff::Fixed,
            ..Self::default()
        }
    }

    /// Delay before the next check after `misses` consecutive misses
    /// (starting at 1) with base delay `base`.
    pub fn delay(&self, base: Duration, misses: u32) -> Duration {
        let delay = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential { factor, max_delay } => {
                let exponent = misses.saturating_sub(1).min(32) as i32;
                let scaled = base.as_millis() as f64 * f64::from(factor.max(1.0)).powi(exponent);
                Duration::from_millis(scaled.min(max_delay.as_millis() as f64).round() as u64)
            }
        };
        delay.max(MIN_RETRY_DELAY)
    }
}

/// Lifecycle of one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Waiting,
    Ready,
    Initialized,
}

/// What a single check found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Readiness {
    MissingNode,
    NoGeometry,
    Ready(BoundingBox),
}

impl Readiness {
    pub fn of(node: Option<&SceneNode>) -> Self {
        match node {
            None => Readiness::MissingNode,
            Some(node) => compute_bounds(node).map_or(Readiness::NoGeometry, Readiness::Ready),
        }
    }
}

/// `Waiting -> Ready -> Initialized` poll loop driven by a [`Timers`]
/// queue owned by the host.
#[derive(Debug)]
pub struct ReadinessPoll {
    name: &'static str,
    policy: RetryPolicy,
    state: PollState,
    pending: Option<TimerId>,
    missing_streak: u32,
    empty_streak: u32,
    checks: u32,
}

impl ReadinessPoll {
    pub fn new(name: &'static str, policy: RetryPolicy) -> Self {
        Self {
            name,
            policy,
            state: PollState::Waiting,
            pending: None,
            missing_streak: 0,
            empty_streak: 0,
            checks: 0,
        }
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn pending(&self) -> Option<TimerId> {
        self.pending
    }

    pub fn checks(&self) -> u32 {
        self.checks
    }

    /// Schedules the first check after the grace period.
    pub fn mount<E>(&mut self, now: Duration, timers: &mut Timers<E>, event: E) {
        if self.state != PollState::Waiting || self.pending.is_some() {
            return;
        }
        self.pending = Some(timers.schedule(now + self.policy.initial_delay, event));
    }

    /// Runs one check. Returns the bounds on the `Waiting -> Ready`
    /// transition; otherwise reschedules itself and returns `None`.
    ///
    /// Call from the timer carrying `event`, or directly when the loader
    /// signals completion; a still pending timer is cancelled first.
    pub fn check<E>(
        &mut self,
        now: Duration,
        node: Option<&SceneNode>,
        timers: &mut Timers<E>,
        event: E,
    ) -> Option<BoundingBox> {
        if let Some(id) = self.pending.take() {
            timers.cancel(id);
        }
        if self.state != PollState::Waiting {
            return None;
        }
        self.checks += 1;
        let delay = match Readiness::of(node) {
            Readiness::Ready(bounds) => {
                self.state = PollState::Ready;
                return Some(bounds);
            }
            Readiness::MissingNode => {
                self.empty_streak = 0;
                self.missing_streak += 1;
                self.policy.delay(self.policy.missing_node_delay, self.missing_streak)
            }
            Readiness::NoGeometry => {
                self.missing_streak = 0;
                self.empty_streak += 1;
                self.policy.delay(self.policy.not_ready_delay, self.empty_streak)
            }
        };
        debug!(
            "{}: model not ready after {} check(s), retrying in {:?}",
            self.name, self.checks, delay
        );
        self.pending = Some(timers.schedule(now + delay, event));
        None
    }

    /// Marks the consumer as done. Only the first call after `Ready` counts.
    pub fn complete(&mut self) -> bool {
        if self.state == PollState::Ready {
            self.state = PollState::Initialized;
            true
        } else {
            false
        }
    }

    /// Cancels any scheduled check.
    pub fn teardown<E>(&mut self, timers: &mut Timers<E>) {
        if let Some(id) = self.pending.take() {
            timers.cancel(id);
        }
    }
}
