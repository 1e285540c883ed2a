//! Eased camera travel toward a clicked object.

use std::time::Duration;

use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::camera::CameraRig;

/// Tuning for camera travel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TravelConfig {
    #[serde(with = "millis")]
    pub duration: Duration,
    /// Camera offset from the destination when the travel ends.
    pub offset: Vec3,
}

impl Default for TravelConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_millis(1000),
            offset: Vec3::new(0.0, 1.5, 1.5),
        }
    }
}

/// Quadratic ease-in-out on `[0, 1]`.
pub fn ease_in_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        -1.0 + (4.0 - 2.0 * t) * t
    }
}

/// Identifies one travel request. Only the newest token is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TravelToken(u64);

/// One in-flight interpolation between two camera poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelAnimation {
    pub start_position: Vec3,
    pub end_position: Vec3,
    pub start_target: Vec3,
    pub end_target: Vec3,
    pub start_time: Duration,
    pub duration: Duration,
}

impl TravelAnimation {
    /// Linear progress in `[0, 1]` at `now`.
    pub fn progress(&self, now: Duration) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_sub(self.start_time);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Camera position and target at `now`.
    pub fn sample(&self, now: Duration) -> (Vec3, Vec3) {
        let progress = self.progress(now);
        if progress >= 1.0 {
            return (self.end_position, self.end_target);
        }
        let eased = ease_in_out_quad(progress);
        (
            self.start_position.lerp(self.end_position, eased),
            self.start_target.lerp(self.end_target, eased),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelStatus {
    Idle,
    Moving(TravelToken),
    /// Reported once, on the tick that lands on the destination.
    Arrived(TravelToken),
}

/// Runs at most one travel animation at a time.
#[derive(Debug, Default)]
pub struct TravelAnimator {
    config: TravelConfig,
    active: Option<(TravelToken, TravelAnimation)>,
    next_token: u64,
}

impl TravelAnimator {
    pub fn new(config: TravelConfig) -> Self {
        Self {
            config,
            active: None,
            next_token: 0,
        }
    }

    pub fn config(&self) -> &TravelConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn active(&self) -> Option<(TravelToken, &TravelAnimation)> {
        self.active.as_ref().map(|(token, animation)| (*token, animation))
    }

    /// Starts travelling toward `destination`, replacing any running travel.
    ///
    /// The new animation starts from the rig's current pose, so a
    /// preempted travel continues smoothly from wherever it stopped.
    pub fn start(&mut self, destination: Vec3, now: Duration, rig: &CameraRig) -> TravelToken {
        if let Some((previous, _)) = self.active.take() {
            debug!("travel {previous:?} preempted");
        }
        self.next_token += 1;
        let token = TravelToken(self.next_token);
        let animation = TravelAnimation {
            start_position: rig.camera.position,
            end_position: destination + self.config.offset,
            start_target: rig.target(),
            end_target: destination,
            start_time: now,
            duration: self.config.duration,
        };
        self.active = Some((token, animation));
        token
    }

    /// Cancels `token` if it is still the running travel.
    pub fn cancel(&mut self, token: TravelToken) -> bool {
        match self.active {
            Some((current, _)) if current == token => {
                self.active = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel_active(&mut self) -> Option<TravelToken> {
        self.active.take().map(|(token, _)| token)
    }

    /// Advances the running travel and writes the rig.
    pub fn tick(&mut self, now: Duration, rig: &mut CameraRig) -> TravelStatus {
        let Some((token, animation)) = self.active else {
            return TravelStatus::Idle;
        };
        let (position, target) = animation.sample(now);
        rig.set_pose(position, target);
        if animation.progress(now) >= 1.0 {
            self.active = None;
            TravelStatus::Arrived(token)
        } else {
            TravelStatus::Moving(token)
        }
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, OrbitSettings};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn rig() -> CameraRig {
        CameraRig::new(
            Camera {
                position: Vec3::new(0.0, 10.0, 20.0),
                ..Camera::default()
            },
            OrbitSettings::default(),
        )
    }

    #[test]
    fn easing_hits_endpoints_and_midpoint() {
        assert_eq!(ease_in_out_quad(0.0), 0.0);
        assert_eq!(ease_in_out_quad(0.5), 0.5);
        assert_eq!(ease_in_out_quad(1.0), 1.0);
        assert_eq!(ease_in_out_quad(0.25), 0.125);
        assert!((ease_in_out_quad(0.75) - 0.875).abs() < 1e-6);
    }

    #[test]
    fn eased_progress_never_decreases() {
        let mut previous = 0.0;
        for step in 0..=100 {
            let eased = ease_in_out_quad(step as f32 / 100.0);
            assert!(eased >= previous);
            previous = eased;
        }
    }

    #[test]
    fn travel_lands_on_offset_destination() {
        let mut rig = rig();
        let mut animator = TravelAnimator::new(TravelConfig::default());
        let destination = Vec3::new(3.0, 1.0, -2.0);
        let token = animator.start(destination, ms(0), &rig);

        assert_eq!(animator.tick(ms(500), &mut rig), TravelStatus::Moving(token));
        assert_eq!(animator.tick(ms(1000), &mut rig), TravelStatus::Arrived(token));
        assert_eq!(rig.camera.position, destination + Vec3::new(0.0, 1.5, 1.5));
        assert_eq!(rig.target(), destination);
        assert_eq!(animator.tick(ms(1100), &mut rig), TravelStatus::Idle);
    }

    #[test]
    fn midpoint_is_halfway() {
        let mut rig = rig();
        let start = rig.camera.position;
        let mut animator = TravelAnimator::new(TravelConfig::default());
        let destination = Vec3::ZERO;
        animator.start(destination, ms(0), &rig);
        animator.tick(ms(500), &mut rig);
        let end = destination + TravelConfig::default().offset;
        assert!((rig.camera.position - (start + end) * 0.5).length() < 1e-4);
    }

    #[test]
    fn new_travel_preempts_and_restarts_from_current_pose() {
        let mut rig = rig();
        let mut animator = TravelAnimator::new(TravelConfig::default());
        let first = animator.start(Vec3::new(5.0, 0.0, 0.0), ms(0), &rig);
        animator.tick(ms(400), &mut rig);
        let paused_at = rig.camera.position;

        let second = animator.start(Vec3::new(-5.0, 0.0, 0.0), ms(400), &rig);
        assert_ne!(first, second);
        assert!(!animator.cancel(first));
        let (_, animation) = animator.active().unwrap();
        assert_eq!(animation.start_position, paused_at);

        animator.tick(ms(1400), &mut rig);
        assert_eq!(rig.target(), Vec3::new(-5.0, 0.0, 0.0));
        assert!(!animator.is_active());
    }

    #[test]
    fn cancel_stops_writes() {
        let mut rig = rig();
        let mut animator = TravelAnimator::new(TravelConfig::default());
        let token = animator.start(Vec3::ZERO, ms(0), &rig);
        assert!(animator.cancel(token));
        let before = rig;
        assert_eq!(animator.tick(ms(500), &mut rig), TravelStatus::Idle);
        assert_eq!(rig, before);
    }

    #[test]
    fn zero_duration_arrives_immediately() {
        let mut rig = rig();
        let mut animator = TravelAnimator::new(TravelConfig {
            duration: Duration::ZERO,
            ..TravelConfig::default()
        });
        let token = animator.start(Vec3::ONE, ms(10), &rig);
        assert_eq!(animator.tick(ms(10), &mut rig), TravelStatus::Arrived(token));
        assert_eq!(rig.target(), Vec3::ONE);
    }
}
