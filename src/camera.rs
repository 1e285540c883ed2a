//! Perspective camera and the orbit controls that share its target.

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::framing::FrameResult;

/// Pose used when framing fails.
pub const FALLBACK_POSITION: Vec3 = Vec3::new(0.0, 30.0, 50.0);

const POLAR_EPSILON: f32 = 1e-4;

/// Perspective camera looking at a point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 5.0, 15.0),
            look_at: Vec3::ZERO,
            up: Vec3::Y,
            fov: 75.0,
            near: 0.1,
            far: 2000.0,
        }
    }
}

impl Camera {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.look_at, self.up)
    }

    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect.max(0.01), self.near, self.far)
    }

    pub fn view_proj(&self, aspect: f32) -> Mat4 {
        self.projection(aspect) * self.view()
    }
}

/// User-facing limits of the orbit controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitSettings {
    pub enable_rotate: bool,
    pub enable_zoom: bool,
    pub enable_pan: bool,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Largest angle from the +Y axis, in radians.
    pub max_polar_angle: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
}

impl Default for OrbitSettings {
    fn default() -> Self {
        Self {
            enable_rotate: true,
            enable_zoom: true,
            enable_pan: true,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            max_polar_angle: PI,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
        }
    }
}

/// Orbit controls: the camera circles `target` on a sphere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrbitControls {
    pub target: Vec3,
    pub settings: OrbitSettings,
}

impl OrbitControls {
    pub fn new(target: Vec3, settings: OrbitSettings) -> Self {
        Self { target, settings }
    }
}

/// The shared camera state: the camera plus the orbit target.
///
/// The auto-framer, the travel animator and user gestures are the only
/// writers, and they all go through `&mut CameraRig`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraRig {
    pub camera: Camera,
    pub controls: OrbitControls,
}

impl CameraRig {
    pub fn new(camera: Camera, settings: OrbitSettings) -> Self {
        Self {
            camera,
            controls: OrbitControls::new(camera.look_at, settings),
        }
    }

    pub fn target(&self) -> Vec3 {
        self.controls.target
    }

    /// Moves the camera and the orbit target in one step.
    pub fn set_pose(&mut self, position: Vec3, target: Vec3) {
        self.camera.position = position;
        self.camera.look_at = target;
        self.controls.target = target;
    }

    pub fn apply_frame(&mut self, frame: &FrameResult) {
        self.set_pose(frame.camera_position, frame.look_at_target);
    }

    pub fn reset_to_default(&mut self) {
        self.set_pose(FALLBACK_POSITION, Vec3::ZERO);
    }

    /// Rotates around the target by a pointer drag of `delta` pixels.
    pub fn orbit(&mut self, delta: Vec2, viewport_height: f32) {
        let settings = self.controls.settings;
        if !settings.enable_rotate {
            return;
        }
        let height = viewport_height.max(1.0);
        let mut spherical = Spherical::from_offset(self.camera.position - self.controls.target);
        spherical.theta -= TAU * delta.x / height * settings.rotate_speed;
        spherical.phi -= TAU * delta.y / height * settings.rotate_speed;
        self.constrain(spherical);
    }

    /// Dollies toward (`steps > 0`) or away from the target.
    pub fn zoom(&mut self, steps: f32) {
        let settings = self.controls.settings;
        if !settings.enable_zoom || steps == 0.0 {
            return;
        }
        let scale = 0.95f32.powf(settings.zoom_speed * steps);
        let mut spherical = Spherical::from_offset(self.camera.position - self.controls.target);
        spherical.radius *= scale;
        self.constrain(spherical);
    }

    /// Slides camera and target across the view plane.
    pub fn pan(&mut self, delta: Vec2, viewport_height: f32) {
        let settings = self.controls.settings;
        if !settings.enable_pan {
            return;
        }
        let offset = self.camera.position - self.controls.target;
        let forward = (-offset).normalize_or_zero();
        let right = forward.cross(self.camera.up).normalize_or_zero();
        let up = right.cross(forward);
        // One viewport height of drag covers the visible height at the target.
        let visible = 2.0 * offset.length() * (self.camera.fov.to_radians() / 2.0).tan();
        let scale = visible / viewport_height.max(1.0) * settings.pan_speed;
        let shift = right * (-delta.x * scale) + up * (delta.y * scale);
        self.controls.target += shift;
        self.camera.position += shift;
        self.camera.look_at = self.controls.target;
    }

    /// Applies distance and polar limits to the current pose.
    pub fn clamp_to_limits(&mut self) {
        let spherical = Spherical::from_offset(self.camera.position - self.controls.target);
        self.constrain(spherical);
    }

    fn constrain(&mut self, mut spherical: Spherical) {
        let settings = self.controls.settings;
        let max_polar = settings.max_polar_angle.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        spherical.phi = spherical.phi.clamp(POLAR_EPSILON, max_polar);
        spherical.radius = spherical
            .radius
            .clamp(settings.min_distance, settings.max_distance.max(settings.min_distance));
        self.camera.position = self.controls.target + spherical.to_offset();
        self.camera.look_at = self.controls.target;
    }
}

/// Y-up spherical coordinates of a camera offset.
#[derive(Debug, Clone, Copy)]
struct Spherical {
    radius: f32,
    /// Angle from +Y.
    phi: f32,
    /// Angle around +Y, measured from +Z toward +X.
    theta: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return Self {
                radius: 0.0,
                phi: PI / 2.0,
                theta: 0.0,
            };
        }
        Self {
            radius,
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
            theta: offset.x.atan2(offset.z),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi = self.phi.sin();
        Vec3::new(
            self.radius * sin_phi * self.theta.sin(),
            self.radius * self.phi.cos(),
            self.radius * sin_phi * self.theta.cos(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig() -> CameraRig {
        CameraRig::new(
            Camera {
                position: Vec3::new(0.0, 0.0, 10.0),
                ..Camera::default()
            },
            OrbitSettings::default(),
        )
    }

    #[test]
    fn apply_frame_moves_camera_and_target() {
        let mut rig = rig();
        let frame = FrameResult {
            center: Vec3::new(1.0, 2.0, 3.0),
            size: Vec3::ONE,
            camera_position: Vec3::new(1.0, 5.0, 9.0),
            look_at_target: Vec3::new(1.0, 2.0, 3.0),
            distance: 6.0,
        };
        rig.apply_frame(&frame);
        assert_eq!(rig.camera.position, frame.camera_position);
        assert_eq!(rig.camera.look_at, frame.center);
        assert_eq!(rig.target(), frame.center);
    }

    #[test]
    fn fallback_pose_looks_at_origin() {
        let mut rig = rig();
        rig.reset_to_default();
        assert_eq!(rig.camera.position, FALLBACK_POSITION);
        assert_eq!(rig.target(), Vec3::ZERO);
    }

    #[test]
    fn orbit_keeps_distance_to_target() {
        let mut rig = rig();
        rig.orbit(Vec2::new(120.0, 0.0), 600.0);
        assert!((rig.camera.position.length() - 10.0).abs() < 1e-4);
        assert!(rig.camera.position.x.abs() > 1.0);
    }

    #[test]
    fn orbit_respects_max_polar_angle() {
        let mut rig = rig();
        rig.controls.settings.max_polar_angle = PI / 2.2;
        rig.orbit(Vec2::new(0.0, -10_000.0), 600.0);
        let offset = rig.camera.position - rig.target();
        let phi = (offset.y / offset.length()).acos();
        assert!(phi <= PI / 2.2 + 1e-4);
    }

    #[test]
    fn zoom_clamps_to_distance_limits() {
        let mut rig = rig();
        rig.controls.settings.min_distance = 3.0;
        rig.controls.settings.max_distance = 15.0;
        rig.zoom(1000.0);
        assert!((rig.camera.position.length() - 3.0).abs() < 1e-4);
        rig.zoom(-1000.0);
        assert!((rig.camera.position.length() - 15.0).abs() < 1e-3);
    }

    #[test]
    fn disabled_pan_is_ignored() {
        let mut rig = rig();
        rig.controls.settings.enable_pan = false;
        let before = rig;
        rig.pan(Vec2::new(50.0, 50.0), 600.0);
        assert_eq!(rig, before);
    }

    #[test]
    fn pan_moves_camera_and_target_together() {
        let mut rig = rig();
        rig.pan(Vec2::new(-100.0, 0.0), 600.0);
        assert!(rig.target().x > 0.0);
        assert!((rig.camera.position - rig.target() - Vec3::new(0.0, 0.0, 10.0)).length() < 1e-4);
    }
}
