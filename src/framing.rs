//! Camera auto-framing: place the camera so a whole model is in view.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bounds::BoundingBox;

/// Tuning for [`frame`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Multiplier applied to the fitting distance so edges are not clipped.
    pub margin: f32,
    /// Share of the model height added above its centre.
    pub height_factor: f32,
    /// Share of the viewing distance added to the camera height.
    pub height_bias: f32,
    /// Share of the viewing distance used as horizontal offset.
    pub horizontal_factor: f32,
    /// Lower bound on the fitting distance for point-like geometry.
    pub min_distance: f32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            margin: 1.5,
            height_factor: 0.5,
            height_bias: 0.4,
            horizontal_factor: 0.7,
            min_distance: 1.0,
        }
    }
}

impl FrameConfig {
    /// Wider establishing shot: further back and lower over the model.
    pub fn overview() -> Self {
        Self {
            margin: 1.8,
            height_factor: 0.5,
            height_bias: 0.0,
            horizontal_factor: 1.2,
            min_distance: 1.0,
        }
    }
}

/// Camera placement computed for one bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub center: Vec3,
    pub size: Vec3,
    pub camera_position: Vec3,
    pub look_at_target: Vec3,
    /// Viewing distance after the margin was applied.
    pub distance: f32,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FramingError {
    #[error("bounding box is empty")]
    EmptyBounds,
    #[error("bounding box has non-finite corners")]
    NonFiniteBounds,
    #[error("vertical field of view {0} is outside (0, 180) degrees")]
    InvalidFov(f32),
    #[error("computed camera pose is not finite")]
    NonFiniteResult,
    #[error("computed camera position coincides with its target")]
    DegeneratePose,
}

/// Computes a camera pose that keeps `bounds` inside a vertical field of
/// view of `fov_degrees`.
///
/// The camera sits on the +Z side of the model centre, raised above it,
/// and looks at the centre.
pub fn frame(
    bounds: &BoundingBox,
    fov_degrees: f32,
    config: &FrameConfig,
) -> Result<FrameResult, FramingError> {
    if bounds.is_empty() {
        return Err(FramingError::EmptyBounds);
    }
    if !bounds.is_finite() {
        return Err(FramingError::NonFiniteBounds);
    }
    if !(fov_degrees > 0.0 && fov_degrees < 180.0) {
        return Err(FramingError::InvalidFov(fov_degrees));
    }

    let center = bounds.center();
    let size = bounds.size();
    let max_extent = size.max_element();

    let half_fov = fov_degrees.to_radians() / 2.0;
    let fit_distance = (max_extent / 2.0) / half_fov.tan();
    let fit_distance = fit_distance.max(config.min_distance);
    let distance = fit_distance * config.margin;

    let height = center.y + size.y * config.height_factor + distance * config.height_bias;
    let horizontal = distance * config.horizontal_factor;
    let camera_position = Vec3::new(center.x, height, center.z + horizontal);

    if !camera_position.is_finite() || !distance.is_finite() {
        return Err(FramingError::NonFiniteResult);
    }
    // A zero margin or horizontal factor would put the camera on the target.
    if camera_position.distance_squared(center) <= f32::EPSILON {
        return Err(FramingError::DegeneratePose);
    }

    Ok(FrameResult {
        center,
        size,
        camera_position,
        look_at_target: center,
        distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn island() -> BoundingBox {
        BoundingBox::new(Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 4.0, 5.0))
    }

    #[test]
    fn island_box_is_framed_from_above_and_in_front() {
        let result = frame(&island(), 75.0, &FrameConfig::default()).unwrap();
        assert_eq!(result.look_at_target, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(result.size, Vec3::new(10.0, 4.0, 10.0));
        assert!(result.camera_position.y > 2.0);
        assert_eq!(result.camera_position.x, 0.0);
        assert!(result.camera_position.z > 0.0);
    }

    #[test]
    fn island_box_matches_hand_computed_pose() {
        let result = frame(&island(), 75.0, &FrameConfig::default()).unwrap();
        let fit = 5.0 / (37.5f32).to_radians().tan();
        let distance = fit * 1.5;
        assert!((result.distance - distance).abs() < 1e-4);
        let expected_y = 2.0 + 4.0 * 0.5 + distance * 0.4;
        assert!((result.camera_position.y - expected_y).abs() < 1e-4);
        assert!((result.camera_position.z - distance * 0.7).abs() < 1e-4);
    }

    #[test]
    fn horizontal_offset_is_positive_for_any_box() {
        let boxes = [
            BoundingBox::new(Vec3::ZERO, Vec3::new(0.1, 50.0, 0.1)),
            BoundingBox::new(Vec3::splat(-100.0), Vec3::splat(100.0)),
            BoundingBox::new(Vec3::new(3.0, -1.0, 7.0), Vec3::new(4.0, -0.5, 9.0)),
        ];
        for bounds in boxes {
            for fov in [10.0, 50.0, 75.0, 120.0] {
                let result = frame(&bounds, fov, &FrameConfig::default()).unwrap();
                assert!(result.camera_position.z - result.center.z > 0.0);
                assert_eq!(result.look_at_target, result.center);
            }
        }
    }

    #[test]
    fn point_geometry_uses_minimum_distance() {
        let point = BoundingBox::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(1.0, 2.0, 3.0));
        let config = FrameConfig::default();
        let result = frame(&point, 75.0, &config).unwrap();
        assert!(result.camera_position.is_finite());
        assert_eq!(result.distance, config.min_distance * config.margin);
        assert!(result.camera_position.distance(result.look_at_target) > 0.0);
    }

    #[test]
    fn rejects_empty_bounds_and_bad_fov() {
        let config = FrameConfig::default();
        assert_eq!(
            frame(&BoundingBox::EMPTY, 75.0, &config),
            Err(FramingError::EmptyBounds)
        );
        assert_eq!(
            frame(&island(), 0.0, &config),
            Err(FramingError::InvalidFov(0.0))
        );
        assert_eq!(
            frame(&island(), 180.0, &config),
            Err(FramingError::InvalidFov(180.0))
        );
    }

    #[test]
    fn rejects_infinite_bounds() {
        let bounds = BoundingBox::new(Vec3::ZERO, Vec3::new(f32::INFINITY, 1.0, 1.0));
        assert_eq!(
            frame(&bounds, 75.0, &FrameConfig::default()),
            Err(FramingError::NonFiniteBounds)
        );
    }

    #[test]
    fn overview_sits_further_back() {
        let near = frame(&island(), 75.0, &FrameConfig::default()).unwrap();
        let wide = frame(&island(), 75.0, &FrameConfig::overview()).unwrap();
        assert!(wide.camera_position.z > near.camera_position.z);
    }
}
