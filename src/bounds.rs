//! World-space axis aligned bounding boxes.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::node::SceneNode;

/// Axis aligned box in world space.
///
/// [`BoundingBox::EMPTY`] is inverted (`min = +inf`, `max = -inf`) so that
/// expanding it by any point yields that point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl BoundingBox {
    pub const EMPTY: Self = Self {
        min: Vec3::INFINITY,
        max: Vec3::NEG_INFINITY,
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpgt(self.max).any()
    }

    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn max_extent(&self) -> f32 {
        self.size().max_element()
    }

    /// Returns the smallest non-negative ray parameter where the ray
    /// enters the box, or `None` on a miss.
    pub fn intersect_ray(&self, origin: Vec3, direction: Vec3) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let inv = direction.recip();
        let t1 = (self.min - origin) * inv;
        let t2 = (self.max - origin) * inv;
        // NaN from 0 * inf (origin on a slab plane, parallel ray) is
        // dropped by f32::min/max.
        let near = t1.min(t2).max_element();
        let far = t1.max(t2).min_element();
        if far < near.max(0.0) {
            None
        } else {
            Some(near.max(0.0))
        }
    }
}

/// Computes the tight world-space box around every vertex below `node`.
///
/// Returns `None` while the node carries no geometry, which is the normal
/// state of a model that is still loading.
pub fn compute_bounds(node: &SceneNode) -> Option<BoundingBox> {
    compute_bounds_with(node, Mat4::IDENTITY)
}

/// Same as [`compute_bounds`] for a node placed under `parent`.
pub fn compute_bounds_with(node: &SceneNode, parent: Mat4) -> Option<BoundingBox> {
    let mut bounds = BoundingBox::EMPTY;
    node.visit_meshes(parent, &mut |_, mesh, world| {
        for position in &mesh.positions {
            bounds.expand_to_include(world.transform_point3(*position));
        }
    });
    (!bounds.is_empty()).then_some(bounds)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::node::Transform;
    use crate::obj::MeshData;

    #[test]
    fn empty_box_expands_to_single_point() {
        let mut bounds = BoundingBox::EMPTY;
        assert!(bounds.is_empty());
        bounds.expand_to_include(Vec3::new(1.0, 2.0, 3.0));
        assert!(!bounds.is_empty());
        assert_eq!(bounds.size(), Vec3::ZERO);
        assert_eq!(bounds.center(), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn node_without_mesh_has_no_bounds() {
        let node = SceneNode::group("island").with_child(SceneNode::group("empty"));
        assert_eq!(compute_bounds(&node), None);
    }

    #[test]
    fn mesh_without_vertices_has_no_bounds() {
        let node = SceneNode::with_mesh("island", Arc::new(MeshData::default()));
        assert_eq!(compute_bounds(&node), None);
    }

    #[test]
    fn bounds_follow_world_transforms() {
        let cube = Arc::new(MeshData::unit_cube());
        let node = SceneNode::group("root")
            .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)).with_scale(4.0))
            .with_child(SceneNode::with_mesh("cube", cube));
        let bounds = compute_bounds(&node).unwrap();
        assert_eq!(bounds.min, Vec3::new(-2.0, -1.0, -2.0));
        assert_eq!(bounds.max, Vec3::new(2.0, 3.0, 2.0));
        assert_eq!(bounds.max_extent(), 4.0);
    }

    #[test]
    fn rotated_geometry_stays_tight() {
        let mesh = Arc::new(MeshData {
            positions: vec![Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0)],
            ..MeshData::default()
        });
        let node = SceneNode::with_mesh("stick", mesh).with_transform(Transform {
            rotation: Vec3::new(0.0, 90.0, 0.0),
            ..Transform::default()
        });
        let bounds = compute_bounds(&node).unwrap();
        assert!(bounds.size().x < 1e-5);
        assert!((bounds.size().z - 2.0).abs() < 1e-5);
    }

    #[test]
    fn ray_hits_front_face() {
        let bounds = BoundingBox::from_center_size(Vec3::ZERO, Vec3::splat(2.0));
        let t = bounds.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z).unwrap();
        assert!((t - 4.0).abs() < 1e-5);
        assert_eq!(bounds.intersect_ray(Vec3::new(0.0, 3.0, 5.0), Vec3::NEG_Z), None);
        assert_eq!(bounds.intersect_ray(Vec3::new(0.0, 0.0, 5.0), Vec3::Z), None);
    }

    #[test]
    fn ray_from_inside_hits_at_zero() {
        let bounds = BoundingBox::from_center_size(Vec3::ZERO, Vec3::splat(2.0));
        assert_eq!(bounds.intersect_ray(Vec3::ZERO, Vec3::X), Some(0.0));
    }
}
