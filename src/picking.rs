//! Turning a pointer position into the chest under it.

use glam::{Mat4, Vec2, Vec3};

use crate::bounds::BoundingBox;
use crate::node::Transform;
use crate::obj::MeshData;
use crate::scene::Chest;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    /// Unit length.
    pub direction: Vec3,
}

impl Ray {
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// World ray through the pixel `screen` of a `viewport` sized canvas.
///
/// `inverse_view_proj` is the inverse of the camera's view-projection
/// matrix (depth range `0..1`). Returns `None` for an empty viewport or a
/// singular matrix.
pub fn screen_ray(screen: Vec2, viewport: Vec2, inverse_view_proj: Mat4) -> Option<Ray> {
    if viewport.x <= 0.0 || viewport.y <= 0.0 {
        return None;
    }
    let ndc = Vec2::new(
        2.0 * screen.x / viewport.x - 1.0,
        1.0 - 2.0 * screen.y / viewport.y,
    );
    let near = inverse_view_proj.project_point3(ndc.extend(0.0));
    let far = inverse_view_proj.project_point3(ndc.extend(1.0));
    let direction = (far - near).try_normalize()?;
    near.is_finite().then_some(Ray {
        origin: near,
        direction,
    })
}

/// Placement of a chest model in the world.
pub fn chest_transform(chest: &Chest) -> Transform {
    Transform::from_translation(chest.position).with_scale(chest.scale)
}

/// World box of `chest` rendered with `mesh`, or with the unit cube when no
/// chest mesh is loaded.
pub fn chest_bounds(chest: &Chest, mesh: Option<&MeshData>) -> BoundingBox {
    let world = chest_transform(chest).matrix();
    let mut bounds = BoundingBox::EMPTY;
    match mesh.filter(|mesh| !mesh.positions.is_empty()) {
        Some(mesh) => {
            for position in &mesh.positions {
                bounds.expand_to_include(world.transform_point3(*position));
            }
        }
        None => {
            let unit = BoundingBox::from_center_size(Vec3::ZERO, Vec3::ONE);
            bounds.expand_to_include(world.transform_point3(unit.min));
            bounds.expand_to_include(world.transform_point3(unit.max));
        }
    }
    bounds
}

/// Nearest chest hit by `ray`.
pub fn pick_chest<'a>(chests: &'a [Chest], mesh: Option<&MeshData>, ray: &Ray) -> Option<&'a Chest> {
    chests
        .iter()
        .filter_map(|chest| {
            chest_bounds(chest, mesh)
                .intersect_ray(ray.origin, ray.direction)
                .map(|t| (t, chest))
        })
        .min_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, chest)| chest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;

    fn chest(id: &str, position: Vec3) -> Chest {
        Chest {
            id: id.to_string(),
            name: id.to_string(),
            position,
            icon: None,
            scale: 1.0,
        }
    }

    #[test]
    fn center_ray_points_along_view_direction() {
        let camera = Camera {
            position: Vec3::new(0.0, 0.0, 10.0),
            look_at: Vec3::ZERO,
            ..Camera::default()
        };
        let inverse = camera.view_proj(1.0).inverse();
        let ray = screen_ray(Vec2::new(50.0, 50.0), Vec2::new(100.0, 100.0), inverse).unwrap();
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-3);
        assert!(ray.origin.x.abs() < 1e-3 && ray.origin.y.abs() < 1e-3);
    }

    #[test]
    fn empty_viewport_has_no_ray() {
        assert!(screen_ray(Vec2::ZERO, Vec2::ZERO, Mat4::IDENTITY).is_none());
    }

    #[test]
    fn picks_nearest_chest_along_ray() {
        let chests = vec![
            chest("far", Vec3::new(0.0, 0.0, -5.0)),
            chest("near", Vec3::new(0.0, 0.0, 2.0)),
            chest("aside", Vec3::new(5.0, 0.0, 0.0)),
        ];
        let ray = Ray {
            origin: Vec3::new(0.0, 0.0, 10.0),
            direction: Vec3::NEG_Z,
        };
        assert_eq!(pick_chest(&chests, None, &ray).map(|c| c.id.as_str()), Some("near"));

        let miss = Ray {
            origin: Vec3::new(0.0, 10.0, 10.0),
            direction: Vec3::NEG_Z,
        };
        assert!(pick_chest(&chests, None, &miss).is_none());
    }

    #[test]
    fn chest_bounds_use_mesh_and_scale() {
        let mut gold = chest("gold", Vec3::new(1.0, 0.0, 0.0));
        gold.scale = 0.5;
        let cube = MeshData::unit_cube();
        let bounds = chest_bounds(&gold, Some(&cube));
        assert_eq!(bounds.size(), Vec3::splat(0.5));
        assert_eq!(bounds.center(), Vec3::new(1.0, 0.0, 0.0));
    }
}
