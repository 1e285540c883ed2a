use std::sync::Arc;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::obj::MeshData;

/// Local placement of a node relative to its parent.
///
/// Rotation is stored as Euler angles in degrees and applied Z, then Y,
/// then X, matching the scene XML.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub translation: Vec3,
    #[serde(default)]
    pub rotation: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::default()
        }
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        let rotation = Mat4::from_rotation_z(self.rotation.z.to_radians())
            * Mat4::from_rotation_y(self.rotation.y.to_radians())
            * Mat4::from_rotation_x(self.rotation.x.to_radians());
        Mat4::from_translation(self.translation) * rotation * Mat4::from_scale(self.scale)
    }
}

/// Node of a loaded model hierarchy.
#[derive(Debug, Clone, Default)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<Arc<MeshData>>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_mesh(name: impl Into<String>, mesh: Arc<MeshData>) -> Self {
        Self {
            name: name.into(),
            mesh: Some(mesh),
            ..Self::default()
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// Visits every node carrying a mesh together with its world matrix.
    pub fn visit_meshes<F>(&self, parent: Mat4, visit: &mut F)
    where
        F: FnMut(&SceneNode, &MeshData, Mat4),
    {
        let world = parent * self.transform.matrix();
        if let Some(mesh) = self.mesh.as_deref() {
            visit(self, mesh, world);
        }
        for child in &self.children {
            child.visit_meshes(world, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_applies_scale_then_translation() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Vec3::ZERO,
            scale: Vec3::splat(2.0),
        };
        let p = transform.matrix().transform_point3(Vec3::ONE);
        assert_eq!(p, Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn visit_meshes_composes_parent_transforms() {
        let mesh = Arc::new(MeshData::unit_cube());
        let root = SceneNode::group("root")
            .with_transform(Transform::from_translation(Vec3::X * 10.0))
            .with_child(
                SceneNode::with_mesh("leaf", mesh)
                    .with_transform(Transform::from_translation(Vec3::Y)),
            );
        let mut seen = Vec::new();
        root.visit_meshes(Mat4::IDENTITY, &mut |node, _, world| {
            seen.push((node.name.clone(), world.transform_point3(Vec3::ZERO)));
        });
        assert_eq!(seen, vec![("leaf".to_string(), Vec3::new(10.0, 1.0, 0.0))]);
    }
}
