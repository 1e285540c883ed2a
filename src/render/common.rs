use glam::{Mat4, Vec3};

/// Directional and point lights beyond this count are dropped.
pub const MAX_DIRECT_LIGHTS: usize = 4;

/// Camera parameters consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraParams {
    pub view_proj: Mat4,
    pub position: Vec3,
}

/// A directional or point light with its intensity folded into the colour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectLight {
    /// Position of a point light, or the point a directional light shines
    /// from toward the origin.
    pub position: Vec3,
    pub directional: bool,
    pub radiance: Vec3,
}

/// Lighting state consumed by the renderer's uniform buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct LightParams {
    pub ambient: Vec3,
    /// Hemisphere light colour from above.
    pub sky: Vec3,
    /// Hemisphere light colour from below.
    pub ground: Vec3,
    pub direct: Vec<DirectLight>,
}

impl LightParams {
    /// Diffuse shading of a surface with `normal` at `point`, without the
    /// surface colour.
    pub fn shade(&self, point: Vec3, normal: Vec3) -> Vec3 {
        let normal = normal.normalize_or_zero();
        let up = normal.y * 0.5 + 0.5;
        let mut light = self.ambient + self.ground.lerp(self.sky, up);
        for direct in &self.direct {
            let to_light = if direct.directional {
                direct.position
            } else {
                direct.position - point
            };
            let diffuse = normal.dot(to_light.normalize_or_zero()).max(0.0);
            light += direct.radiance * diffuse;
        }
        light
    }
}
