use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Triangle mesh with per-vertex normals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Interleaves `position.xyz` and `normal.xyz` for vertex buffers.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut vertices = Vec::with_capacity(self.positions.len() * 6);
        for (index, position) in self.positions.iter().enumerate() {
            let normal = self.normals.get(index).copied().unwrap_or(Vec3::Y);
            vertices.extend_from_slice(&position.to_array());
            vertices.extend_from_slice(&normal.to_array());
        }
        vertices
    }

    /// Axis aligned unit cube centred on the origin.
    pub fn unit_cube() -> Self {
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];
        let mut mesh = MeshData::default();
        for (normal, u, v) in faces {
            let base = mesh.positions.len() as u32;
            let center = normal * 0.5;
            for (su, sv) in [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)] {
                mesh.positions.push(center + u * su + v * sv);
                mesh.normals.push(normal);
            }
            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        mesh
    }

    /// Horizontal square in the XZ plane facing +Y.
    pub fn plane(size: f32) -> Self {
        let half = size * 0.5;
        Self {
            positions: vec![
                Vec3::new(-half, 0.0, half),
                Vec3::new(half, 0.0, half),
                Vec3::new(half, 0.0, -half),
                Vec3::new(-half, 0.0, -half),
            ],
            normals: vec![Vec3::Y; 4],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }
}

/// Parses an OBJ document held in memory.
///
/// Polygons are fanned into triangles and vertices are deduplicated per
/// `(position, normal)` pair. Faces without normals get smooth normals
/// accumulated from their triangles.
pub fn load_obj_from_str(data: &str) -> Result<MeshData> {
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut triangles: Vec<[Corner; 3]> = Vec::new();

    for (line_no, line) in data.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut words = line.split_whitespace();
        match words.next() {
            Some("v") => positions.push(
                read_vec3(words).with_context(|| format!("bad vertex on line {}", line_no + 1))?,
            ),
            Some("vn") => normals.push(
                read_vec3(words).with_context(|| format!("bad normal on line {}", line_no + 1))?,
            ),
            Some("f") => {
                let polygon =
                    read_face(words).with_context(|| format!("bad face on line {}", line_no + 1))?;
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    if positions.is_empty() {
        return Err(anyhow!("OBJ document has no vertices"));
    }

    let mut mesh = weld(&positions, &normals, &triangles)?;
    if mesh.normals.iter().any(|n| *n == Vec3::ZERO) {
        smooth_normals(&mut mesh);
    }
    Ok(mesh)
}

#[derive(Debug, Clone, Copy)]
struct Corner {
    position: i32,
    normal: i32,
}

fn read_vec3<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<Vec3> {
    let mut next = || -> Result<f32> {
        Ok(words
            .next()
            .ok_or_else(|| anyhow!("expected three components"))?
            .parse::<f32>()?)
    };
    Ok(Vec3::new(next()?, next()?, next()?))
}

fn read_face<'a>(words: impl Iterator<Item = &'a str>) -> Result<Vec<Corner>> {
    let mut corners = Vec::new();
    for word in words {
        let mut refs = word.split('/');
        let position = refs
            .next()
            .ok_or_else(|| anyhow!("missing vertex reference"))?
            .parse::<i32>()?;
        let normal = refs
            .nth(1)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<i32>().ok())
            .unwrap_or(0);
        corners.push(Corner { position, normal });
    }
    if corners.len() < 3 {
        return Err(anyhow!("a face needs at least three corners"));
    }
    Ok(corners)
}

/// Resolves one-based or negative (relative) OBJ references.
fn resolve(reference: i32, len: usize) -> Option<usize> {
    match reference {
        0 => None,
        r if r > 0 => Some(r as usize - 1).filter(|i| *i < len),
        r => len.checked_sub(r.unsigned_abs() as usize),
    }
}

fn weld(positions: &[Vec3], normals: &[Vec3], triangles: &[[Corner; 3]]) -> Result<MeshData> {
    let mut seen: HashMap<(usize, Option<usize>), u32> = HashMap::new();
    let mut mesh = MeshData::default();

    for corner in triangles.iter().flatten() {
        let p = resolve(corner.position, positions.len())
            .ok_or_else(|| anyhow!("vertex reference {} out of range", corner.position))?;
        let n = resolve(corner.normal, normals.len());
        let index = *seen.entry((p, n)).or_insert_with(|| {
            mesh.positions.push(positions[p]);
            mesh.normals.push(n.map(|i| normals[i]).unwrap_or(Vec3::ZERO));
            mesh.positions.len() as u32 - 1
        });
        mesh.indices.push(index);
    }

    // Point clouds without faces still carry geometry.
    if triangles.is_empty() {
        mesh.positions = positions.to_vec();
        mesh.normals = vec![Vec3::Y; positions.len()];
    }
    Ok(mesh)
}

fn smooth_normals(mesh: &mut MeshData) {
    let mut sums = vec![Vec3::ZERO; mesh.positions.len()];
    for tri in mesh.indices.chunks_exact(3) {
        let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        let face = (mesh.positions[b] - mesh.positions[a]).cross(mesh.positions[c] - mesh.positions[a]);
        if face.length_squared() > f32::EPSILON {
            let face = face.normalize();
            sums[a] += face;
            sums[b] += face;
            sums[c] += face;
        }
    }
    for (normal, sum) in mesh.normals.iter_mut().zip(sums) {
        if *normal == Vec3::ZERO {
            *normal = sum.normalize_or_zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quad_into_two_triangles() {
        let obj = "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nf 1 2 3 4\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
        assert_eq!(mesh.positions.len(), 4);
    }

    #[test]
    fn fills_missing_normals() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n";
        let mesh = load_obj_from_str(obj).unwrap();
        for normal in &mesh.normals {
            assert!((normal.length() - 1.0).abs() < 1e-5);
            assert!(normal.z > 0.99);
        }
    }

    #[test]
    fn negative_references_count_from_the_end() {
        let obj = "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n";
        let mesh = load_obj_from_str(obj).unwrap();
        assert_eq!(mesh.positions[0], Vec3::ZERO);
        assert_eq!(mesh.positions[2], Vec3::Y);
    }

    #[test]
    fn rejects_documents_without_vertices() {
        assert!(load_obj_from_str("# nothing here\n").is_err());
    }

    #[test]
    fn rejects_out_of_range_faces() {
        assert!(load_obj_from_str("v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 9\n").is_err());
    }

    #[test]
    fn unit_cube_spans_half_extents() {
        let cube = MeshData::unit_cube();
        assert_eq!(cube.positions.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.positions.iter().all(|p| p.abs().max_element() <= 0.5 + 1e-6));
        assert_eq!(cube.interleaved().len(), 24 * 6);
    }
}
