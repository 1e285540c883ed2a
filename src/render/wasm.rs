use anyhow::{anyhow, Result};
use glam::{Mat3, Vec3, Vec4Swizzles};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

use crate::stage::DrawItem;

use super::common::{CameraParams, LightParams};

/// Flat-shaded triangle ready for the painter's algorithm.
struct Facet {
    points: [(f64, f64); 3],
    depth: f32,
    fill: String,
}

/// Software renderer drawing into a 2D canvas for WebAssembly builds.
pub struct Renderer {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
    size: (u32, u32),
    camera: Option<CameraParams>,
    light: Option<LightParams>,
}

impl Renderer {
    /// Creates a renderer that draws into the provided HTML canvas element.
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = canvas
            .get_context("2d")
            .map_err(|err| anyhow!("failed to query canvas context: {err:?}"))?
            .ok_or_else(|| anyhow!("canvas does not support 2d context"))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| anyhow!("failed to cast canvas context"))?;

        let size = (canvas.width(), canvas.height());
        Ok(Self {
            canvas,
            context,
            size,
            camera: None,
            light: None,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    /// Updates the canvas dimensions to match the browser layout.
    pub fn resize(&mut self, new_size: (u32, u32)) {
        if new_size.0 == 0 || new_size.1 == 0 || new_size == self.size {
            return;
        }
        self.size = new_size;
        self.canvas.set_width(new_size.0);
        self.canvas.set_height(new_size.1);
    }

    pub fn update_globals(&mut self, camera: &CameraParams, light: &LightParams) {
        self.camera = Some(camera.clone());
        self.light = Some(light.clone());
    }

    /// Draws `items` back to front over a sky of colour `background`.
    pub fn render(&mut self, items: &[DrawItem], background: Vec3) -> Result<(), JsValue> {
        let (width, height) = (self.size.0 as f64, self.size.1 as f64);
        self.context.set_fill_style_str(&css_color(background, 1.0));
        self.context.fill_rect(0.0, 0.0, width, height);

        let (Some(camera), Some(light)) = (&self.camera, &self.light) else {
            return Ok(());
        };

        let mut facets = Vec::new();
        for item in items {
            let normal_matrix = Mat3::from_mat4(item.model).inverse().transpose();
            let clip = camera.view_proj * item.model;
            for triangle in item.mesh.indices.chunks_exact(3) {
                let mut points = [(0.0, 0.0); 3];
                let mut depth = 0.0;
                let mut visible = true;
                for (slot, &index) in points.iter_mut().zip(triangle) {
                    let Some(position) = item.mesh.positions.get(index as usize) else {
                        visible = false;
                        break;
                    };
                    let projected = clip * position.extend(1.0);
                    if projected.w <= 0.0 {
                        visible = false;
                        break;
                    }
                    let ndc = projected.xyz() / projected.w;
                    *slot = (
                        (ndc.x as f64 * 0.5 + 0.5) * width,
                        (0.5 - ndc.y as f64 * 0.5) * height,
                    );
                    depth += ndc.z;
                }
                if !visible {
                    continue;
                }
                let corner = |i: usize| item.mesh.positions[triangle[i] as usize];
                let face_normal =
                    normal_matrix * (corner(1) - corner(0)).cross(corner(2) - corner(0));
                let centroid = item
                    .model
                    .transform_point3((corner(0) + corner(1) + corner(2)) / 3.0);
                let mut shaded = light.shade(centroid, face_normal);
                // Faces seen from behind use the flipped normal.
                if (camera.position - centroid).dot(face_normal) < 0.0 {
                    shaded = light.shade(centroid, -face_normal);
                }
                facets.push(Facet {
                    points,
                    depth: depth / 3.0,
                    fill: css_color(item.color * shaded, item.opacity),
                });
            }
        }

        facets.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        for facet in &facets {
            self.context.set_fill_style_str(&facet.fill);
            self.context.begin_path();
            self.context.move_to(facet.points[0].0, facet.points[0].1);
            self.context.line_to(facet.points[1].0, facet.points[1].1);
            self.context.line_to(facet.points[2].0, facet.points[2].1);
            self.context.close_path();
            self.context.fill();
        }
        Ok(())
    }
}

fn css_color(color: Vec3, alpha: f32) -> String {
    let rgb = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    format!("rgba({}, {}, {}, {:.3})", rgb.x as u8, rgb.y as u8, rgb.z as u8, alpha)
}
