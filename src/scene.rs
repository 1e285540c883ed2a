use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::camera::{Camera, OrbitSettings};
use crate::framing::FrameConfig;
use crate::node::Transform;
use crate::poll::{Backoff, RetryPolicy};
use crate::travel::TravelConfig;

/// Island scene as described by the scene XML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandScene {
    pub island: ModelRef,
    /// Mesh shared by every chest; chests render as cubes without one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chest_mesh: Option<String>,
    pub chests: Vec<Chest>,
    pub lights: Vec<Light>,
    pub camera: Camera,
    pub controls: OrbitSettings,
    pub framing: FrameConfig,
    pub travel: TravelConfig,
    pub retry: RetryPolicy,
    pub water: WaterSettings,
    pub background: Vec3,
}

impl IslandScene {
    /// Parses the scene XML.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml).context("invalid scene XML")?;
        let root = document.root_element();
        if !root.has_tag_name("scene") {
            bail!("expected <scene> root element, found <{}>", root.tag_name().name());
        }

        let island_node = child(&root, "island").ok_or_else(|| anyhow!("<island> tag is missing"))?;
        let island = ModelRef {
            mesh: required_text(&island_node, "mesh")?,
            transform: parse_transform(&island_node)?,
        };

        let mut chests = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("chest")) {
            let id = required_text(&node, "id")?;
            if chests.iter().any(|c: &Chest| c.id == id) {
                bail!("duplicate chest id {id:?}");
            }
            chests.push(Chest {
                name: optional_text(&node, "name").unwrap_or_else(|| id.clone()),
                id,
                position: parse_vec3(optional_text(&node, "position"), Vec3::ZERO)?,
                icon: optional_text(&node, "icon"),
                scale: parse_f32(optional_text(&node, "scale"), default_chest_scale())?,
            });
        }

        let mut lights = Vec::new();
        for node in root.children().filter(|n| n.has_tag_name("light")) {
            lights.push(parse_light(&node)?);
        }
        if lights.is_empty() {
            lights = default_lights();
        }

        Ok(Self {
            island,
            chest_mesh: optional_text(&root, "chest_mesh"),
            chests,
            lights,
            camera: child(&root, "camera").map_or(Ok(Camera::default()), |n| parse_camera(&n))?,
            controls: child(&root, "controls")
                .map_or(Ok(OrbitSettings::default()), |n| parse_controls(&n))?,
            framing: child(&root, "framing")
                .map_or(Ok(FrameConfig::default()), |n| parse_framing(&n))?,
            travel: child(&root, "travel").map_or(Ok(TravelConfig::default()), |n| parse_travel(&n))?,
            retry: child(&root, "retry").map_or(Ok(RetryPolicy::default()), |n| parse_retry(&n))?,
            water: child(&root, "water").map_or(Ok(WaterSettings::default()), |n| parse_water(&n))?,
            background: parse_color(optional_text(&root, "background"), default_background())?,
        })
    }

    pub fn chest(&self, id: &str) -> Option<&Chest> {
        self.chests.iter().find(|chest| chest.id == id)
    }
}

/// Reference to a model file and where to place it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub mesh: String,
    #[serde(default)]
    pub transform: Transform,
}

/// Treasure chest placed on the island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chest {
    pub id: String,
    pub name: String,
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default = "default_chest_scale")]
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Ambient,
    Directional,
    Point,
    Hemisphere,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub kind: LightKind,
    #[serde(default)]
    pub position: Vec3,
    pub color: Vec3,
    /// Ground colour of hemisphere lights.
    #[serde(default)]
    pub ground_color: Vec3,
    pub intensity: f32,
}

/// Water plane laid under the island once its bottom is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaterSettings {
    /// Distance between the island bottom and the water surface.
    pub depth_offset: f32,
    /// Height used until the island has loaded.
    pub default_height: f32,
    pub size: f32,
    pub color: Vec3,
    pub opacity: f32,
}

impl Default for WaterSettings {
    fn default() -> Self {
        Self {
            depth_offset: 0.5,
            default_height: -2.0,
            size: 200.0,
            color: rgb(0x4a, 0x9e, 0xff),
            opacity: 0.6,
        }
    }
}

fn default_chest_scale() -> f32 {
    0.5
}

fn default_background() -> Vec3 {
    rgb(0x87, 0xce, 0xeb)
}

fn rgb(r: u8, g: u8, b: u8) -> Vec3 {
    Vec3::new(r as f32, g as f32, b as f32) / 255.0
}

/// Sun, soft fill, ambient and sky bounce.
pub fn default_lights() -> Vec<Light> {
    vec![
        Light {
            kind: LightKind::Ambient,
            position: Vec3::ZERO,
            color: Vec3::ONE,
            ground_color: Vec3::ZERO,
            intensity: 1.0,
        },
        Light {
            kind: LightKind::Directional,
            position: Vec3::new(10.0, 15.0, 5.0),
            color: Vec3::ONE,
            ground_color: Vec3::ZERO,
            intensity: 1.5,
        },
        Light {
            kind: LightKind::Directional,
            position: Vec3::new(-5.0, 10.0, -5.0),
            color: Vec3::ONE,
            ground_color: Vec3::ZERO,
            intensity: 0.3,
        },
        Light {
            kind: LightKind::Hemisphere,
            position: Vec3::Y,
            color: rgb(0x87, 0xce, 0xeb),
            ground_color: rgb(0x90, 0xee, 0x90),
            intensity: 0.5,
        },
    ]
}

fn parse_transform(node: &Node<'_, '_>) -> Result<Transform> {
    let defaults = Transform::default();
    let scale = match optional_text(node, "scale") {
        Some(text) if text.split_whitespace().count() == 1 => {
            Vec3::splat(parse_f32(Some(text), 1.0)?)
        }
        other => parse_vec3(other, defaults.scale)?,
    };
    Ok(Transform {
        translation: parse_vec3(optional_text(node, "position"), defaults.translation)?,
        rotation: parse_vec3(optional_text(node, "rotation"), defaults.rotation)?,
        scale,
    })
}

fn parse_light(node: &Node<'_, '_>) -> Result<Light> {
    let kind = match optional_text(node, "type").as_deref() {
        Some("ambient") => LightKind::Ambient,
        Some("directional") | None => LightKind::Directional,
        Some("point") => LightKind::Point,
        Some("hemisphere") => LightKind::Hemisphere,
        Some(other) => bail!("unknown light type {other:?}"),
    };
    Ok(Light {
        kind,
        position: parse_vec3(optional_text(node, "position"), Vec3::ZERO)?,
        color: parse_color(optional_text(node, "color"), Vec3::ONE)?,
        ground_color: parse_color(optional_text(node, "ground_color"), Vec3::ZERO)?,
        intensity: parse_f32(optional_text(node, "intensity"), 1.0)?,
    })
}

fn parse_camera(node: &Node<'_, '_>) -> Result<Camera> {
    let defaults = Camera::default();
    Ok(Camera {
        position: parse_vec3(optional_text(node, "position"), defaults.position)?,
        look_at: parse_vec3(optional_text(node, "target"), defaults.look_at)?,
        up: defaults.up,
        fov: parse_f32(optional_text(node, "fov"), defaults.fov)?,
        near: parse_f32(optional_text(node, "near"), defaults.near)?,
        far: parse_f32(optional_text(node, "far"), defaults.far)?,
    })
}

fn parse_controls(node: &Node<'_, '_>) -> Result<OrbitSettings> {
    let d = OrbitSettings::default();
    Ok(OrbitSettings {
        enable_rotate: parse_bool(optional_text(node, "rotate"), d.enable_rotate)?,
        enable_zoom: parse_bool(optional_text(node, "zoom"), d.enable_zoom)?,
        enable_pan: parse_bool(optional_text(node, "pan"), d.enable_pan)?,
        min_distance: parse_f32(optional_text(node, "min_distance"), d.min_distance)?,
        max_distance: parse_f32(optional_text(node, "max_distance"), d.max_distance)?,
        max_polar_angle: parse_f32(optional_text(node, "max_polar_angle"), d.max_polar_angle)?,
        rotate_speed: parse_f32(optional_text(node, "rotate_speed"), d.rotate_speed)?,
        zoom_speed: parse_f32(optional_text(node, "zoom_speed"), d.zoom_speed)?,
        pan_speed: parse_f32(optional_text(node, "pan_speed"), d.pan_speed)?,
    })
}

fn parse_framing(node: &Node<'_, '_>) -> Result<FrameConfig> {
    let d = match optional_text(node, "preset").as_deref() {
        None | Some("default") => FrameConfig::default(),
        Some("overview") => FrameConfig::overview(),
        Some(other) => bail!("unknown framing preset {other:?}"),
    };
    Ok(FrameConfig {
        margin: parse_f32(optional_text(node, "margin"), d.margin)?,
        height_factor: parse_f32(optional_text(node, "height_factor"), d.height_factor)?,
        height_bias: parse_f32(optional_text(node, "height_bias"), d.height_bias)?,
        horizontal_factor: parse_f32(optional_text(node, "horizontal_factor"), d.horizontal_factor)?,
        min_distance: parse_f32(optional_text(node, "min_distance"), d.min_distance)?,
    })
}

fn parse_travel(node: &Node<'_, '_>) -> Result<TravelConfig> {
    let d = TravelConfig::default();
    Ok(TravelConfig {
        duration: parse_millis(optional_text(node, "duration"), d.duration)?,
        offset: parse_vec3(optional_text(node, "offset"), d.offset)?,
    })
}

fn parse_retry(node: &Node<'_, '_>) -> Result<RetryPolicy> {
    let d = RetryPolicy::default();
    let backoff = match optional_text(node, "backoff").as_deref() {
        None => d.backoff,
        Some("fixed") => Backoff::Fixed,
        Some("exponential") => {
            let (factor, max_delay) = match d.backoff {
                Backoff::Exponential { factor, max_delay } => (factor, max_delay),
                Backoff::Fixed => (2.0, Duration::from_millis(2000)),
            };
            Backoff::Exponential {
                factor: parse_f32(optional_text(node, "factor"), factor)?,
                max_delay: parse_millis(optional_text(node, "max_delay"), max_delay)?,
            }
        }
        Some(other) => bail!("unknown backoff {other:?}"),
    };
    Ok(RetryPolicy {
        initial_delay: parse_millis(optional_text(node, "initial_delay"), d.initial_delay)?,
        missing_node_delay: parse_millis(
            optional_text(node, "missing_node_delay"),
            d.missing_node_delay,
        )?,
        not_ready_delay: parse_millis(optional_text(node, "not_ready_delay"), d.not_ready_delay)?,
        backoff,
    })
}

fn parse_water(node: &Node<'_, '_>) -> Result<WaterSettings> {
    let d = WaterSettings::default();
    Ok(WaterSettings {
        depth_offset: parse_f32(optional_text(node, "depth_offset"), d.depth_offset)?,
        default_height: parse_f32(optional_text(node, "default_height"), d.default_height)?,
        size: parse_f32(optional_text(node, "size"), d.size)?,
        color: parse_color(optional_text(node, "color"), d.color)?,
        opacity: parse_f32(optional_text(node, "opacity"), d.opacity)?,
    })
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

fn required_text(node: &Node<'_, '_>, tag: &str) -> Result<String> {
    optional_text(node, tag).ok_or_else(|| anyhow!("<{tag}> tag is missing"))
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|c| c.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn parse_numbers<const N: usize>(text: &str, what: &str) -> Result<[f32; N]> {
    let mut values = [0.0; N];
    let mut parts = text.split_whitespace();
    for value in values.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| anyhow!("{what} {text:?} is missing components"))?;
        *value = part
            .parse::<f32>()
            .with_context(|| format!("{what} {text:?} has a bad component"))?;
    }
    if parts.next().is_some() {
        bail!("{what} {text:?} has too many components");
    }
    Ok(values)
}

fn parse_vec3(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(text) => Ok(Vec3::from_array(parse_numbers::<3>(&text, "vector")?)),
        None => Ok(default),
    }
}

fn parse_color(value: Option<String>, default: Vec3) -> Result<Vec3> {
    match value {
        Some(text) => Ok(Vec3::from_array(parse_numbers::<3>(&text, "color")?) / 255.0),
        None => Ok(default),
    }
}

fn parse_f32(value: Option<String>, default: f32) -> Result<f32> {
    match value {
        Some(text) => text
            .parse::<f32>()
            .map_err(|err| anyhow!("failed to parse float {text:?}: {err}")),
        None => Ok(default),
    }
}

fn parse_millis(value: Option<String>, default: Duration) -> Result<Duration> {
    match value {
        Some(text) => text
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|err| anyhow!("failed to parse milliseconds {text:?}: {err}")),
        None => Ok(default),
    }
}

fn parse_bool(value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref() {
        Some("true") | Some("1") | Some("yes") => Ok(true),
        Some("false") | Some("0") | Some("no") => Ok(false),
        Some(other) => Err(anyhow!("failed to parse boolean {other:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
    <scene>
        <island>
            <mesh>models/island.obj</mesh>
            <scale>2</scale>
        </island>
        <chest_mesh>models/chest.obj</chest_mesh>
        <chest>
            <id>gold</id>
            <name>Gold Chest</name>
            <position>2 1 -1</position>
            <icon>coin</icon>
        </chest>
        <chest>
            <id>map</id>
            <position>-3 0.5 2</position>
        </chest>
        <light>
            <type>directional</type>
            <position>10 15 5</position>
            <intensity>1.5</intensity>
            <color>255 128 0</color>
        </light>
        <camera><fov>75</fov><position>0 5 15</position></camera>
        <controls>
            <pan>false</pan>
            <min_distance>3</min_distance>
            <max_distance>15</max_distance>
        </controls>
        <framing><margin>2</margin></framing>
        <travel><duration>750</duration><offset>0 2 2</offset></travel>
        <retry><backoff>fixed</backoff><initial_delay>250</initial_delay></retry>
        <water><depth_offset>1</depth_offset></water>
    </scene>
    "#;

    #[test]
    fn parse_scene_populates_everything() {
        let scene = IslandScene::from_xml(SAMPLE).unwrap();
        assert_eq!(scene.island.mesh, "models/island.obj");
        assert_eq!(scene.island.transform.scale, Vec3::splat(2.0));
        assert_eq!(scene.chest_mesh.as_deref(), Some("models/chest.obj"));
        assert_eq!(scene.chests.len(), 2);

        let gold = scene.chest("gold").unwrap();
        assert_eq!(gold.name, "Gold Chest");
        assert_eq!(gold.position, Vec3::new(2.0, 1.0, -1.0));
        assert_eq!(gold.icon.as_deref(), Some("coin"));
        assert_eq!(gold.scale, 0.5);
        assert_eq!(scene.chest("map").unwrap().name, "map");

        assert_eq!(scene.lights.len(), 1);
        assert_eq!(scene.lights[0].kind, LightKind::Directional);
        assert_eq!(scene.lights[0].color, Vec3::new(1.0, 128.0 / 255.0, 0.0));

        assert_eq!(scene.camera.fov, 75.0);
        assert!(!scene.controls.enable_pan);
        assert_eq!(scene.controls.max_distance, 15.0);
        assert_eq!(scene.framing.margin, 2.0);
        assert_eq!(scene.framing.horizontal_factor, 0.7);
        assert_eq!(scene.travel.duration, Duration::from_millis(750));
        assert_eq!(scene.travel.offset, Vec3::new(0.0, 2.0, 2.0));
        assert_eq!(scene.retry.backoff, Backoff::Fixed);
        assert_eq!(scene.retry.initial_delay, Duration::from_millis(250));
        assert_eq!(scene.retry.not_ready_delay, Duration::from_millis(200));
        assert_eq!(scene.water.depth_offset, 1.0);
    }

    #[test]
    fn minimal_scene_uses_defaults() {
        let xml = "<scene><island><mesh>island.obj</mesh></island></scene>";
        let scene = IslandScene::from_xml(xml).unwrap();
        assert!(scene.chests.is_empty());
        assert_eq!(scene.lights, default_lights());
        assert_eq!(scene.camera, Camera::default());
        assert_eq!(scene.framing, FrameConfig::default());
        assert_eq!(scene.travel, TravelConfig::default());
        assert_eq!(scene.retry, RetryPolicy::default());
        assert_eq!(scene.background, default_background());
    }

    #[test]
    fn missing_island_is_an_error() {
        assert!(IslandScene::from_xml("<scene></scene>").is_err());
    }

    #[test]
    fn duplicate_chest_ids_are_rejected() {
        let xml = "<scene><island><mesh>a.obj</mesh></island>\
                   <chest><id>x</id></chest><chest><id>x</id></chest></scene>";
        assert!(IslandScene::from_xml(xml).is_err());
    }

    #[test]
    fn malformed_vectors_are_rejected() {
        let xml = "<scene><island><mesh>a.obj</mesh><position>1 2</position></island></scene>";
        assert!(IslandScene::from_xml(xml).is_err());
        let xml = "<scene><island><mesh>a.obj</mesh><position>1 2 x</position></island></scene>";
        assert!(IslandScene::from_xml(xml).is_err());
    }

    #[test]
    fn overview_preset_is_selectable() {
        let xml = "<scene><island><mesh>a.obj</mesh></island>\
                   <framing><preset>overview</preset></framing></scene>";
        let scene = IslandScene::from_xml(xml).unwrap();
        assert_eq!(scene.framing, FrameConfig::overview());
    }
}
