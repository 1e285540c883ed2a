//! The island stage: loaded model, chests, water and the camera rig, wired
//! to the auto-framer, the travel animator and user gestures.

use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec2, Vec3};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::bounds::BoundingBox;
use crate::camera::CameraRig;
use crate::framing::{frame, FrameResult};
use crate::input::{Gesture, KeyCode};
use crate::loader::{ModelSlot, SlotState};
use crate::obj::MeshData;
use crate::picking::{chest_transform, pick_chest, screen_ray};
use crate::poll::{PollState, ReadinessPoll};
use crate::scene::{IslandScene, Light};
use crate::schedule::Timers;
use crate::travel::{TravelAnimator, TravelStatus, TravelToken};

const ISLAND_COLOR: Vec3 = Vec3::new(0.76, 0.7, 0.5);
const CHEST_COLOR: Vec3 = Vec3::new(0.55, 0.35, 0.17);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StageError {
    #[error("no chest with id {0:?}")]
    UnknownChest(String),
}

/// Timers owned by the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    FrameIsland,
    PlaceWater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawKind {
    Island,
    Chest,
    Water,
}

/// One mesh instance for the renderers.
#[derive(Debug, Clone)]
pub struct DrawItem {
    /// Stable cache key for the mesh buffers.
    pub key: String,
    pub kind: DrawKind,
    pub mesh: Arc<MeshData>,
    pub model: Mat4,
    pub color: Vec3,
    pub opacity: f32,
}

/// Everything on screen, driven by a host clock through [`IslandStage::advance`].
#[derive(Debug)]
pub struct IslandStage {
    scene: IslandScene,
    island: ModelSlot,
    chest_mesh: Arc<MeshData>,
    water_mesh: Arc<MeshData>,
    rig: CameraRig,
    timers: Timers<StageEvent>,
    frame_poll: ReadinessPoll,
    water_poll: ReadinessPoll,
    travel: TravelAnimator,
    frame: Option<FrameResult>,
    water_level: f32,
    mounted: bool,
    load_failure_reported: bool,
}

impl IslandStage {
    /// Builds the stage. Chests render as unit cubes when `chest_mesh` is
    /// `None`.
    pub fn new(scene: IslandScene, island: ModelSlot, chest_mesh: Option<Arc<MeshData>>) -> Self {
        let rig = CameraRig::new(scene.camera, scene.controls);
        Self {
            chest_mesh: chest_mesh.unwrap_or_else(|| Arc::new(MeshData::unit_cube())),
            water_mesh: Arc::new(MeshData::plane(scene.water.size)),
            rig,
            timers: Timers::new(),
            frame_poll: ReadinessPoll::new("auto-frame", scene.retry),
            water_poll: ReadinessPoll::new("water", scene.retry),
            travel: TravelAnimator::new(scene.travel),
            frame: None,
            water_level: scene.water.default_height,
            mounted: false,
            load_failure_reported: false,
            island,
            scene,
        }
    }

    pub fn scene(&self) -> &IslandScene {
        &self.scene
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn island(&self) -> &ModelSlot {
        &self.island
    }

    /// Result of the auto-framer, once it ran successfully.
    pub fn frame_result(&self) -> Option<&FrameResult> {
        self.frame.as_ref()
    }

    pub fn frame_state(&self) -> PollState {
        self.frame_poll.state()
    }

    pub fn water_state(&self) -> PollState {
        self.water_poll.state()
    }

    pub fn water_level(&self) -> f32 {
        self.water_level
    }

    pub fn travel(&self) -> &TravelAnimator {
        &self.travel
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    pub fn next_deadline(&mut self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    pub fn lights(&self) -> &[Light] {
        &self.scene.lights
    }

    pub fn background(&self) -> Vec3 {
        self.scene.background
    }

    /// Starts waiting for the island. Calling it again is a no-op.
    pub fn mount(&mut self, now: Duration) {
        if self.mounted {
            return;
        }
        self.mounted = true;
        self.frame_poll.mount(now, &mut self.timers, StageEvent::FrameIsland);
        self.water_poll.mount(now, &mut self.timers, StageEvent::PlaceWater);
    }

    /// Cancels pending checks and any running travel.
    pub fn teardown(&mut self) {
        self.frame_poll.teardown(&mut self.timers);
        self.water_poll.teardown(&mut self.timers);
        if let Some(token) = self.travel.cancel_active() {
            debug!("travel {token:?} cancelled by teardown");
        }
        self.mounted = false;
    }

    /// Runs everything due at `now`: the loader's completion signal, timers
    /// in deadline order and one travel step.
    pub fn advance(&mut self, now: Duration) -> TravelStatus {
        if self.mounted {
            if self.island.take_completed() {
                debug!("island finished loading, checking immediately");
                self.handle(StageEvent::FrameIsland, now);
                self.handle(StageEvent::PlaceWater, now);
            }
            for (_, event) in self.timers.drain_due(now) {
                self.handle(event, now);
            }
        }
        let status = self.travel.tick(now, &mut self.rig);
        if let TravelStatus::Arrived(token) = status {
            debug!("travel {token:?} arrived at {}", self.rig.target());
        }
        status
    }

    fn handle(&mut self, event: StageEvent, now: Duration) {
        if let SlotState::Failed(message) = self.island.state() {
            if !self.load_failure_reported {
                warn!("island failed to load ({message}); still waiting for a model");
                self.load_failure_reported = true;
            }
        }
        let node = self.island.node();
        match event {
            StageEvent::FrameIsland => {
                if let Some(bounds) =
                    self.frame_poll
                        .check(now, node.as_deref(), &mut self.timers, event)
                {
                    self.apply_framing(&bounds);
                }
            }
            StageEvent::PlaceWater => {
                if let Some(bounds) =
                    self.water_poll
                        .check(now, node.as_deref(), &mut self.timers, event)
                {
                    self.water_level = bounds.min.y - self.scene.water.depth_offset;
                    self.water_poll.complete();
                    info!("water placed at y = {:.2}", self.water_level);
                }
            }
        }
    }

    fn apply_framing(&mut self, bounds: &BoundingBox) {
        match frame(bounds, self.rig.camera.fov, &self.scene.framing) {
            Ok(result) => {
                self.rig.apply_frame(&result);
                info!(
                    "framed island: center {} size {} camera {} distance {:.2}",
                    result.center, result.size, result.camera_position, result.distance
                );
                self.frame = Some(result);
            }
            Err(err) => {
                error!("failed to frame island: {err}; using fallback view");
                self.rig.reset_to_default();
            }
        }
        self.frame_poll.complete();
    }

    /// Starts travelling to the chest `id`.
    pub fn click_chest(&mut self, id: &str, now: Duration) -> Result<TravelToken, StageError> {
        let chest = self
            .scene
            .chest(id)
            .ok_or_else(|| StageError::UnknownChest(id.to_string()))?;
        info!("travelling to chest {} ({})", chest.id, chest.name);
        Ok(self.travel.start(chest.position, now, &self.rig))
    }

    /// Picks the chest under `screen` and travels to it.
    pub fn pointer_click(&mut self, screen: Vec2, viewport: Vec2, now: Duration) -> Option<TravelToken> {
        let aspect = viewport.x / viewport.y.max(1.0);
        let inverse = self.rig.camera.view_proj(aspect).inverse();
        let ray = screen_ray(screen, viewport, inverse)?;
        let chest = pick_chest(&self.scene.chests, Some(self.chest_mesh.as_ref()), &ray)?;
        info!("travelling to chest {} ({})", chest.id, chest.name);
        Some(self.travel.start(chest.position, now, &self.rig))
    }

    pub fn orbit(&mut self, delta: Vec2, viewport_height: f32) {
        self.interrupt_travel();
        self.rig.orbit(delta, viewport_height);
    }

    pub fn zoom(&mut self, steps: f32) {
        self.interrupt_travel();
        self.rig.zoom(steps);
    }

    pub fn pan(&mut self, delta: Vec2, viewport_height: f32) {
        self.interrupt_travel();
        self.rig.pan(delta, viewport_height);
    }

    /// Routes a pointer gesture from [`crate::input::PointerState`].
    pub fn gesture(&mut self, gesture: Gesture, viewport: Vec2, now: Duration) -> Option<TravelToken> {
        match gesture {
            Gesture::Orbit(delta) => self.orbit(delta, viewport.y),
            Gesture::Pan(delta) => self.pan(delta, viewport.y),
            Gesture::Click(position) => return self.pointer_click(position, viewport, now),
        }
        None
    }

    pub fn key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Escape => self.interrupt_travel(),
        }
    }

    fn interrupt_travel(&mut self) {
        if let Some(token) = self.travel.cancel_active() {
            debug!("travel {token:?} interrupted by user input");
        }
    }

    /// Meshes to draw this frame: island, chests, then the water plane.
    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut items = Vec::new();
        if let Some(island) = self.island.node() {
            island.visit_meshes(Mat4::IDENTITY, &mut |node, mesh, world| {
                let Some(shared) = node.mesh.clone().filter(|_| !mesh.is_empty()) else {
                    return;
                };
                items.push(DrawItem {
                    key: format!("island/{}", node.name),
                    kind: DrawKind::Island,
                    mesh: shared,
                    model: world,
                    color: ISLAND_COLOR,
                    opacity: 1.0,
                });
            });
        }
        for chest in &self.scene.chests {
            items.push(DrawItem {
                key: "chest".to_string(),
                kind: DrawKind::Chest,
                mesh: Arc::clone(&self.chest_mesh),
                model: chest_transform(chest).matrix(),
                color: CHEST_COLOR,
                opacity: 1.0,
            });
        }
        items.push(DrawItem {
            key: "water".to_string(),
            kind: DrawKind::Water,
            mesh: Arc::clone(&self.water_mesh),
            model: Mat4::from_translation(Vec3::Y * self.water_level),
            color: self.scene.water.color,
            opacity: self.scene.water.opacity,
        });
        items
    }
}
