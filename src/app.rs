use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use glam::Vec3;
use log::warn;

use crate::camera::CameraRig;
use crate::poll::PollState;
use crate::render::{CameraParams, DirectLight, LightParams, MAX_DIRECT_LIGHTS};
use crate::scene::{IslandScene, Light, LightKind};
use crate::stage::IslandStage;
use crate::travel::{TravelStatus, TravelToken};

/// Frame length of the virtual clock used by headless runs.
pub const FRAME_STEP: Duration = Duration::from_millis(16);

pub fn camera_params(rig: &CameraRig, aspect: f32) -> CameraParams {
    CameraParams {
        view_proj: rig.camera.view_proj(aspect),
        position: rig.camera.position,
    }
}

pub fn light_params(lights: &[Light]) -> LightParams {
    let mut params = LightParams {
        ambient: Vec3::ZERO,
        sky: Vec3::ZERO,
        ground: Vec3::ZERO,
        direct: Vec::new(),
    };
    for light in lights {
        let radiance = light.color * light.intensity;
        match light.kind {
            LightKind::Ambient => params.ambient += radiance,
            LightKind::Hemisphere => {
                params.sky += radiance;
                params.ground += light.ground_color * light.intensity;
            }
            LightKind::Directional | LightKind::Point => {
                if params.direct.len() == MAX_DIRECT_LIGHTS {
                    warn!(
                        "ignoring light at {}: at most {MAX_DIRECT_LIGHTS} are supported",
                        light.position
                    );
                    continue;
                }
                params.direct.push(DirectLight {
                    position: light.position,
                    directional: light.kind == LightKind::Directional,
                    radiance,
                });
            }
        }
    }
    params
}

/// Start/stop bookkeeping for a host frame loop.
///
/// Each start opens a new generation. A callback scheduled by an earlier
/// generation sees [`FrameLoop::is_current`] return `false` and must not
/// schedule itself again.
#[derive(Debug, Clone, Default)]
pub struct FrameLoop {
    generation: Rc<Cell<u64>>,
    running: Rc<Cell<bool>>,
}

impl FrameLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new generation, or returns `None` while already running.
    pub fn start(&self) -> Option<u64> {
        if self.running.replace(true) {
            return None;
        }
        let generation = self.generation.get().wrapping_add(1);
        self.generation.set(generation);
        Some(generation)
    }

    /// Returns whether the loop was running.
    pub fn stop(&self) -> bool {
        self.running.replace(false)
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.running.get() && self.generation.get() == generation
    }
}

/// Advances `stage` frame by frame from `now` until the auto-framer has
/// run or `limit` has elapsed. Returns the clock at which it stopped.
pub fn run_until_framed(stage: &mut IslandStage, mut now: Duration, limit: Duration) -> Duration {
    let deadline = now + limit;
    while stage.frame_state() != PollState::Initialized && now < deadline {
        now += FRAME_STEP;
        stage.advance(now);
    }
    now
}

/// Advances `stage` until the travel `token` lands or `limit` elapses.
pub fn run_until_arrived(
    stage: &mut IslandStage,
    token: TravelToken,
    mut now: Duration,
    limit: Duration,
) -> (Duration, bool) {
    let deadline = now + limit;
    while now < deadline {
        now += FRAME_STEP;
        match stage.advance(now) {
            TravelStatus::Arrived(arrived) if arrived == token => return (now, true),
            TravelStatus::Moving(_) => {}
            _ => return (now, false),
        }
    }
    (now, false)
}

pub fn print_scene_summary(scene: &IslandScene) {
    println!(
        "Loaded island scene with {} chest(s) ({} lights)",
        scene.chests.len(),
        scene.lights.len()
    );
    for chest in &scene.chests {
        println!(" - {} ({}) at {}", chest.id, chest.name, fmt_vec3(chest.position));
    }
}

pub fn print_frame_summary(stage: &IslandStage) {
    match stage.frame_result() {
        Some(frame) => println!(
            "Framed island: center={} size={} distance={:.2}",
            fmt_vec3(frame.center),
            fmt_vec3(frame.size),
            frame.distance
        ),
        None if stage.frame_state() == PollState::Initialized => {
            println!("Island could not be framed; using fallback view")
        }
        None => println!("Island never became ready"),
    }
    println!("Water level: {:.2}", stage.water_level());
    print_camera_state(stage.rig());
}

pub fn print_camera_state(rig: &CameraRig) {
    println!(
        "Camera pos={} target={}",
        fmt_vec3(rig.camera.position),
        fmt_vec3(rig.target())
    );
}

fn fmt_vec3(v: Vec3) -> String {
    format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z)
}
