use std::any::Any;
use std::env;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use glam::Vec2;
use log::{info, warn};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalPosition};
use winit::event::{ElementState, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use treasure_island::app::{
    camera_params, light_params, print_camera_state, print_frame_summary, print_scene_summary,
    run_until_arrived, run_until_framed,
};
use treasure_island::loader::{load_model_file, spawn_model_load, ModelSlot};
use treasure_island::{
    load_obj_from_str, IslandScene, IslandStage, KeyCode, LightParams, MeshData, MouseButton,
    PointerState, Renderer, WHEEL_PIXELS_PER_STEP,
};

/// Virtual time allowed for the island to be framed in headless mode.
const FRAME_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let scene_path = PathBuf::from(&options.path);
    let xml = fs::read_to_string(&scene_path)
        .with_context(|| format!("failed to read scene {}", scene_path.display()))?;
    let scene = IslandScene::from_xml(&xml).context("failed to parse scene XML")?;
    print_scene_summary(&scene);

    let base = scene_path.parent().unwrap_or_else(|| Path::new("."));
    let assets = Assets {
        island: base.join(&scene.island.mesh),
        chest_mesh: load_chest_mesh(base, &scene),
    };

    if options.summary_only {
        run_headless(scene, &assets, options.travel.as_deref())
    } else {
        match run_interactive(scene.clone(), &assets) {
            Ok(()) => Ok(()),
            Err(err) => {
                if err.downcast_ref::<WindowInitError>().is_some() {
                    eprintln!(
                        "{err}. Falling back to --summary-only mode (set DISPLAY or install a GPU driver to enable rendering)."
                    );
                    run_headless(scene, &assets, options.travel.as_deref())
                } else {
                    Err(err)
                }
            }
        }
    }
}

struct Assets {
    island: PathBuf,
    chest_mesh: Option<Arc<MeshData>>,
}

fn load_chest_mesh(base: &Path, scene: &IslandScene) -> Option<Arc<MeshData>> {
    let relative = scene.chest_mesh.as_ref()?;
    let path = base.join(relative);
    let mesh = fs::read_to_string(&path)
        .with_context(|| format!("failed to read chest model {}", path.display()))
        .and_then(|text| load_obj_from_str(&text));
    match mesh {
        Ok(mesh) => Some(Arc::new(mesh)),
        Err(err) => {
            warn!("{err:#}; chests will render as cubes");
            None
        }
    }
}

/// Frames the island on a virtual clock and optionally travels to a chest.
fn run_headless(scene: IslandScene, assets: &Assets, travel: Option<&str>) -> Result<()> {
    let island = load_model_file(&assets.island, scene.island.transform)?;
    let travel_limit = scene.travel.duration + Duration::from_secs(1);
    let mut stage = IslandStage::new(scene, ModelSlot::pending(), assets.chest_mesh.clone());
    stage.mount(Duration::ZERO);
    stage.island().complete(island);

    let mut now = run_until_framed(&mut stage, Duration::ZERO, FRAME_TIMEOUT);
    print_frame_summary(&stage);

    if let Some(id) = travel {
        let token = stage.click_chest(id, now)?;
        let (arrived_at, arrived) = run_until_arrived(&mut stage, token, now, travel_limit);
        now = arrived_at;
        if !arrived {
            return Err(anyhow!("travel to chest {id} did not finish"));
        }
        println!("Travelled to chest {id}");
        print_camera_state(stage.rig());
    }

    stage.teardown();
    info!("headless run finished at {now:?}");
    Ok(())
}

fn run_interactive(scene: IslandScene, assets: &Assets) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let island = spawn_model_load(assets.island.clone(), scene.island.transform);
    let light = light_params(&scene.lights);
    let mut app = ViewerApp {
        stage: IslandStage::new(scene, island, assets.chest_mesh.clone()),
        light,
        pointer: Arc::new(PointerState::new()),
        renderer: None,
        started: Instant::now(),
        last_error: None,
    };
    app.stage.mount(Duration::ZERO);

    event_loop
        .run_app(&mut app)
        .map_err(|err| anyhow!("event loop failed: {err}"))?;

    app.stage.teardown();
    if let Some(err) = app.last_error {
        return Err(err);
    }
    print_camera_state(app.stage.rig());
    Ok(())
}

struct ViewerApp {
    stage: IslandStage,
    light: LightParams,
    pointer: Arc<PointerState>,
    renderer: Option<Renderer>,
    started: Instant,
    last_error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn now(&self) -> Duration {
        self.started.elapsed()
    }

    fn viewport(&self) -> Vec2 {
        self.renderer.as_ref().map_or(Vec2::ONE, |renderer| {
            let size = renderer.size();
            Vec2::new(size.width as f32, size.height as f32)
        })
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    fn handle_cursor(&mut self, position: PhysicalPosition<f64>) {
        let position = Vec2::new(position.x as f32, position.y as f32);
        if let Some(gesture) = self.pointer.move_to(position) {
            let (viewport, now) = (self.viewport(), self.now());
            self.stage.gesture(gesture, viewport, now);
        }
    }

    fn handle_mouse_button(&mut self, state: ElementState, button: WinitMouseButton) {
        let button = map_mouse_button(button);
        match state {
            ElementState::Pressed => self.pointer.button_down(button),
            ElementState::Released => {
                if let Some(gesture) = self.pointer.button_up(button) {
                    let (viewport, now) = (self.viewport(), self.now());
                    self.stage.gesture(gesture, viewport, now);
                }
            }
        }
    }

    fn handle_key(&mut self, key: PhysicalKey, state: ElementState) {
        let Some(key) = map_keycode(key) else {
            return;
        };
        match state {
            ElementState::Pressed => {
                self.pointer.set_key_down(key);
                self.stage.key(key);
            }
            ElementState::Released => self.pointer.set_key_up(key),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = self.now();
        let steps = self.pointer.take_wheel();
        if steps != 0.0 {
            self.stage.zoom(steps);
        }
        self.stage.advance(now);

        let viewport = self.viewport();
        let camera = camera_params(self.stage.rig(), viewport.x / viewport.y.max(1.0));
        let items = self.stage.draw_list();
        let background = self.stage.background();
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        renderer.update_globals(&camera, &self.light);
        if let Err(err) = renderer.render(&items, background) {
            match err {
                wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                    let size = renderer.window().inner_size();
                    renderer.resize(size);
                }
                wgpu::SurfaceError::OutOfMemory => {
                    self.fail(event_loop, anyhow!("GPU is out of memory"));
                }
                wgpu::SurfaceError::Timeout => {
                    info!("Surface timeout; retrying next frame");
                }
                wgpu::SurfaceError::Other => {
                    info!("Surface reported an unknown error; retrying next frame");
                }
            }
        }
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("Treasure Island")
            .with_inner_size(LogicalSize::new(1280.0, 720.0));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                self.fail(event_loop, WindowInitError::from_error("window", err).into());
                return;
            }
        };
        match block_on(Renderer::new(Arc::clone(&window))) {
            Ok(renderer) => {
                window.request_redraw();
                self.renderer = Some(renderer);
            }
            Err(err) => {
                self.fail(event_loop, WindowInitError::from_error("renderer", err).into());
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        if renderer.window_id() != window_id {
            return;
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => renderer.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                let size = renderer.window().inner_size();
                renderer.resize(size);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if !event.repeat {
                    self.handle_key(event.physical_key, event.state);
                }
            }
            WindowEvent::MouseInput { state, button, .. } => self.handle_mouse_button(state, button),
            WindowEvent::CursorMoved { position, .. } => self.handle_cursor(position),
            WindowEvent::MouseWheel { delta, .. } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => {
                        position.y as f32 / WHEEL_PIXELS_PER_STEP
                    }
                };
                self.pointer.scroll(steps);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            renderer.window().request_redraw();
        }
    }
}

fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::LEFT,
        WinitMouseButton::Middle => MouseButton::MIDDLE,
        WinitMouseButton::Right => MouseButton::RIGHT,
        WinitMouseButton::Back => MouseButton::new(3),
        WinitMouseButton::Forward => MouseButton::new(4),
        WinitMouseButton::Other(value) => MouseButton::new(value.min(u8::MAX as u16) as u8),
    }
}

fn map_keycode(key: PhysicalKey) -> Option<KeyCode> {
    match key {
        PhysicalKey::Code(WinitKeyCode::Escape) => Some(KeyCode::Escape),
        _ => None,
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

struct CliOptions {
    path: String,
    summary_only: bool,
    travel: Option<String>,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(
                "Usage: treasure-island <scene.xml> [--summary-only] [--travel <chest-id>]"
            ));
        };
        let mut summary_only = false;
        let mut travel = None;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--travel" => {
                    let id = args
                        .next()
                        .ok_or_else(|| anyhow!("--travel expects a chest id"))?;
                    travel = Some(id);
                }
                other => {
                    if let Some(id) = other.strip_prefix("--travel=") {
                        travel = Some(id.to_string());
                    } else {
                        return Err(anyhow!(
                            "Unknown argument: {other}. Expected --summary-only or --travel <chest-id>"
                        ));
                    }
                }
            }
        }
        Ok(Self {
            path,
            summary_only,
            travel,
        })
    }
}
