#![cfg(target_arch = "wasm32")]

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec2;
use log::{error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventTarget, HtmlCanvasElement, KeyboardEvent, MouseEvent, WheelEvent};

use crate::app::{camera_params, light_params, FrameLoop};
use crate::input::{KeyCode, MouseButton, PointerState, WHEEL_PIXELS_PER_STEP};
use crate::loader::{model_from_obj, ModelSlot};
use crate::render::{LightParams, Renderer};
use crate::scene::IslandScene;
use crate::stage::IslandStage;

type Listener = Closure<dyn FnMut(Event)>;
type FrameCallback = Closure<dyn FnMut(f64)>;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

struct WebState {
    stage: IslandStage,
    renderer: Renderer,
    canvas: HtmlCanvasElement,
    light: LightParams,
    now: Duration,
}

impl WebState {
    fn viewport(&self) -> Vec2 {
        let (width, height) = self.renderer.size();
        Vec2::new(width as f32, height as f32)
    }

    fn frame(&mut self, now: Duration, pointer: &PointerState) {
        self.now = now;
        let steps = pointer.take_wheel();
        if steps != 0.0 {
            self.stage.zoom(steps);
        }
        self.stage.advance(now);

        let (width, height) = (self.canvas.client_width(), self.canvas.client_height());
        if width > 0 && height > 0 {
            self.renderer.resize((width as u32, height as u32));
        }
        let viewport = self.viewport();
        let camera = camera_params(self.stage.rig(), viewport.x / viewport.y.max(1.0));
        self.renderer.update_globals(&camera, &self.light);
        if let Err(err) = self
            .renderer
            .render(&self.stage.draw_list(), self.stage.background())
        {
            error!("render failed: {err:?}");
        }
    }
}

/// Island viewer bound to a canvas element.
#[wasm_bindgen]
pub struct WasmApp {
    state: Rc<RefCell<WebState>>,
    pointer: Arc<PointerState>,
    island: ModelSlot,
    frame_loop: FrameLoop,
    frame_callback: Rc<RefCell<Option<FrameCallback>>>,
    frame_request: Rc<Cell<Option<i32>>>,
    listeners: Vec<(EventTarget, &'static str, Listener)>,
}

#[wasm_bindgen]
impl WasmApp {
    /// Builds the viewer from a scene XML document and, optionally, the
    /// island OBJ text. Without it the stage waits for [`WasmApp::load_island`].
    #[wasm_bindgen(constructor)]
    pub fn new(canvas_id: &str, scene_xml: &str, island_obj: Option<String>) -> Result<WasmApp, JsValue> {
        let scene = IslandScene::from_xml(scene_xml)
            .map_err(|err| JsValue::from_str(&format!("failed to parse scene XML: {err:#}")))?;
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("missing window"))?;
        let document = window
            .document()
            .ok_or_else(|| JsValue::from_str("missing document"))?;
        let canvas: HtmlCanvasElement = document
            .get_element_by_id(canvas_id)
            .ok_or_else(|| JsValue::from_str("canvas element not found"))?
            .dyn_into()
            .map_err(|_| JsValue::from_str("element is not a canvas"))?;
        let renderer = Renderer::new(canvas.clone())
            .map_err(|err| JsValue::from_str(&format!("renderer error: {err}")))?;

        info!(
            "loaded island scene with {} chest(s) ({} lights)",
            scene.chests.len(),
            scene.lights.len()
        );

        let island = ModelSlot::pending();
        let light = light_params(&scene.lights);
        let stage = IslandStage::new(scene, island.clone(), None);
        let app = WasmApp {
            state: Rc::new(RefCell::new(WebState {
                stage,
                renderer,
                canvas,
                light,
                now: Duration::ZERO,
            })),
            pointer: Arc::new(PointerState::new()),
            island,
            frame_loop: FrameLoop::new(),
            frame_callback: Rc::new(RefCell::new(None)),
            frame_request: Rc::new(Cell::new(None)),
            listeners: Vec::new(),
        };
        if let Some(obj) = island_obj {
            app.load_island(&obj);
        }
        Ok(app)
    }

    /// Hands the island OBJ text to the stage.
    pub fn load_island(&self, obj: &str) {
        let transform = self.state.borrow().stage.scene().island.transform;
        match model_from_obj("island", obj, transform) {
            Ok(node) => self.island.complete(node),
            Err(err) => {
                error!("{err}");
                self.island.fail(err.to_string());
            }
        }
    }

    /// Starts travelling to a chest, e.g. from a button outside the canvas.
    pub fn travel_to(&self, chest_id: &str) -> Result<(), JsValue> {
        let mut state = self.state.borrow_mut();
        let now = state.now;
        state
            .stage
            .click_chest(chest_id, now)
            .map(|_| ())
            .map_err(|err| JsValue::from_str(&err.to_string()))
    }

    /// Mounts the stage, attaches input listeners and starts the frame loop.
    pub fn start(&mut self) -> Result<(), JsValue> {
        if self.frame_loop.is_running() {
            return Ok(());
        }
        let window = web_sys::window().ok_or_else(|| JsValue::from_str("missing window"))?;
        let performance = window
            .performance()
            .ok_or_else(|| JsValue::from_str("performance API unavailable"))?;
        let Some(generation) = self.frame_loop.start() else {
            return Ok(());
        };
        let origin = performance.now();
        self.state.borrow_mut().stage.mount(Duration::ZERO);

        if let Err(err) = self.attach_listeners(&window) {
            self.stop();
            return Err(err);
        }

        let next = Rc::clone(&self.frame_callback);
        let request = Rc::clone(&self.frame_request);
        let state = Rc::clone(&self.state);
        let pointer = Arc::clone(&self.pointer);
        let frame_loop = self.frame_loop.clone();
        let callback: FrameCallback = Closure::new(move |timestamp: f64| {
            request.set(None);
            if !frame_loop.is_current(generation) {
                return;
            }
            let now = Duration::from_secs_f64(((timestamp - origin) / 1000.0).max(0.0));
            state.borrow_mut().frame(now, &pointer);
            if let Some(frame) = next.borrow().as_ref() {
                request.set(request_frame(frame));
            }
        });
        self.frame_request.set(request_frame(&callback));
        *self.frame_callback.borrow_mut() = Some(callback);
        Ok(())
    }

    /// Stops the frame loop, cancels pending work and detaches listeners.
    pub fn stop(&mut self) {
        self.frame_loop.stop();
        if let Some(id) = self.frame_request.take() {
            if let Some(window) = web_sys::window() {
                if let Err(err) = window.cancel_animation_frame(id) {
                    warn!("failed to cancel animation frame {id}: {err:?}");
                }
            }
        }
        self.frame_callback.borrow_mut().take();
        self.state.borrow_mut().stage.teardown();
        for (target, kind, listener) in self.listeners.drain(..) {
            if let Err(err) =
                target.remove_event_listener_with_callback(kind, listener.as_ref().unchecked_ref())
            {
                warn!("failed to remove {kind} listener: {err:?}");
            }
        }
    }
}

impl WasmApp {
    fn attach_listeners(&mut self, window: &web_sys::Window) -> Result<(), JsValue> {
        let canvas: EventTarget = self.state.borrow().canvas.clone().into();
        let document: EventTarget = window
            .document()
            .ok_or_else(|| JsValue::from_str("missing document"))?
            .into();

        let pointer = Arc::clone(&self.pointer);
        self.listen(&canvas, "mousedown", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                pointer.move_to(offset(event));
                pointer.button_down(MouseButton::new(event.button() as u8));
            }
        })?;

        let (pointer, state) = (Arc::clone(&self.pointer), Rc::clone(&self.state));
        self.listen(&canvas, "mousemove", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                if let Some(gesture) = pointer.move_to(offset(event)) {
                    let mut state = state.borrow_mut();
                    let (viewport, now) = (state.viewport(), state.now);
                    state.stage.gesture(gesture, viewport, now);
                }
            }
        })?;

        let (pointer, state) = (Arc::clone(&self.pointer), Rc::clone(&self.state));
        self.listen(&canvas, "mouseup", move |event| {
            if let Some(event) = event.dyn_ref::<MouseEvent>() {
                pointer.move_to(offset(event));
                if let Some(gesture) = pointer.button_up(MouseButton::new(event.button() as u8)) {
                    let mut state = state.borrow_mut();
                    let (viewport, now) = (state.viewport(), state.now);
                    state.stage.gesture(gesture, viewport, now);
                }
            }
        })?;

        let pointer = Arc::clone(&self.pointer);
        self.listen(&canvas, "wheel", move |event| {
            if let Some(event) = event.dyn_ref::<WheelEvent>() {
                event.prevent_default();
                let pixels = match event.delta_mode() {
                    WheelEvent::DOM_DELTA_PIXEL => event.delta_y(),
                    _ => event.delta_y() * WHEEL_PIXELS_PER_STEP as f64,
                };
                pointer.scroll(-(pixels as f32) / WHEEL_PIXELS_PER_STEP);
            }
        })?;

        self.listen(&canvas, "contextmenu", |event| event.prevent_default())?;

        let (pointer, state) = (Arc::clone(&self.pointer), Rc::clone(&self.state));
        self.listen(&document, "keydown", move |event| {
            if let Some(key) = event
                .dyn_ref::<KeyboardEvent>()
                .and_then(|event| KeyCode::from_name(&event.key()))
            {
                pointer.set_key_down(key);
                state.borrow_mut().stage.key(key);
            }
        })?;

        let pointer = Arc::clone(&self.pointer);
        self.listen(&document, "keyup", move |event| {
            if let Some(key) = event
                .dyn_ref::<KeyboardEvent>()
                .and_then(|event| KeyCode::from_name(&event.key()))
            {
                pointer.set_key_up(key);
            }
        })?;

        Ok(())
    }

    fn listen<F>(&mut self, target: &EventTarget, kind: &'static str, handler: F) -> Result<(), JsValue>
    where
        F: FnMut(Event) + 'static,
    {
        let listener: Listener = Closure::new(handler);
        target.add_event_listener_with_callback(kind, listener.as_ref().unchecked_ref())?;
        self.listeners.push((target.clone(), kind, listener));
        Ok(())
    }
}

fn offset(event: &MouseEvent) -> Vec2 {
    Vec2::new(event.offset_x() as f32, event.offset_y() as f32)
}

fn request_frame(callback: &FrameCallback) -> Option<i32> {
    let window = web_sys::window()?;
    match window.request_animation_frame(callback.as_ref().unchecked_ref()) {
        Ok(id) => Some(id),
        Err(err) => {
            error!("requestAnimationFrame failed: {err:?}");
            None
        }
    }
}
