//! Building blocks for the treasure island viewer.
//!
//! The crate loads an island scene, frames the camera around the island once
//! its geometry is available and animates the camera toward treasure chests
//! the user clicks. Everything time-dependent is driven by the host through
//! [`IslandStage::advance`], so the same code runs under a winit event loop,
//! `requestAnimationFrame` in the browser, or a virtual clock in tests.

pub mod app;
pub mod bounds;
pub mod camera;
pub mod framing;
pub mod input;
pub mod loader;
pub mod node;
pub mod obj;
pub mod picking;
pub mod poll;
pub mod render;
pub mod scene;
pub mod schedule;
pub mod stage;
pub mod travel;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use bounds::{compute_bounds, BoundingBox};
pub use camera::{Camera, CameraRig, OrbitSettings};
pub use framing::{frame, FrameConfig, FrameResult, FramingError};
pub use input::{Gesture, KeyCode, MouseButton, PointerState, WHEEL_PIXELS_PER_STEP};
pub use loader::{ModelSlot, SlotState};
pub use node::{SceneNode, Transform};
pub use obj::{load_obj_from_str, MeshData};
pub use poll::{Backoff, PollState, ReadinessPoll, RetryPolicy};
pub use render::{CameraParams, LightParams, Renderer};
pub use scene::{Chest, IslandScene, Light, LightKind};
pub use schedule::{TimerId, Timers};
pub use stage::{DrawItem, DrawKind, IslandStage, StageError};
pub use travel::{TravelAnimator, TravelConfig, TravelStatus, TravelToken};
