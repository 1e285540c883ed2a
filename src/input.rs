use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Largest pointer travel, in pixels, between press and release that still
/// counts as a click.
pub const CLICK_SLOP: f32 = 5.0;

/// Pixels per wheel "line" reported by browsers in pixel delta mode.
pub const WHEEL_PIXELS_PER_STEP: f32 = 100.0;

/// Keys the viewer reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Escape,
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Escape" | "Esc" => Some(Self::Escape),
            _ => None,
        }
    }
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const MIDDLE: Self = Self(1);
    pub const RIGHT: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// What the host should do with a pointer event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// Drag with the left button: rotate around the target.
    Orbit(Vec2),
    /// Drag with the right or middle button.
    Pan(Vec2),
    /// Press and release without moving past [`CLICK_SLOP`].
    Click(Vec2),
}

#[derive(Debug, Clone, Copy)]
struct Press {
    button: MouseButton,
    origin: Vec2,
    travelled: f32,
}

/// Pointer and keyboard snapshot shared between the event source and the
/// frame loop.
#[derive(Debug, Default)]
pub struct PointerState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse_buttons: RwLock<HashSet<MouseButton>>,
    mouse_position: RwLock<Vec2>,
    press: RwLock<Option<Press>>,
    wheel: RwLock<f32>,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.read().contains(&button)
    }

    pub fn mouse_position(&self) -> Vec2 {
        *self.mouse_position.read()
    }

    pub fn button_down(&self, button: MouseButton) {
        self.mouse_buttons.write().insert(button);
        let mut press = self.press.write();
        if press.is_none() {
            *press = Some(Press {
                button,
                origin: self.mouse_position(),
                travelled: 0.0,
            });
        }
    }

    /// Releases `button`; a release that ends a short press is a click.
    pub fn button_up(&self, button: MouseButton) -> Option<Gesture> {
        self.mouse_buttons.write().remove(&button);
        let mut press = self.press.write();
        match *press {
            Some(current) if current.button == button => {
                *press = None;
                (button == MouseButton::LEFT && current.travelled <= CLICK_SLOP)
                    .then(|| Gesture::Click(self.mouse_position()))
            }
            _ => None,
        }
    }

    /// Records a pointer move, returning the drag it produces if a button
    /// is held and the pointer has left the click slop.
    pub fn move_to(&self, position: Vec2) -> Option<Gesture> {
        let delta = {
            let mut current = self.mouse_position.write();
            let delta = position - *current;
            *current = position;
            delta
        };
        let mut press = self.press.write();
        let press = press.as_mut()?;
        press.travelled = press.travelled.max(position.distance(press.origin));
        if press.travelled <= CLICK_SLOP {
            return None;
        }
        Some(if press.button == MouseButton::LEFT {
            Gesture::Orbit(delta)
        } else {
            Gesture::Pan(delta)
        })
    }

    /// Adds wheel motion in steps; positive zooms in.
    pub fn scroll(&self, steps: f32) {
        *self.wheel.write() += steps;
    }

    /// Returns and clears the accumulated wheel steps.
    pub fn take_wheel(&self) -> f32 {
        std::mem::take(&mut *self.wheel.write())
    }

    /// Drag distance of the current press, if any.
    pub fn drag_distance(&self) -> Option<f32> {
        self.press.read().map(|press| press.travelled)
    }
}
