//! Keyboard and mouse state tracking.
//!
//! The application feeds winit events in; consumers poll the state once
//! per frame. Click picking reads [`InputState::cursor_position`] together
//! with [`InputState::is_mouse_just_pressed`].

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Left,
        }
    }
}

/// Current keyboard and mouse state.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    just_pressed_buttons: HashSet<MouseButton>,
    cursor_position: (f32, f32),
    mouse_delta: (f32, f32),
}

impl InputState {
    /// Creates an empty input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame state; call once at the start of each frame.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    /// Records a key press event.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    /// Records a key release event.
    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Records a mouse button press event.
    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    /// Records a mouse button release event.
    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records a cursor move to window coordinates.
    pub fn on_cursor_moved(&mut self, x: f32, y: f32) {
        let old = self.cursor_position;
        self.cursor_position = (x, y);
        self.mouse_delta = (self.mouse_delta.0 + x - old.0, self.mouse_delta.1 + y - old.1);
    }

    /// Returns true while a key is held.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Returns true on the frame a key went down.
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// Returns true while a mouse button is held.
    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    /// Returns true on the frame a mouse button went down.
    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    /// Returns the cursor position in window coordinates.
    pub fn cursor_position(&self) -> (f32, f32) {
        self.cursor_position
    }

    /// Returns the accumulated cursor movement since the last frame.
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_lasts_one_frame() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Left);

        assert!(input.is_mouse_just_pressed(MouseButton::Left));
        assert!(input.is_mouse_pressed(MouseButton::Left));

        input.begin_frame();
        assert!(!input.is_mouse_just_pressed(MouseButton::Left));
        assert!(input.is_mouse_pressed(MouseButton::Left));
    }

    #[test]
    fn test_held_button_does_not_retrigger() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Left);
        input.begin_frame();
        // OS key repeat delivers another press without a release.
        input.on_mouse_pressed(MouseButton::Left);
        assert!(!input.is_mouse_just_pressed(MouseButton::Left));
    }

    #[test]
    fn test_mouse_delta_accumulates_within_frame() {
        let mut input = InputState::new();
        input.on_cursor_moved(10.0, 0.0);
        input.on_cursor_moved(15.0, 5.0);
        assert_eq!(input.mouse_delta(), (15.0, 5.0));
        assert_eq!(input.cursor_position(), (15.0, 5.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_key_press_release_cycle() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }
}
