// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Translates `winit` window events into the engine's input events.
//!
//! The demo only needs keys, mouse buttons and cursor motion; everything else
//! a window reports is dropped here.

use winit::event::{ElementState, MouseButton as WinitMouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// A backend-agnostic user input event.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    /// A key went down. Auto-repeats are not reported.
    KeyPressed {
        /// The physical key code, e.g. `"KeyR"` or `"Numpad8"`.
        key_code: String,
    },
    /// A key went up.
    KeyReleased {
        /// The physical key code.
        key_code: String,
    },
    /// A mouse button went down.
    MouseButtonPressed {
        /// The button.
        button: MouseButton,
    },
    /// A mouse button went up.
    MouseButtonReleased {
        /// The button.
        button: MouseButton,
    },
    /// The cursor moved inside the window.
    MouseMoved {
        /// Horizontal position in physical pixels.
        x: f32,
        /// Vertical position in physical pixels.
        y: f32,
    },
}

/// A mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    /// Another button, identified by a numeric code.
    Other(u16),
}

/// Translates a `WindowEvent` into an [`InputEvent`].
///
/// Returns `None` for events that are not direct user input (resizes, focus
/// changes) and for keys `winit` cannot identify.
pub fn translate_winit_input(event: &WindowEvent) -> Option<InputEvent> {
    match event {
        WindowEvent::KeyboardInput {
            event: key_event, ..
        } => {
            let PhysicalKey::Code(keycode) = key_event.physical_key else {
                return None;
            };
            let key_code = map_keycode_to_string(keycode);
            match key_event.state {
                ElementState::Pressed if !key_event.repeat => {
                    Some(InputEvent::KeyPressed { key_code })
                }
                ElementState::Released => Some(InputEvent::KeyReleased { key_code }),
                _ => None,
            }
        }
        WindowEvent::CursorMoved { position, .. } => Some(InputEvent::MouseMoved {
            x: position.x as f32,
            y: position.y as f32,
        }),
        WindowEvent::MouseInput { state, button, .. } => {
            let button = map_mouse_button(*button);
            Some(match state {
                ElementState::Pressed => InputEvent::MouseButtonPressed { button },
                ElementState::Released => InputEvent::MouseButtonReleased { button },
            })
        }
        _ => None,
    }
}

fn map_keycode_to_string(keycode: KeyCode) -> String {
    format!("{keycode:?}")
}

fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    match button {
        WinitMouseButton::Left => MouseButton::Left,
        WinitMouseButton::Right => MouseButton::Right,
        WinitMouseButton::Middle => MouseButton::Middle,
        WinitMouseButton::Back => MouseButton::Back,
        WinitMouseButton::Forward => MouseButton::Forward,
        WinitMouseButton::Other(id) => MouseButton::Other(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn keycodes_use_their_physical_names() {
        assert_eq!(map_keycode_to_string(KeyCode::KeyR), "KeyR");
        assert_eq!(map_keycode_to_string(KeyCode::Numpad8), "Numpad8");
        assert_eq!(map_keycode_to_string(KeyCode::F3), "F3");
        assert_eq!(map_keycode_to_string(KeyCode::Space), "Space");
    }

    #[test]
    fn mouse_buttons_map_one_to_one() {
        assert_eq!(map_mouse_button(WinitMouseButton::Left), MouseButton::Left);
        assert_eq!(map_mouse_button(WinitMouseButton::Right), MouseButton::Right);
        assert_eq!(
            map_mouse_button(WinitMouseButton::Other(9)),
            MouseButton::Other(9)
        );
    }

    #[test]
    fn right_button_press_and_release() {
        let press = WindowEvent::MouseInput {
            device_id: winit::event::DeviceId::dummy(),
            state: ElementState::Pressed,
            button: WinitMouseButton::Right,
        };
        let release = WindowEvent::MouseInput {
            device_id: winit::event::DeviceId::dummy(),
            state: ElementState::Released,
            button: WinitMouseButton::Right,
        };
        assert_eq!(
            translate_winit_input(&press),
            Some(InputEvent::MouseButtonPressed {
                button: MouseButton::Right
            })
        );
        assert_eq!(
            translate_winit_input(&release),
            Some(InputEvent::MouseButtonReleased {
                button: MouseButton::Right
            })
        );
    }

    #[test]
    fn cursor_motion_keeps_subpixel_positions() {
        let moved = WindowEvent::CursorMoved {
            device_id: winit::event::DeviceId::dummy(),
            position: PhysicalPosition::new(100.5, 200.75),
        };
        assert_eq!(
            translate_winit_input(&moved),
            Some(InputEvent::MouseMoved { x: 100.5, y: 200.75 })
        );
    }

    #[test]
    fn window_events_are_ignored() {
        let resize = WindowEvent::Resized(winit::dpi::PhysicalSize::new(100, 100));
        assert_eq!(translate_winit_input(&resize), None);
        assert_eq!(translate_winit_input(&WindowEvent::Focused(true)), None);
        assert_eq!(translate_winit_input(&WindowEvent::CloseRequested), None);
    }
}
