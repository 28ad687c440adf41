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

//! Keyboard and mouse bindings of the demo.
//!
//! | Key | Action |
//! |---|---|
//! | Arrow up / down | move forward / back |
//! | Arrow left / right | turn |
//! | Insert / Delete | move up / down |
//! | Home / End | tilt up / down |
//! | Shift | move faster |
//! | Right mouse drag | look around |
//! | Numpad 1 | switch between the shading and tile-debug routines |
//! | F1 | toggle depth-aware tile culling |
//! | F2 | toggle wireframe |
//! | F3 | toggle vsync |
//! | F4 | toggle light markers |
//! | F5 | reload procedural generators |
//! | Space | fire a light |
//! | Numpad 9 | recompile every pass |
//! | Numpad 8 / 2 / 4 / 6 | nudge the first entity |
//! | Escape | quit |

use crate::camera::FlyCamera;
use ember_core::math::Vec3;
use ember_infra::{InputEvent, MouseButton};

/// World units per second.
const MOVE_SPEED: f32 = 25.0;
/// Radians per second.
const TURN_SPEED: f32 = 1.5;
/// Radians per pixel of mouse motion.
const MOUSE_SPEED: f32 = 0.005;
/// Multiplier applied while Shift is held.
const BOOST: f32 = 4.0;

/// A one-shot action triggered by a key press.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DemoCommand {
    ToggleRoutine,
    ToggleTileDebug,
    ToggleWireframe,
    ToggleVsync,
    ToggleLightOverlay,
    ReloadProcedural,
    FireLight,
    ReinitShading,
    /// Moves the first entity by the given offset.
    NudgeEntity(Vec3),
    Exit,
}

/// The command bound to `key_code`, if any.
pub fn command_for_key(key_code: &str) -> Option<DemoCommand> {
    let command = match key_code {
        "Numpad1" => DemoCommand::ToggleRoutine,
        "F1" => DemoCommand::ToggleTileDebug,
        "F2" => DemoCommand::ToggleWireframe,
        "F3" => DemoCommand::ToggleVsync,
        "F4" => DemoCommand::ToggleLightOverlay,
        "F5" => DemoCommand::ReloadProcedural,
        "Space" => DemoCommand::FireLight,
        "Numpad9" => DemoCommand::ReinitShading,
        "Numpad8" => DemoCommand::NudgeEntity(Vec3::Y),
        "Numpad2" => DemoCommand::NudgeEntity(-Vec3::Y),
        "Numpad4" => DemoCommand::NudgeEntity(-Vec3::X),
        "Numpad6" => DemoCommand::NudgeEntity(Vec3::X),
        "Escape" => DemoCommand::Exit,
        _ => return None,
    };
    Some(command)
}

/// Continuous camera motions, applied every frame while their key is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Forward,
    Back,
    TurnLeft,
    TurnRight,
    Up,
    Down,
    TiltUp,
    TiltDown,
}

impl Motion {
    const COUNT: usize = 8;

    fn for_key(key_code: &str) -> Option<Self> {
        let motion = match key_code {
            "ArrowUp" => Motion::Forward,
            "ArrowDown" => Motion::Back,
            "ArrowLeft" => Motion::TurnLeft,
            "ArrowRight" => Motion::TurnRight,
            "Insert" => Motion::Up,
            "Delete" => Motion::Down,
            "Home" => Motion::TiltUp,
            "End" => Motion::TiltDown,
            _ => return None,
        };
        Some(motion)
    }
}

/// Tracks held keys and the mouse-look drag.
#[derive(Debug, Default)]
pub struct Controls {
    held: [bool; Motion::COUNT],
    boost: bool,
    looking: bool,
    last_cursor: Option<(f32, f32)>,
}

impl Controls {
    /// Updates the held state and returns the command `event` triggers.
    ///
    /// Mouse motion during a right-button drag turns `camera` immediately.
    pub fn handle(&mut self, event: &InputEvent, camera: &mut FlyCamera) -> Option<DemoCommand> {
        match event {
            InputEvent::KeyPressed { key_code } => {
                if is_shift(key_code) {
                    self.boost = true;
                } else if let Some(motion) = Motion::for_key(key_code) {
                    self.held[motion as usize] = true;
                }
                command_for_key(key_code)
            }
            InputEvent::KeyReleased { key_code } => {
                if is_shift(key_code) {
                    self.boost = false;
                } else if let Some(motion) = Motion::for_key(key_code) {
                    self.held[motion as usize] = false;
                }
                None
            }
            InputEvent::MouseButtonPressed {
                button: MouseButton::Right,
            } => {
                self.looking = true;
                None
            }
            InputEvent::MouseButtonReleased {
                button: MouseButton::Right,
            } => {
                self.looking = false;
                None
            }
            InputEvent::MouseMoved { x, y } => {
                if let (true, Some((last_x, last_y))) = (self.looking, self.last_cursor) {
                    camera.turn((x - last_x) * MOUSE_SPEED);
                    camera.tilt((last_y - y) * MOUSE_SPEED);
                }
                self.last_cursor = Some((*x, *y));
                None
            }
            _ => None,
        }
    }

    /// Applies the held motions for a frame of `dt` seconds.
    pub fn apply(&self, camera: &mut FlyCamera, dt: f32) {
        let boost = if self.boost { BOOST } else { 1.0 };
        let step = MOVE_SPEED * dt * boost;
        let angle = TURN_SPEED * dt * boost;
        let held = |motion: Motion| self.held[motion as usize];

        if held(Motion::Forward) {
            camera.advance(step);
        }
        if held(Motion::Back) {
            camera.advance(-step);
        }
        if held(Motion::TurnLeft) {
            camera.turn(-angle);
        }
        if held(Motion::TurnRight) {
            camera.turn(angle);
        }
        // Vertical motion and tilt ignore the boost.
        if held(Motion::Up) {
            camera.rise(MOVE_SPEED * dt);
        }
        if held(Motion::Down) {
            camera.rise(-MOVE_SPEED * dt);
        }
        if held(Motion::TiltUp) {
            camera.tilt(TURN_SPEED * dt);
        }
        if held(Motion::TiltDown) {
            camera.tilt(-TURN_SPEED * dt);
        }
    }
}

fn is_shift(key_code: &str) -> bool {
    matches!(key_code, "ShiftLeft" | "ShiftRight")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> FlyCamera {
        FlyCamera::look_at(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0))
    }

    fn press(key: &str) -> InputEvent {
        InputEvent::KeyPressed {
            key_code: key.to_string(),
        }
    }

    fn release(key: &str) -> InputEvent {
        InputEvent::KeyReleased {
            key_code: key.to_string(),
        }
    }

    #[test]
    fn function_keys_map_to_toggles() {
        assert_eq!(command_for_key("F1"), Some(DemoCommand::ToggleTileDebug));
        assert_eq!(command_for_key("F2"), Some(DemoCommand::ToggleWireframe));
        assert_eq!(command_for_key("F3"), Some(DemoCommand::ToggleVsync));
        assert_eq!(command_for_key("F5"), Some(DemoCommand::ReloadProcedural));
        assert_eq!(command_for_key("Numpad1"), Some(DemoCommand::ToggleRoutine));
        assert_eq!(command_for_key("KeyQ"), None);
    }

    #[test]
    fn numpad_nudges_by_one_unit() {
        assert_eq!(
            command_for_key("Numpad8"),
            Some(DemoCommand::NudgeEntity(Vec3::new(0.0, 1.0, 0.0)))
        );
        assert_eq!(
            command_for_key("Numpad4"),
            Some(DemoCommand::NudgeEntity(Vec3::new(-1.0, 0.0, 0.0)))
        );
    }

    #[test]
    fn held_keys_move_until_released() {
        let mut controls = Controls::default();
        let mut cam = camera();
        assert_eq!(controls.handle(&press("ArrowUp"), &mut cam), None);
        controls.apply(&mut cam, 1.0);
        assert_relative_eq!(cam.position().z, -5.0 + MOVE_SPEED, epsilon = 1e-4);

        controls.handle(&release("ArrowUp"), &mut cam);
        controls.apply(&mut cam, 1.0);
        assert_relative_eq!(cam.position().z, -5.0 + MOVE_SPEED, epsilon = 1e-4);
    }

    #[test]
    fn shift_boosts_ground_motion() {
        let mut controls = Controls::default();
        let mut cam = camera();
        controls.handle(&press("ShiftLeft"), &mut cam);
        controls.handle(&press("ArrowDown"), &mut cam);
        controls.apply(&mut cam, 0.5);
        assert_relative_eq!(
            cam.position().z,
            -5.0 - MOVE_SPEED * 0.5 * BOOST,
            epsilon = 1e-4
        );
    }

    #[test]
    fn mouse_turns_only_while_dragging() {
        let mut controls = Controls::default();
        let mut cam = camera();
        let start = cam.forward();

        controls.handle(&InputEvent::MouseMoved { x: 10.0, y: 10.0 }, &mut cam);
        controls.handle(&InputEvent::MouseMoved { x: 60.0, y: 10.0 }, &mut cam);
        assert_eq!(cam.forward(), start);

        controls.handle(
            &InputEvent::MouseButtonPressed {
                button: MouseButton::Right,
            },
            &mut cam,
        );
        controls.handle(&InputEvent::MouseMoved { x: 110.0, y: 10.0 }, &mut cam);
        let right = camera().forward().cross(Vec3::Y).normalize();
        assert!(cam.forward().dot(right) > 0.0);
    }
}
