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

//! A fly camera driven by the arrow keys and right-button mouse look.

use ember_core::math::{Mat4, Vec3, FRAC_PI_2};

/// Pitch stays this far away from straight up or down.
const PITCH_MARGIN: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlyCamera {
    position: Vec3,
    /// Rotation around the world Y axis. Zero looks down +Z.
    yaw: f32,
    pitch: f32,
}

impl FlyCamera {
    /// Places the camera at `eye`, looking towards `target`.
    pub fn look_at(eye: Vec3, target: Vec3) -> Self {
        let dir = (target - eye).normalize();
        let mut camera = Self {
            position: eye,
            yaw: dir.x.atan2(dir.z),
            pitch: 0.0,
        };
        camera.set_pitch(dir.y.clamp(-1.0, 1.0).asin());
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Unit view direction.
    pub fn forward(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(sin_yaw * cos_pitch, sin_pitch, cos_yaw * cos_pitch)
    }

    /// Moves along the view direction.
    pub fn advance(&mut self, distance: f32) {
        self.position += self.forward() * distance;
    }

    /// Moves along the world up axis.
    pub fn rise(&mut self, distance: f32) {
        self.position += Vec3::Y * distance;
    }

    /// Turns right by `angle` radians. Negative turns left.
    pub fn turn(&mut self, angle: f32) {
        self.yaw -= angle;
    }

    /// Tilts up by `angle` radians. Negative tilts down.
    pub fn tilt(&mut self, angle: f32) {
        self.set_pitch(self.pitch + angle);
    }

    fn set_pitch(&mut self, pitch: f32) {
        let limit = FRAC_PI_2 - PITCH_MARGIN;
        self.pitch = pitch.clamp(-limit, limit);
    }

    /// The world-to-view matrix.
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.forward(), Vec3::Y)
            .unwrap_or(Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn right_of(camera: &FlyCamera) -> Vec3 {
        camera.forward().cross(Vec3::Y).normalize()
    }

    fn start() -> FlyCamera {
        FlyCamera::look_at(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0))
    }

    #[test]
    fn looks_down_positive_z_initially() {
        let forward = start().forward();
        assert_relative_eq!(forward.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(forward.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(forward.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn advancing_follows_the_view_direction() {
        let mut camera = start();
        camera.advance(10.0);
        assert_relative_eq!(camera.position().z, 5.0, epsilon = 1e-5);
        camera.rise(2.0);
        assert_relative_eq!(camera.position().y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn turning_right_swings_towards_the_right_vector() {
        let mut camera = start();
        let right = right_of(&camera);
        camera.turn(0.1);
        assert!(camera.forward().dot(right) > 0.0);
    }

    #[test]
    fn pitch_never_reaches_the_pole() {
        let mut camera = start();
        camera.tilt(10.0);
        assert!(camera.forward().y < 1.0);
        assert!(camera.view() != Mat4::IDENTITY);
    }

    #[test]
    fn view_maps_the_eye_to_the_origin() {
        let camera = start();
        let eye = camera.view().transform_point(camera.position());
        assert_relative_eq!(eye.length(), 0.0, epsilon = 1e-5);
    }
}
