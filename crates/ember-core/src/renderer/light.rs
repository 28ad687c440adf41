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

//! Light descriptions and their GPU records.

use crate::math::{LinearRgba, Vec3, Vec4};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// A point light with a hard influence radius.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    /// World-space position.
    pub position: Vec3,
    /// Distance beyond which the light has no effect.
    pub radius: f32,
    /// Linear RGB color.
    pub color: Vec3,
}

impl PointLight {
    /// Creates a point light.
    pub const fn new(position: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            position,
            radius,
            color,
        }
    }

    /// Packs the light into its GPU record.
    #[inline]
    pub fn to_gpu(&self) -> GpuPointLight {
        GpuPointLight {
            position_and_radius: [
                self.position.x,
                self.position.y,
                self.position.z,
                self.radius,
            ],
            color: [self.color.x, self.color.y, self.color.z, 1.0],
        }
    }
}

/// GPU-side point light record. 32 bytes, matching `PointLight` in the WGSL sources.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct GpuPointLight {
    /// `xyz` position, `w` radius.
    pub position_and_radius: [f32; 4],
    /// `rgb` color, `a` unused.
    pub color: [f32; 4],
}

/// The single directional light of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalSun {
    /// Direction the light travels, normalized in `xyz`; intensity in `w`.
    pub direction_and_intensity: Vec4,
    /// Linear color.
    pub color: LinearRgba,
}

impl DirectionalSun {
    /// Creates a sun travelling along `direction` (normalized here).
    pub fn new(direction: Vec3, intensity: f32, color: Vec3) -> Self {
        Self {
            direction_and_intensity: Vec4::from_vec3(direction.normalize(), intensity),
            color: LinearRgba::from_vec3(color),
        }
    }

    /// The normalized travel direction.
    pub fn direction(&self) -> Vec3 {
        self.direction_and_intensity.truncate()
    }

    /// The intensity multiplier.
    pub fn intensity(&self) -> f32 {
        self.direction_and_intensity.w
    }
}

impl Default for DirectionalSun {
    fn default() -> Self {
        Self::new(
            Vec3::new(-1.0, -1.0, 1.0),
            0.3,
            Vec3::new(0.77, 0.901, 0.929),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn gpu_point_light_is_32_bytes() {
        assert_eq!(std::mem::size_of::<GpuPointLight>(), 32);
    }

    #[test]
    fn to_gpu_packs_radius_in_w() {
        let light = PointLight::new(Vec3::new(1.0, 2.0, 3.0), 250.0, Vec3::new(0.5, 0.25, 1.0));
        let gpu = light.to_gpu();
        assert_eq!(gpu.position_and_radius, [1.0, 2.0, 3.0, 250.0]);
        assert_eq!(gpu.color, [0.5, 0.25, 1.0, 1.0]);
    }

    #[test]
    fn default_sun_is_normalized() {
        let sun = DirectionalSun::default();
        assert_relative_eq!(sun.direction().length(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(sun.intensity(), 0.3);
        assert_relative_eq!(sun.color.g, 0.901);
    }
}
