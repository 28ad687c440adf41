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

//! Scene configuration, read from a RON file.
//!
//! Every field has a default, so a missing file or a partial file both yield a
//! usable configuration. A file that exists but does not parse is an error.

use crate::error::SceneError;
use ember_core::math::{Quaternion, Vec3};
use ember_core::renderer::procedural::SURFACE_BUFF_SIZE;
use ember_core::renderer::DirectionalSun;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Seed of the static light placement.
pub const DEFAULT_LIGHT_SEED: u64 = 1;

/// Top-level scene configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Seed of the random generator placing static lights and coloring fired lights.
    pub light_seed: u64,
    /// Number of lights scattered just above the floor.
    pub floor_lights: u32,
    /// Number of lights along the two long walls, split evenly between them.
    pub wall_lights: u32,
    /// The directional light.
    pub sun: SunConfig,
    /// Procedural surfaces generated on the GPU.
    pub procedurals: Vec<ProceduralConfig>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            light_seed: DEFAULT_LIGHT_SEED,
            floor_lights: 30,
            wall_lights: 30,
            sun: SunConfig::default(),
            procedurals: vec![ProceduralConfig::default()],
        }
    }
}

impl SceneConfig {
    /// Loads a configuration from `path`.
    ///
    /// Returns the defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!(
                "No scene configuration at '{}', using defaults.",
                path.display()
            );
            return Ok(Self::default());
        }

        let bytes = std::fs::read(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ron_bytes(&bytes)?;
        log::info!("Loaded scene configuration from '{}'.", path.display());
        Ok(config)
    }

    /// Parses a configuration from RON text.
    pub fn from_ron_bytes(bytes: &[u8]) -> Result<Self, SceneError> {
        Ok(ron::de::from_bytes(bytes)?)
    }

    /// Serializes the configuration as pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(
            self,
            ron::ser::PrettyConfig::default().indentor("  ".to_string()),
        )
    }

    /// Total number of static point lights this configuration creates.
    pub fn static_light_count(&self) -> usize {
        (self.floor_lights + self.wall_lights) as usize
    }
}

/// Serialized form of the directional light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SunConfig {
    /// Travel direction, normalized on use.
    pub direction: Vec3,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Linear RGB color.
    pub color: Vec3,
}

impl Default for SunConfig {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-1.0, -1.0, 1.0),
            intensity: 0.3,
            color: Vec3::new(0.77, 0.901, 0.929),
        }
    }
}

impl SunConfig {
    /// Builds the runtime sun.
    pub fn to_sun(&self) -> DirectionalSun {
        DirectionalSun::new(self.direction, self.intensity, self.color)
    }
}

/// A procedural surface and its placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProceduralConfig {
    /// WGSL file defining `generate(p, time) -> f32`.
    pub generator_path: PathBuf,
    /// Workgroups per axis of the polygonizer dispatch.
    pub extent: u32,
    /// Vertex and index capacity of the generated buffers.
    pub capacity: u32,
    /// World-space position.
    pub position: Vec3,
    /// Rotation applied before translation.
    pub rotation: Quaternion,
    /// Uniform scale.
    pub scale: f32,
    /// Regenerated every frame when set, only on demand otherwise.
    pub dynamic: bool,
    /// Specular power of the surface material.
    pub specular_power: f32,
}

impl Default for ProceduralConfig {
    fn default() -> Self {
        Self {
            generator_path: PathBuf::from("assets/shaders/generators/blob.wgsl"),
            extent: 10,
            capacity: SURFACE_BUFF_SIZE,
            position: Vec3::new(0.0, 100.0, 0.0),
            rotation: Quaternion::IDENTITY,
            scale: 15.0,
            dynamic: true,
            specular_power: 10.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_demo_scene() {
        let config = SceneConfig::default();
        assert_eq!(config.light_seed, 1);
        assert_eq!(config.static_light_count(), 60);
        assert_eq!(config.procedurals.len(), 1);

        let procedural = &config.procedurals[0];
        assert_eq!(procedural.extent, 10);
        assert_eq!(procedural.capacity, 250_000);
        assert_eq!(procedural.position, Vec3::new(0.0, 100.0, 0.0));
        assert_eq!(procedural.scale, 15.0);
        assert!(procedural.dynamic);
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let config = SceneConfig::from_ron_bytes(b"(floor_lights: 4, wall_lights: 2)").unwrap();
        assert_eq!(config.floor_lights, 4);
        assert_eq!(config.wall_lights, 2);
        assert_eq!(config.light_seed, 1);
        assert_eq!(config.sun, SunConfig::default());
    }

    #[test]
    fn malformed_files_are_rejected() {
        let result = SceneConfig::from_ron_bytes(b"(floor_lights: \"many\")");
        assert!(matches!(result, Err(SceneError::Parse(_))));
    }

    #[test]
    fn pretty_output_parses_back() {
        let mut config = SceneConfig::default();
        config.procedurals[0].dynamic = false;
        let text = config.to_ron_string().unwrap();
        assert_eq!(SceneConfig::from_ron_bytes(text.as_bytes()).unwrap(), config);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = SceneConfig::load("definitely/not/a/scene.ron").unwrap();
        assert_eq!(config, SceneConfig::default());
    }
}
