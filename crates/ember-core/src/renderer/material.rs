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

//! Surface materials and the property flags that select shader variants.

use crate::ember_bitflags;
use crate::math::LinearRgba;
use crate::renderer::api::shader::ShaderDefine;

/// Specular exponent used when a material does not set one.
pub const DEFAULT_SPECULAR_POWER: f32 = 10.0;

/// Alpha cutoff used by alpha-masked materials that do not set one.
pub const DEFAULT_ALPHA_CUTOFF: f32 = 0.5;

ember_bitflags! {
    /// Material properties that change the compiled shading program.
    pub struct MaterialFlags: u32 {
        /// Fragments below the alpha cutoff are discarded.
        const ALPHA_MASK = 1 << 0;
        /// The material carries its own specular exponent.
        const SPECULAR_POWER = 1 << 1;
    }
}

impl MaterialFlags {
    /// The shader defines matching the set flags.
    pub fn defines(&self) -> Vec<ShaderDefine> {
        let mut defines = Vec::new();
        if self.contains(Self::ALPHA_MASK) {
            defines.push(ShaderDefine::flag("ALPHA_MASK"));
        }
        if self.contains(Self::SPECULAR_POWER) {
            defines.push(ShaderDefine::flag("SPECULAR_POWER"));
        }
        defines
    }
}

/// The shading parameters of one mesh subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    /// Base color. Alpha scales the procedural mask of alpha-masked materials.
    pub diffuse: LinearRgba,
    /// Specular exponent, if the material sets one.
    pub specular_power: Option<f32>,
    /// Discard threshold, if the material is alpha-masked.
    pub alpha_cutoff: Option<f32>,
}

impl Material {
    /// An opaque material with the default specular exponent.
    pub const fn opaque(diffuse: LinearRgba) -> Self {
        Self {
            diffuse,
            specular_power: None,
            alpha_cutoff: None,
        }
    }

    /// Sets the specular exponent.
    pub const fn with_specular_power(mut self, power: f32) -> Self {
        self.specular_power = Some(power);
        self
    }

    /// Makes the material alpha-masked with the given cutoff.
    pub const fn with_alpha_cutoff(mut self, cutoff: f32) -> Self {
        self.alpha_cutoff = Some(cutoff);
        self
    }

    /// Returns `true` if the material discards fragments.
    pub const fn is_alpha_tested(&self) -> bool {
        self.alpha_cutoff.is_some()
    }

    /// The property flags of this material.
    pub fn flags(&self) -> MaterialFlags {
        let mut flags = MaterialFlags::empty();
        flags.set(MaterialFlags::ALPHA_MASK, self.alpha_cutoff.is_some());
        flags.set(MaterialFlags::SPECULAR_POWER, self.specular_power.is_some());
        flags
    }

    /// `(specular power, alpha cutoff)` as consumed by the shading program.
    pub fn shading_params(&self) -> [f32; 2] {
        [
            self.specular_power.unwrap_or(DEFAULT_SPECULAR_POWER),
            self.alpha_cutoff.unwrap_or(0.0),
        ]
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::opaque(LinearRgba::WHITE)
    }
}
