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

//! Built-in WGSL sources of the frame pipeline lanes.
//!
//! Lanes request their programs from the [`ShaderCompiler`] by file name; the
//! backend compiler is seeded with [`builtin_shaders`] so these names resolve
//! without touching the file system.
//!
//! Sources may use `#define`-style conditionals (`#ifdef`, `#ifndef`,
//! `#else`, `#endif`) and tokens substituted from [`ShaderDefine`] values.
//!
//! [`ShaderCompiler`]: ember_core::renderer::ShaderCompiler

use ember_core::renderer::{
    MaterialFlags, ShaderDefine, MAX_LIGHTS_IN_SCENE, MAX_LIGHTS_PER_TILE, TILE_SIZE,
};

/// Counter reset (`init`) and draw-argument finalization (`finalize`) of generated meshes.
pub const POLYGONIZE_HELPERS: &str = "polygonize_helpers.wgsl";

/// Cell-by-cell surface extraction (`polygonize`). Needs a generator prelude.
pub const POLYGONIZE: &str = "polygonize.wgsl";

/// Tiled light culling (`cull_lights`).
pub const TILE_LIGHTS: &str = "tile_lights.wgsl";

/// Depth-only vertex programs (`vs_main`, `vs_procedural`).
pub const DEPTH_PREPASS: &str = "depth_prepass.wgsl";

/// Forward shading (`vs_main`, `vs_procedural`, `fs_main`).
pub const FORWARD: &str = "forward.wgsl";

/// Per-tile light count visualization (`vs_fullscreen`, `fs_main`).
pub const DEBUG_LIGHTS: &str = "debug_lights.wgsl";

/// Static light marker cubes (`vs_main`, `fs_main`).
pub const LIGHT_MARKERS: &str = "light_markers.wgsl";

const BUILTIN_SHADERS: [(&str, &str); 7] = [
    (POLYGONIZE_HELPERS, include_str!("polygonize_helpers.wgsl")),
    (POLYGONIZE, include_str!("polygonize.wgsl")),
    (TILE_LIGHTS, include_str!("tile_lights.wgsl")),
    (DEPTH_PREPASS, include_str!("depth_prepass.wgsl")),
    (FORWARD, include_str!("forward.wgsl")),
    (DEBUG_LIGHTS, include_str!("debug_lights.wgsl")),
    (LIGHT_MARKERS, include_str!("light_markers.wgsl")),
];

/// Every built-in source as `(file name, WGSL text)`.
pub fn builtin_shaders() -> &'static [(&'static str, &'static str)] {
    &BUILTIN_SHADERS
}

/// The built-in source registered under `path`.
pub fn builtin_source(path: &str) -> Option<&'static str> {
    BUILTIN_SHADERS
        .iter()
        .find(|(name, _)| *name == path)
        .map(|(_, source)| *source)
}

/// The tiling constants as defines, for every program reading the tile buffers.
pub fn tiling_defines() -> Vec<ShaderDefine> {
    vec![
        ShaderDefine::value("TILE_SIZE", TILE_SIZE),
        ShaderDefine::value("MAX_LIGHTS_PER_TILE", MAX_LIGHTS_PER_TILE),
        ShaderDefine::value("MAX_LIGHTS_IN_SCENE", MAX_LIGHTS_IN_SCENE),
    ]
}

/// Defines of a forward shading variant: the material switches plus the tiling constants.
pub fn forward_defines(flags: MaterialFlags) -> Vec<ShaderDefine> {
    let mut defines = flags.defines();
    defines.extend(tiling_defines());
    defines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &str) -> &'static str {
        builtin_source(path).unwrap()
    }

    #[test]
    fn every_entry_point_is_defined() {
        let entries = [
            (POLYGONIZE_HELPERS, "fn init("),
            (POLYGONIZE_HELPERS, "fn finalize("),
            (POLYGONIZE, "fn polygonize("),
            (TILE_LIGHTS, "fn cull_lights("),
            (DEPTH_PREPASS, "fn vs_main("),
            (DEPTH_PREPASS, "fn vs_procedural("),
            (FORWARD, "fn vs_main("),
            (FORWARD, "fn vs_procedural("),
            (FORWARD, "fn fs_main("),
            (DEBUG_LIGHTS, "fn vs_fullscreen("),
            (DEBUG_LIGHTS, "fn fs_main("),
            (LIGHT_MARKERS, "fn vs_main("),
            (LIGHT_MARKERS, "fn fs_main("),
        ];
        for (path, entry) in entries {
            assert!(source(path).contains(entry), "{path} lacks {entry}");
        }
    }

    #[test]
    fn polygonizer_leaves_the_field_to_the_prelude() {
        let code: Vec<&str> = source(POLYGONIZE)
            .lines()
            .filter(|l| !l.trim_start().starts_with("//"))
            .collect();
        assert!(code.iter().any(|l| l.contains("generate(")));
        assert!(!code.iter().any(|l| l.contains("fn generate(")));
    }

    #[test]
    fn forward_variants_carry_the_tiling_constants() {
        let names = |flags| {
            forward_defines(flags)
                .into_iter()
                .map(|d| d.name.into_owned())
                .collect::<Vec<_>>()
        };
        let plain = names(MaterialFlags::empty());
        assert_eq!(plain, ["TILE_SIZE", "MAX_LIGHTS_PER_TILE", "MAX_LIGHTS_IN_SCENE"]);
        let masked = names(MaterialFlags::ALPHA_MASK | MaterialFlags::SPECULAR_POWER);
        assert_eq!(masked.len(), 5);
        assert!(masked.iter().any(|n| n == "ALPHA_MASK"));
        assert!(masked.iter().any(|n| n == "TILE_SIZE"));
    }

    #[test]
    fn conditionals_are_balanced() {
        for (path, text) in builtin_shaders() {
            let opened = text
                .lines()
                .filter(|l| l.trim_start().starts_with("#if"))
                .count();
            let closed = text
                .lines()
                .filter(|l| l.trim_start().starts_with("#endif"))
                .count();
            assert_eq!(opened, closed, "{path}");
        }
    }

    #[test]
    fn tiling_defines_carry_the_constants() {
        let defines = tiling_defines();
        assert_eq!(defines[0].value, "8");
        assert_eq!(defines[1].value, "32");
        assert_eq!(defines[2].value, "1000");
        assert!(builtin_source("missing.wgsl").is_none());
    }
}
