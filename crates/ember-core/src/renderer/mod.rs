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

//! Backend-agnostic rendering contracts and the GPU data layouts of the frame pipeline.

pub mod api;
pub mod error;
pub mod light;
pub mod material;
pub mod procedural;
pub mod tiling;
pub mod traits;

pub use self::api::*;
pub use self::error::{PipelineError, RenderError, ResourceError, ShaderError};
pub use self::light::{DirectionalSun, GpuPointLight, PointLight};
pub use self::material::{Material, MaterialFlags};
pub use self::tiling::{
    cull_tile_lights, FrameUniforms, TileGrid, TileLightLists, TilingUniforms,
    MAX_LIGHTS_IN_SCENE, MAX_LIGHTS_PER_TILE, TILE_SIZE,
};
pub use self::traits::*;
