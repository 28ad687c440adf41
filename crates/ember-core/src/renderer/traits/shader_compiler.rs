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

use crate::renderer::api::shader::{ShaderDefine, ShaderModuleId};
use crate::renderer::traits::GraphicsDevice;
use std::fmt::Debug;

/// A request for a compute program.
#[derive(Debug, Clone, Copy)]
pub struct ComputeShaderRequest<'a> {
    /// The shader library path, e.g. `"tile_lights.wgsl"`.
    pub path: &'a str,
    /// The compute entry point.
    pub entry_point: &'a str,
    /// Defines applied before compilation.
    pub defines: &'a [ShaderDefine],
    /// Source text inserted ahead of the file, after the defines.
    pub prelude: Option<&'a str>,
}

/// A request for a vertex (and optional fragment) program.
#[derive(Debug, Clone, Copy)]
pub struct GraphicsShaderRequest<'a> {
    /// The shader library path.
    pub path: &'a str,
    /// The vertex entry point.
    pub vertex_entry_point: &'a str,
    /// The fragment entry point, `None` for depth-only programs.
    pub fragment_entry_point: Option<&'a str>,
    /// Defines applied before compilation, typically derived from material flags.
    pub defines: &'a [ShaderDefine],
}

/// A compiled single-stage program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledShader {
    /// The module holding the stage.
    pub module: ShaderModuleId,
    /// The entry point to use with `module`.
    pub entry_point: String,
}

/// A compiled vertex/fragment program pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    /// The module holding both stages.
    pub module: ShaderModuleId,
    /// The vertex entry point.
    pub vertex_entry_point: String,
    /// The fragment entry point, if any.
    pub fragment_entry_point: Option<String>,
}

/// Turns shader sources into device modules.
///
/// Compilation failures are reported through the log and surface as `None`,
/// so a pass can keep its previous programs.
pub trait ShaderCompiler: Send + Sync + Debug {
    /// Compiles a compute program.
    fn compile_compute(
        &self,
        device: &dyn GraphicsDevice,
        request: &ComputeShaderRequest<'_>,
    ) -> Option<CompiledShader>;

    /// Compiles a graphics program.
    fn compile_graphics(
        &self,
        device: &dyn GraphicsDevice,
        request: &GraphicsShaderRequest<'_>,
    ) -> Option<CompiledProgram>;
}
