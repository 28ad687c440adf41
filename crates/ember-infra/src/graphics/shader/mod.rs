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

//! WGSL shader library implementing the [`ShaderCompiler`] service.

mod preprocessor;

pub use self::preprocessor::preprocess;

use ember_core::renderer::{
    CompiledProgram, CompiledShader, ComputeShaderRequest, GraphicsDevice, GraphicsShaderRequest,
    ResourceError, ShaderCompiler, ShaderDefine, ShaderError, ShaderModuleDescriptor,
    ShaderModuleId, ShaderSourceData,
};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Compiles WGSL programs from registered sources or from files under a root directory.
///
/// Registered sources win over files with the same path. Every request is
/// preprocessed with its defines, then turned into a shader module on the
/// device. Failures are logged and reported as `None`.
pub struct WgslShaderCompiler {
    library: RwLock<HashMap<String, String>>,
    root: Option<PathBuf>,
}

impl fmt::Debug for WgslShaderCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self.library.read().map(|l| l.len()).unwrap_or_default();
        f.debug_struct("WgslShaderCompiler")
            .field("registered", &registered)
            .field("root", &self.root)
            .finish()
    }
}

impl Default for WgslShaderCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl WgslShaderCompiler {
    /// Creates an empty library that never reads from disk.
    pub fn new() -> Self {
        Self {
            library: RwLock::new(HashMap::new()),
            root: None,
        }
    }

    /// Creates an empty library that falls back to files under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            library: RwLock::new(HashMap::new()),
            root: Some(root.into()),
        }
    }

    /// Registers `source` under `path`, replacing any previous source.
    pub fn register(&self, path: &str, source: &str) {
        match self.library.write() {
            Ok(mut library) => {
                library.insert(path.to_string(), source.to_string());
                log::debug!("Registered shader source '{}'.", path);
            }
            Err(_) => log::error!("Shader library lock poisoned, '{}' not registered.", path),
        }
    }

    /// Registers every `(path, source)` pair.
    pub fn register_all<'a>(&self, sources: impl IntoIterator<Item = &'a (&'a str, &'a str)>) {
        for (path, source) in sources {
            self.register(path, source);
        }
    }

    /// Returns `true` if `path` resolves to a registered source.
    pub fn is_registered(&self, path: &str) -> bool {
        self.library
            .read()
            .map(|library| library.contains_key(path))
            .unwrap_or(false)
    }

    /// Resolves `path` to its source text.
    fn load_source(&self, path: &str) -> Result<String, ShaderError> {
        if let Ok(library) = self.library.read() {
            if let Some(source) = library.get(path) {
                return Ok(source.clone());
            }
        }

        let Some(root) = self.root.as_deref() else {
            return Err(ShaderError::LoadError {
                path: path.to_string(),
                source_error: "not registered".to_string(),
            });
        };
        let file = root.join(Path::new(path));
        std::fs::read_to_string(&file).map_err(|e| ShaderError::LoadError {
            path: file.display().to_string(),
            source_error: e.to_string(),
        })
    }

    /// Loads, preprocesses and compiles one module.
    fn build_module(
        &self,
        device: &dyn GraphicsDevice,
        path: &str,
        defines: &[ShaderDefine],
        prelude: Option<&str>,
        label: &str,
    ) -> Result<ShaderModuleId, ResourceError> {
        let file = self.load_source(path)?;
        let text = match prelude {
            Some(prelude) => format!("{prelude}\n{file}"),
            None => file,
        };
        let processed = preprocess(&text, defines, path)?;
        device.create_shader_module(&ShaderModuleDescriptor {
            label: Some(label),
            source: ShaderSourceData::Wgsl(Cow::Owned(processed)),
        })
    }
}

impl ShaderCompiler for WgslShaderCompiler {
    fn compile_compute(
        &self,
        device: &dyn GraphicsDevice,
        request: &ComputeShaderRequest<'_>,
    ) -> Option<CompiledShader> {
        let label = format!("{}:{}", request.path, request.entry_point);
        match self.build_module(
            device,
            request.path,
            request.defines,
            request.prelude,
            &label,
        ) {
            Ok(module) => {
                log::debug!("Compiled compute program '{}'.", label);
                Some(CompiledShader {
                    module,
                    entry_point: request.entry_point.to_string(),
                })
            }
            Err(e) => {
                log::error!("Failed to compile compute program '{}': {}", label, e);
                None
            }
        }
    }

    fn compile_graphics(
        &self,
        device: &dyn GraphicsDevice,
        request: &GraphicsShaderRequest<'_>,
    ) -> Option<CompiledProgram> {
        let label = format!("{}:{}", request.path, request.vertex_entry_point);
        match self.build_module(device, request.path, request.defines, None, &label) {
            Ok(module) => {
                log::debug!(
                    "Compiled graphics program '{}' ({} defines).",
                    label,
                    request.defines.len()
                );
                Some(CompiledProgram {
                    module,
                    vertex_entry_point: request.vertex_entry_point.to_string(),
                    fragment_entry_point: request.fragment_entry_point.map(str::to_string),
                })
            }
            Err(e) => {
                log::error!("Failed to compile graphics program '{}': {}", label, e);
                None
            }
        }
    }
}
