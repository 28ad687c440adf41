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

//! Errors raised while building or configuring a scene.

use crate::mesh::MeshId;
use ember_core::renderer::ResourceError;
use std::path::PathBuf;
use thiserror::Error;

/// An error raised while loading scene configuration or creating scene resources.
#[derive(Debug, Error)]
pub enum SceneError {
    /// A scene file could not be read.
    #[error("failed to read '{path}': {source}")]
    Io {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid RON.
    #[error("invalid scene configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The static light set does not fit the GPU light buffer.
    #[error("{count} static lights exceed the light buffer capacity of {capacity}")]
    TooManyLights {
        /// Number of lights requested.
        count: usize,
        /// Capacity the count must stay strictly below.
        capacity: usize,
    },

    /// An entity references a mesh that was never added.
    #[error("unknown mesh {0:?}")]
    UnknownMesh(MeshId),

    /// A mesh has no geometry to upload.
    #[error("mesh '{0}' has no vertices or indices")]
    EmptyMesh(String),

    /// A GPU resource could not be created.
    #[error("GPU resource error: {0}")]
    Resource(#[from] ResourceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_lights_message() {
        let err = SceneError::TooManyLights {
            count: 1000,
            capacity: 1000,
        };
        assert_eq!(
            err.to_string(),
            "1000 static lights exceed the light buffer capacity of 1000"
        );
    }

    #[test]
    fn resource_errors_convert() {
        let err: SceneError = ResourceError::OutOfBounds.into();
        assert!(matches!(err, SceneError::Resource(ResourceError::OutOfBounds)));
    }
}
