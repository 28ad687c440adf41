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

//! Procedural surfaces: the GPU buffers a generator writes into and the
//! entities placing them in the world.

use crate::config::ProceduralConfig;
use crate::error::SceneError;
use ember_core::math::{LinearRgba, Mat4, Quaternion, Vec3};
use ember_core::renderer::procedural::{
    cells_per_axis, DrawIndexedIndirectArgs, MeshCounters, SurfaceVertex,
};
use ember_core::renderer::{BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, Material};
use std::borrow::Cow;
use std::mem::size_of;
use std::path::{Path, PathBuf};

/// Index of a generated mesh inside its [`SceneState`](crate::SceneState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeneratedMeshId(pub usize);

/// A mesh whose geometry is produced on the GPU from a generator program.
///
/// All four buffers are allocated once at full capacity; the polygonizer
/// resets the counters, appends into the vertex and index buffers, and writes
/// the indirect draw arguments consumed by the raster passes.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedMesh {
    /// Own index in the scene.
    pub id: GeneratedMeshId,
    /// [`SurfaceVertex`] storage, `capacity` elements.
    pub vertex_buffer: BufferId,
    /// `u32` index storage, `capacity` elements.
    pub index_buffer: BufferId,
    /// One [`MeshCounters`] record.
    pub counters_buffer: BufferId,
    /// One [`DrawIndexedIndirectArgs`] record.
    pub indirect_buffer: BufferId,
    /// Polygonizer workgroups per axis.
    pub extent: u32,
    /// Vertex and index capacity.
    pub capacity: u32,
    /// Regenerated every frame when set.
    pub dynamic: bool,
    generator_path: PathBuf,
    generator_source: String,
}

impl GeneratedMesh {
    /// Allocates the buffers of a generated mesh.
    ///
    /// Buffers already created are released if a later allocation fails.
    pub fn create(
        device: &dyn GraphicsDevice,
        id: GeneratedMeshId,
        config: &ProceduralConfig,
        generator_source: String,
    ) -> Result<Self, SceneError> {
        let capacity = config.capacity as u64;
        let specs = [
            (
                "vertices",
                capacity * size_of::<SurfaceVertex>() as u64,
                BufferUsage::STORAGE | BufferUsage::VERTEX,
            ),
            (
                "indices",
                capacity * size_of::<u32>() as u64,
                BufferUsage::STORAGE | BufferUsage::INDEX,
            ),
            (
                "counters",
                size_of::<MeshCounters>() as u64,
                BufferUsage::STORAGE | BufferUsage::COPY_SRC,
            ),
            (
                "indirect args",
                size_of::<DrawIndexedIndirectArgs>() as u64,
                BufferUsage::STORAGE | BufferUsage::INDIRECT | BufferUsage::COPY_SRC,
            ),
        ];

        let mut buffers = Vec::with_capacity(specs.len());
        for (name, size, usage) in specs {
            let descriptor = BufferDescriptor {
                label: Some(Cow::Owned(format!("Generated mesh {} {}", id.0, name))),
                size,
                usage,
                mapped_at_creation: false,
            };
            match device.create_buffer(&descriptor) {
                Ok(buffer) => buffers.push(buffer),
                Err(e) => {
                    for buffer in buffers {
                        let _ = device.destroy_buffer(buffer);
                    }
                    return Err(e.into());
                }
            }
        }

        log::debug!(
            "Created generated mesh {} ({} cells per axis, capacity {}).",
            id.0,
            cells_per_axis(config.extent),
            config.capacity
        );

        Ok(Self {
            id,
            vertex_buffer: buffers[0],
            index_buffer: buffers[1],
            counters_buffer: buffers[2],
            indirect_buffer: buffers[3],
            extent: config.extent,
            capacity: config.capacity,
            dynamic: config.dynamic,
            generator_path: config.generator_path.clone(),
            generator_source,
        })
    }

    /// The file the generator was read from.
    pub fn generator_path(&self) -> &Path {
        &self.generator_path
    }

    /// The generator program text. Also its cache key.
    pub fn generator_source(&self) -> &str {
        &self.generator_source
    }

    /// Replaces the generator program. Returns `true` if the text changed.
    pub fn set_generator(&mut self, source: String) -> bool {
        if self.generator_source == source {
            return false;
        }
        self.generator_source = source;
        true
    }

    /// Workgroup counts of the generate dispatch.
    pub fn dispatch_size(&self) -> (u32, u32, u32) {
        (self.extent, self.extent, self.extent)
    }

    /// Releases the GPU buffers.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for buffer in [
            self.vertex_buffer,
            self.index_buffer,
            self.counters_buffer,
            self.indirect_buffer,
        ] {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy generated mesh buffer {:?}: {}", buffer, e);
            }
        }
    }
}

/// A generated mesh placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceduralEntity {
    /// The drawn surface.
    pub mesh: GeneratedMeshId,
    /// World-space position.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quaternion,
    /// Uniform scale from lattice units to world units.
    pub scale: f32,
    /// Shading parameters.
    pub material: Material,
}

impl ProceduralEntity {
    /// Places `mesh` as described by `config`.
    pub fn from_config(mesh: GeneratedMeshId, config: &ProceduralConfig) -> Self {
        Self {
            mesh,
            position: config.position,
            rotation: config.rotation,
            scale: config.scale,
            material: Material::opaque(LinearRgba::rgb(0.85, 0.8, 0.75))
                .with_specular_power(config.specular_power),
        }
    }

    /// Lattice-to-world matrix.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }
}
