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

//! Static meshes: CPU geometry, its GPU upload, and subset ordering.

use crate::error::SceneError;
use bytemuck::{Pod, Zeroable};
use ember_core::math::{Aabb, Vec3};
use ember_core::renderer::{
    BufferDescriptor, BufferId, BufferUsage, GraphicsDevice, IndexFormat, Material,
};
use std::borrow::Cow;

/// Index of a mesh inside its [`SceneState`](crate::SceneState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// A vertex of a static mesh. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MeshVertex {
    /// Object-space position.
    pub position: [f32; 3],
    /// Object-space normal.
    pub normal: [f32; 3],
    /// Texture coordinate.
    pub uv: [f32; 2],
}

impl MeshVertex {
    /// Creates a vertex.
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }
}

/// A range of a mesh's indices sharing one material, before upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsetData {
    /// First index of the range.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Shading parameters.
    pub material: Material,
}

/// CPU-side mesh geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    /// Vertices shared by every subset.
    pub vertices: Vec<MeshVertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
    /// Material ranges over `indices`.
    pub subsets: Vec<SubsetData>,
}

impl MeshData {
    /// Appends a subset built from its own vertices and indices, rebasing
    /// the indices onto the shared vertex array.
    pub fn push_subset(&mut self, vertices: &[MeshVertex], indices: &[u32], material: Material) {
        let base = self.vertices.len() as u32;
        let first_index = self.indices.len() as u32;
        self.vertices.extend_from_slice(vertices);
        self.indices.extend(indices.iter().map(|i| base + i));
        self.subsets.push(SubsetData {
            first_index,
            index_count: indices.len() as u32,
            material,
        });
    }

    /// Local bounds of one subset's referenced vertices.
    pub fn subset_bounds(&self, subset: &SubsetData) -> Aabb {
        let start = subset.first_index as usize;
        let end = start + subset.index_count as usize;
        Aabb::from_points(
            self.indices[start..end]
                .iter()
                .filter_map(|&i| self.vertices.get(i as usize))
                .map(|v| Vec3::from(v.position)),
        )
    }

    /// Uploads the geometry and returns the GPU mesh.
    pub fn upload(&self, device: &dyn GraphicsDevice, label: &str) -> Result<Mesh, SceneError> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(SceneError::EmptyMesh(label.to_string()));
        }

        let vertex_buffer = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Owned(format!("{label} vertices"))),
                size: std::mem::size_of_val(self.vertices.as_slice()) as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
            bytemuck::cast_slice(&self.vertices),
        )?;
        let index_buffer = match device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Owned(format!("{label} indices"))),
                size: std::mem::size_of_val(self.indices.as_slice()) as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
            bytemuck::cast_slice(&self.indices),
        ) {
            Ok(id) => id,
            Err(e) => {
                let _ = device.destroy_buffer(vertex_buffer);
                return Err(e.into());
            }
        };

        let subsets = self
            .subsets
            .iter()
            .map(|subset| MeshSubset {
                first_index: subset.first_index,
                index_count: subset.index_count,
                bounds: self.subset_bounds(subset),
                material: subset.material,
            })
            .collect();

        log::debug!(
            "Uploaded mesh '{}' ({} vertices, {} indices).",
            label,
            self.vertices.len(),
            self.indices.len()
        );

        Ok(Mesh {
            label: label.to_string(),
            vertex_buffer,
            index_buffer,
            index_format: IndexFormat::Uint32,
            subsets,
        })
    }
}

/// A material range of an uploaded mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSubset {
    /// First index of the range.
    pub first_index: u32,
    /// Number of indices.
    pub index_count: u32,
    /// Object-space bounds of the range.
    pub bounds: Aabb,
    /// Shading parameters.
    pub material: Material,
}

/// A mesh resident on the GPU.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Debug name.
    pub label: String,
    /// Vertex buffer of [`MeshVertex`].
    pub vertex_buffer: BufferId,
    /// Index buffer shared by every subset.
    pub index_buffer: BufferId,
    /// Element type of `index_buffer`.
    pub index_format: IndexFormat,
    /// Material ranges.
    pub subsets: Vec<MeshSubset>,
}

impl Mesh {
    /// Releases the GPU buffers.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for id in [self.vertex_buffer, self.index_buffer] {
            if let Err(e) = device.destroy_buffer(id) {
                log::warn!("Failed to destroy buffer of mesh '{}': {}", self.label, e);
            }
        }
    }
}

/// Reorders subset indices in place so alpha-tested subsets come last.
///
/// Relative order inside each group is kept. Returns the number of opaque
/// subsets, which is the index of the first alpha-tested one.
pub fn partition_alpha_last(subsets: &mut [usize], mesh: &Mesh) -> usize {
    let is_alpha = |index: usize| {
        mesh.subsets
            .get(index)
            .is_some_and(|s| s.material.is_alpha_tested())
    };
    subsets.sort_by_key(|&index| is_alpha(index));
    subsets.iter().take_while(|&&index| !is_alpha(index)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::math::LinearRgba;

    fn material(alpha: bool) -> Material {
        let m = Material::opaque(LinearRgba::WHITE);
        if alpha {
            m.with_alpha_cutoff(0.5)
        } else {
            m
        }
    }

    fn mesh_with(alpha: &[bool]) -> Mesh {
        Mesh {
            label: "test".into(),
            vertex_buffer: BufferId(0),
            index_buffer: BufferId(1),
            index_format: IndexFormat::Uint32,
            subsets: alpha
                .iter()
                .map(|&a| MeshSubset {
                    first_index: 0,
                    index_count: 3,
                    bounds: Aabb::from_min_max(Vec3::ZERO, Vec3::ONE),
                    material: material(a),
                })
                .collect(),
        }
    }

    #[test]
    fn vertex_layout_is_32_bytes() {
        assert_eq!(std::mem::size_of::<MeshVertex>(), 32);
    }

    #[test]
    fn alpha_subsets_are_moved_to_the_tail_stably() {
        let mesh = mesh_with(&[true, false, true, false, false]);
        let mut order = vec![0, 1, 2, 3, 4];
        let opaque = partition_alpha_last(&mut order, &mesh);
        assert_eq!(opaque, 3);
        assert_eq!(order, vec![1, 3, 4, 0, 2]);
    }

    #[test]
    fn partition_handles_uniform_lists() {
        let mesh = mesh_with(&[false, false]);
        let mut order = vec![1, 0];
        assert_eq!(partition_alpha_last(&mut order, &mesh), 2);
        assert_eq!(order, vec![1, 0]);

        let mesh = mesh_with(&[true, true]);
        let mut order = vec![0, 1];
        assert_eq!(partition_alpha_last(&mut order, &mesh), 0);

        let mut empty: Vec<usize> = Vec::new();
        assert_eq!(partition_alpha_last(&mut empty, &mesh), 0);
    }

    #[test]
    fn pushed_subsets_are_rebased_and_bounded() {
        let quad = [
            MeshVertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            MeshVertex::new([2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
            MeshVertex::new([2.0, 0.0, 3.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
        ];
        let mut data = MeshData::default();
        data.push_subset(&quad, &[0, 1, 2], material(false));
        data.push_subset(&quad, &[0, 1, 2], material(true));

        assert_eq!(data.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(data.subsets[1].first_index, 3);
        let bounds = data.subset_bounds(&data.subsets[1]);
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(2.0, 0.0, 3.0));
    }
}
