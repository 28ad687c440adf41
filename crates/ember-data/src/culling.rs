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

//! Per-frame visibility: which entity subsets the camera can see.

use crate::entity::{Entity, EntityId};
use crate::mesh::{Mesh, MeshId};
use crate::procedural::{GeneratedMeshId, ProceduralEntity};
use ember_core::math::{Frustum, Mat4};
use ember_core::renderer::Material;

/// A visible entity and the subsets to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// The culled entity.
    pub entity: EntityId,
    /// Its mesh.
    pub mesh: MeshId,
    /// Object-to-world matrix.
    pub world: Mat4,
    /// Indices into the mesh's subsets, in mesh order.
    pub subsets: Vec<usize>,
}

/// A procedural surface to draw. Procedural entities are never frustum-tested.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProceduralDrawRecord {
    /// The generated surface.
    pub mesh: GeneratedMeshId,
    /// Lattice-to-world matrix.
    pub world: Mat4,
    /// Shading parameters.
    pub material: Material,
}

impl From<&ProceduralEntity> for ProceduralDrawRecord {
    fn from(entity: &ProceduralEntity) -> Self {
        Self {
            mesh: entity.mesh,
            world: entity.world_matrix(),
            material: entity.material,
        }
    }
}

/// Tests entity subsets against the camera frustum.
#[derive(Debug, Clone)]
pub struct FrustumCuller {
    projection: Mat4,
    view: Mat4,
    frustum: Frustum,
}

impl FrustumCuller {
    /// Creates a culler with a fixed projection and an identity view.
    pub fn new(projection: Mat4) -> Self {
        Self {
            projection,
            view: Mat4::IDENTITY,
            frustum: Frustum::from_view_projection(&projection),
        }
    }

    /// Moves the camera, keeping the projection.
    pub fn set_view(&mut self, view: Mat4) {
        self.view = view;
        self.frustum = Frustum::from_view_projection(&(self.projection * view));
    }

    /// The projection this culler was built with.
    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    /// The current view.
    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    /// The current world-space frustum.
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Clears `out` and fills it with one record per entity that has at
    /// least one visible subset, in entity order.
    pub fn cull(&self, entities: &[Entity], meshes: &[Mesh], out: &mut Vec<DrawRecord>) {
        out.clear();
        for (index, entity) in entities.iter().enumerate() {
            let Some(mesh) = meshes.get(entity.mesh.0) else {
                log::warn!("Entity {} references missing mesh {:?}", index, entity.mesh);
                continue;
            };

            let world = entity.world_matrix();
            let subsets: Vec<usize> = mesh
                .subsets
                .iter()
                .enumerate()
                .filter(|(_, subset)| self.frustum.intersects_aabb(&subset.bounds.transform(&world)))
                .map(|(i, _)| i)
                .collect();

            if !subsets.is_empty() {
                out.push(DrawRecord {
                    entity: EntityId(index),
                    mesh: entity.mesh,
                    world,
                    subsets,
                });
            }
        }
    }
}
