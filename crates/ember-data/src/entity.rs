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

//! Placed instances of static meshes.

use crate::mesh::MeshId;
use ember_core::math::{Mat4, Quaternion, Vec3};

/// Index of an entity inside its [`SceneState`](crate::SceneState).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub usize);

/// A placed instance of a static mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entity {
    /// World-space position.
    pub position: Vec3,
    /// Orientation.
    pub rotation: Quaternion,
    /// Uniform scale.
    pub scale: f32,
    /// The drawn mesh.
    pub mesh: MeshId,
}

impl Entity {
    /// Creates an entity at `position` with identity rotation and unit scale.
    pub fn new(mesh: MeshId, position: Vec3) -> Self {
        Self {
            position,
            rotation: Quaternion::IDENTITY,
            scale: 1.0,
            mesh,
        }
    }

    /// Sets the uniform scale.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    /// Sets the rotation.
    pub fn with_rotation(mut self, rotation: Quaternion) -> Self {
        self.rotation = rotation;
        self
    }

    /// Object-to-world matrix: scale, then rotate, then translate.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }
}
