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

//! # Ember Data
//!
//! CPU-side scene state feeding the frame pipeline: entities and their meshes,
//! static and moving point lights, GPU-generated procedural meshes, the
//! regeneration queue, and the per-frame frustum culling that produces the
//! draw lists.

#![warn(missing_docs)]

pub mod config;
pub mod culling;
pub mod entity;
pub mod error;
pub mod light;
pub mod mesh;
pub mod procedural;
pub mod scene;

pub use config::{ProceduralConfig, SceneConfig, SunConfig};
pub use culling::{DrawRecord, FrustumCuller, ProceduralDrawRecord};
pub use entity::{Entity, EntityId};
pub use error::SceneError;
pub use light::{MovingLight, MOVING_LIGHT_LIFETIME, MOVING_LIGHT_SPEED};
pub use mesh::{Mesh, MeshData, MeshId, MeshSubset, MeshVertex, SubsetData};
pub use procedural::{GeneratedMesh, GeneratedMeshId, ProceduralEntity};
pub use scene::SceneState;
