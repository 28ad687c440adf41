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

//! The scene: everything the frame pipeline draws and lights.

use crate::config::{ProceduralConfig, SceneConfig};
use crate::culling::{DrawRecord, FrustumCuller, ProceduralDrawRecord};
use crate::entity::{Entity, EntityId};
use crate::error::SceneError;
use crate::light::{populate_static_lights, MovingLight};
use crate::mesh::{partition_alpha_last, Mesh, MeshData, MeshId};
use crate::procedural::{GeneratedMesh, GeneratedMeshId, ProceduralEntity};
use ember_core::math::{Mat4, Vec3};
use ember_core::renderer::{
    DirectionalSun, GpuPointLight, GraphicsDevice, PointLight, MAX_LIGHTS_IN_SCENE,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

/// Owns the entities, lights and procedural surfaces of a running scene and
/// rebuilds the per-frame draw lists.
#[derive(Debug)]
pub struct SceneState {
    rng: StdRng,
    sun: DirectionalSun,

    meshes: Vec<Mesh>,
    entities: Vec<Entity>,

    static_lights: Vec<PointLight>,
    moving_lights: Vec<MovingLight>,

    generated_meshes: Vec<GeneratedMesh>,
    procedural_entities: Vec<ProceduralEntity>,
    regeneration_queue: Vec<GeneratedMeshId>,

    culler: FrustumCuller,
    draw_list: Vec<DrawRecord>,
    procedural_draw_list: Vec<ProceduralDrawRecord>,
}

impl SceneState {
    /// Builds a scene with its static lights placed from the configured seed.
    ///
    /// Fails when the static lights alone would fill the light buffer.
    pub fn new(config: &SceneConfig, projection: Mat4) -> Result<Self, SceneError> {
        let count = config.static_light_count();
        if count >= MAX_LIGHTS_IN_SCENE as usize {
            return Err(SceneError::TooManyLights {
                count,
                capacity: MAX_LIGHTS_IN_SCENE as usize,
            });
        }

        let mut rng = StdRng::seed_from_u64(config.light_seed);
        let static_lights = populate_static_lights(config, &mut rng);
        log::info!(
            "Scene created with {} static lights (seed {}).",
            static_lights.len(),
            config.light_seed
        );

        Ok(Self {
            rng,
            sun: config.sun.to_sun(),
            meshes: Vec::new(),
            entities: Vec::new(),
            static_lights,
            moving_lights: Vec::new(),
            generated_meshes: Vec::new(),
            procedural_entities: Vec::new(),
            regeneration_queue: Vec::new(),
            culler: FrustumCuller::new(projection),
            draw_list: Vec::new(),
            procedural_draw_list: Vec::new(),
        })
    }

    /// Uploads a mesh and returns its id.
    pub fn add_mesh(
        &mut self,
        device: &dyn GraphicsDevice,
        data: &MeshData,
        label: &str,
    ) -> Result<MeshId, SceneError> {
        let mesh = data.upload(device, label)?;
        self.meshes.push(mesh);
        Ok(MeshId(self.meshes.len() - 1))
    }

    /// Adds an entity drawing an already added mesh.
    pub fn spawn_entity(&mut self, entity: Entity) -> Result<EntityId, SceneError> {
        if entity.mesh.0 >= self.meshes.len() {
            return Err(SceneError::UnknownMesh(entity.mesh));
        }
        self.entities.push(entity);
        Ok(EntityId(self.entities.len() - 1))
    }

    /// Allocates a generated mesh for `generator_source` and places it.
    ///
    /// Meshes that are not dynamic are queued once so they get generated.
    pub fn spawn_procedural(
        &mut self,
        device: &dyn GraphicsDevice,
        config: &ProceduralConfig,
        generator_source: String,
    ) -> Result<GeneratedMeshId, SceneError> {
        let id = GeneratedMeshId(self.generated_meshes.len());
        let mesh = GeneratedMesh::create(device, id, config, generator_source)?;
        if !mesh.dynamic {
            self.queue_regeneration(id);
        }
        self.generated_meshes.push(mesh);
        self.procedural_entities
            .push(ProceduralEntity::from_config(id, config));
        Ok(id)
    }

    /// Fires a moving light from `origin` along `direction`.
    pub fn fire_light(&mut self, origin: Vec3, direction: Vec3) {
        let light = MovingLight::fire(&mut self.rng, origin, direction);
        log::debug!(
            "Fired light at {:?}, radius {:.1}.",
            origin,
            light.light.radius
        );
        self.moving_lights.push(light);
    }

    /// Advances the scene by `dt` seconds and rebuilds the draw lists for `view`.
    ///
    /// Moving lights advance first, then the expired ones are dropped. Every
    /// dynamic generated mesh is queued for regeneration.
    pub fn update(&mut self, dt: f32, view: Mat4) {
        for light in &mut self.moving_lights {
            light.advance(dt);
        }
        self.moving_lights.retain(|light| !light.is_expired());

        self.culler.set_view(view);
        self.culler
            .cull(&self.entities, &self.meshes, &mut self.draw_list);

        self.procedural_draw_list.clear();
        self.procedural_draw_list.extend(
            self.procedural_entities
                .iter()
                .map(ProceduralDrawRecord::from),
        );

        for index in 0..self.generated_meshes.len() {
            if self.generated_meshes[index].dynamic {
                self.queue_regeneration(GeneratedMeshId(index));
            }
        }
    }

    /// Re-reads every generator file from disk.
    pub fn reload_procedural(&mut self) {
        self.reload_procedural_with(|path| std::fs::read_to_string(path));
    }

    /// Re-reads every generator through `load`.
    ///
    /// A mesh whose generator fails to load keeps its current program. Meshes
    /// that are not dynamic are queued; dynamic ones regenerate on the next
    /// update anyway.
    pub fn reload_procedural_with<F>(&mut self, mut load: F)
    where
        F: FnMut(&Path) -> std::io::Result<String>,
    {
        for index in 0..self.generated_meshes.len() {
            let mesh = &mut self.generated_meshes[index];
            let source = match load(mesh.generator_path()) {
                Ok(source) => source,
                Err(e) => {
                    log::error!(
                        "Failed to reload generator '{}': {}",
                        mesh.generator_path().display(),
                        e
                    );
                    continue;
                }
            };
            if mesh.set_generator(source) {
                log::info!(
                    "Generator '{}' changed.",
                    mesh.generator_path().display()
                );
            }
            if !mesh.dynamic {
                self.queue_regeneration(GeneratedMeshId(index));
            }
        }
    }

    /// Queues a generated mesh for polygonization. Already queued meshes are ignored.
    pub fn queue_regeneration(&mut self, id: GeneratedMeshId) {
        if !self.regeneration_queue.contains(&id) {
            self.regeneration_queue.push(id);
        }
    }

    /// The generated meshes awaiting polygonization, in queue order.
    pub fn regeneration_queue(&self) -> &[GeneratedMeshId] {
        &self.regeneration_queue
    }

    /// Drains the regeneration queue once the polygonizer has recorded its work.
    pub fn did_regenerate_all_meshes(&mut self) {
        self.regeneration_queue.clear();
    }

    /// Moves an entity by `delta`.
    pub fn nudge_entity(&mut self, id: EntityId, delta: Vec3) {
        match self.entities.get_mut(id.0) {
            Some(entity) => entity.position += delta,
            None => log::warn!("Cannot move missing entity {:?}", id),
        }
    }

    /// The directional light.
    pub fn sun(&self) -> &DirectionalSun {
        &self.sun
    }

    /// Uploaded meshes.
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    /// Looks up a mesh.
    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    /// Placed entities.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Looks up a generated mesh.
    pub fn generated_mesh(&self, id: GeneratedMeshId) -> Option<&GeneratedMesh> {
        self.generated_meshes.get(id.0)
    }

    /// Every generated mesh.
    pub fn generated_meshes(&self) -> &[GeneratedMesh] {
        &self.generated_meshes
    }

    /// Placed procedural surfaces.
    pub fn procedural_entities(&self) -> &[ProceduralEntity] {
        &self.procedural_entities
    }

    /// The static lights, fixed for the lifetime of the scene.
    pub fn static_lights(&self) -> &[PointLight] {
        &self.static_lights
    }

    /// The lights currently in flight.
    pub fn moving_lights(&self) -> &[MovingLight] {
        &self.moving_lights
    }

    /// Static plus moving lights.
    pub fn total_light_count(&self) -> usize {
        self.static_lights.len() + self.moving_lights.len()
    }

    /// GPU records of the static lights.
    pub fn static_gpu_lights(&self) -> Vec<GpuPointLight> {
        self.static_lights.iter().map(PointLight::to_gpu).collect()
    }

    /// GPU records of the moving lights, in firing order.
    pub fn dynamic_gpu_lights(&self) -> Vec<GpuPointLight> {
        self.moving_lights.iter().map(|l| l.light.to_gpu()).collect()
    }

    /// The culler holding the current view and projection.
    pub fn culler(&self) -> &FrustumCuller {
        &self.culler
    }

    /// Entities visible after the last update.
    pub fn draw_list(&self) -> &[DrawRecord] {
        &self.draw_list
    }

    /// Orders every draw record's subsets so alpha-tested ones come last.
    ///
    /// Returns, per record, the number of opaque subsets at its head.
    pub fn partition_draw_list(&mut self) -> Vec<usize> {
        let meshes = &self.meshes;
        self.draw_list
            .iter_mut()
            .map(|record| match meshes.get(record.mesh.0) {
                Some(mesh) => partition_alpha_last(&mut record.subsets, mesh),
                None => record.subsets.len(),
            })
            .collect()
    }

    /// Procedural surfaces to draw after the last update.
    pub fn procedural_draw_list(&self) -> &[ProceduralDrawRecord] {
        &self.procedural_draw_list
    }

    /// Releases every GPU buffer the scene owns.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for mesh in self.meshes.drain(..) {
            mesh.destroy(device);
        }
        for mesh in self.generated_meshes.drain(..) {
            mesh.destroy(device);
        }
        self.entities.clear();
        self.procedural_entities.clear();
        self.regeneration_queue.clear();
        self.draw_list.clear();
        self.procedural_draw_list.clear();
    }
}
