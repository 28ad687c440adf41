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

//! GPU polygonization of procedural surfaces.
//!
//! Every queued generated mesh gets three dispatches: `init` resets its
//! counters, the generator program fills its vertex and index buffers, and
//! `finalize` turns the counters into indexed-indirect draw arguments. No
//! result is read back; the raster lanes draw straight from the indirect
//! buffer.
//!
//! Generator programs are keyed by their source text and compiled on first
//! sight. Only successes are cached: a broken generator is reported, its mesh
//! stays queued, and the compile is retried on the next frame. Programs whose
//! text no longer belongs to any generated mesh are released.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use crate::lanes::{build_compute_pipeline, program_failed};
use crate::shaders::{POLYGONIZE, POLYGONIZE_HELPERS};
use ahash::AHashMap;
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::renderer::procedural::{cell_tables, gpu_cell_table};
use ember_core::renderer::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BufferDescriptor, BufferId, BufferUsage,
    ComputePassDescriptor, ComputePipelineId, ComputeShaderRequest, GraphicsDevice,
    PipelineLayoutDescriptor, PipelineLayoutId, ShaderCompiler, ShaderStageFlags,
};
use ember_data::{GeneratedMesh, GeneratedMeshId};
use std::borrow::Cow;

/// Entry point of the generator program.
const GENERATE_ENTRY: &str = "polygonize";

const BINDINGS: [BindGroupLayoutEntry; 7] = [
    BindGroupLayoutEntry::uniform(0, ShaderStageFlags::COMPUTE),
    BindGroupLayoutEntry::storage(1, ShaderStageFlags::COMPUTE, true),
    BindGroupLayoutEntry::storage(2, ShaderStageFlags::COMPUTE, true),
    BindGroupLayoutEntry::storage(3, ShaderStageFlags::COMPUTE, false),
    BindGroupLayoutEntry::storage(4, ShaderStageFlags::COMPUTE, false),
    BindGroupLayoutEntry::storage(5, ShaderStageFlags::COMPUTE, false),
    BindGroupLayoutEntry::storage(6, ShaderStageFlags::COMPUTE, false),
];

#[derive(Debug, Clone, Copy)]
struct Helpers {
    init: ComputePipelineId,
    finalize: ComputePipelineId,
}

#[derive(Debug, Clone, Copy)]
struct PolygonizeResources {
    layout: BindGroupLayoutId,
    pipeline_layout: PipelineLayoutId,
    time_buffer: BufferId,
    cell_table: BufferId,
    vertex_table: BufferId,
}

/// Regenerates the queued procedural surfaces.
#[derive(Debug, Default)]
pub struct PolygonizeLane {
    resources: Option<PolygonizeResources>,
    helpers: Option<Helpers>,
    generators: AHashMap<String, ComputePipelineId>,
    bind_groups: AHashMap<GeneratedMeshId, BindGroupId>,
    time_since_start: f32,
}

impl PolygonizeLane {
    /// Creates an uninitialized lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds accumulated over every rendered frame.
    pub fn time_since_start(&self) -> f32 {
        self.time_since_start
    }

    fn compile_helpers(
        &self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        layout: PipelineLayoutId,
    ) -> Result<Helpers, LaneError> {
        let build = |entry_point: &str, label: &str| {
            build_compute_pipeline(
                device,
                shaders,
                &ComputeShaderRequest {
                    path: POLYGONIZE_HELPERS,
                    entry_point,
                    defines: &[],
                    prelude: None,
                },
                layout,
                label,
            )
        };
        let init = build("init", "Polygonize init")
            .ok_or_else(|| program_failed("Polygonize", "init program"))?;
        let finalize = match build("finalize", "Polygonize finalize") {
            Some(finalize) => finalize,
            None => {
                let _ = device.destroy_compute_pipeline(init);
                return Err(program_failed("Polygonize", "finalize program"));
            }
        };
        Ok(Helpers { init, finalize })
    }

    /// The generator pipeline for `source`, compiling it if it is not cached.
    fn generator_pipeline(
        &mut self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        layout: PipelineLayoutId,
        source: &str,
    ) -> Option<ComputePipelineId> {
        if let Some(cached) = self.generators.get(source) {
            return Some(*cached);
        }
        let pipeline = build_compute_pipeline(
            device,
            shaders,
            &ComputeShaderRequest {
                path: POLYGONIZE,
                entry_point: GENERATE_ENTRY,
                defines: &[],
                prelude: Some(source),
            },
            layout,
            "Polygonize generator",
        );
        match pipeline {
            Some(pipeline) => {
                self.generators.insert(source.to_owned(), pipeline);
            }
            None => log::error!("Generator program failed to compile; retrying next frame."),
        }
        pipeline
    }

    /// Releases the programs of texts no generated mesh uses anymore.
    fn prune_generators(&mut self, device: &dyn GraphicsDevice, meshes: &[GeneratedMesh]) {
        self.generators.retain(|source, pipeline| {
            let live = meshes.iter().any(|mesh| mesh.generator_source() == source.as_str());
            if !live {
                let _ = device.destroy_compute_pipeline(*pipeline);
            }
            live
        });
    }

    fn mesh_bind_group(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &PolygonizeResources,
        mesh: &GeneratedMesh,
    ) -> Result<BindGroupId, LaneError> {
        if let Some(bind_group) = self.bind_groups.get(&mesh.id) {
            return Ok(*bind_group);
        }
        let bind_group = device
            .create_bind_group(&BindGroupDescriptor {
                label: Some("Polygonize mesh"),
                layout: resources.layout,
                entries: &[
                    BindGroupEntry::whole_buffer(0, resources.time_buffer),
                    BindGroupEntry::whole_buffer(1, resources.cell_table),
                    BindGroupEntry::whole_buffer(2, resources.vertex_table),
                    BindGroupEntry::whole_buffer(3, mesh.vertex_buffer),
                    BindGroupEntry::whole_buffer(4, mesh.index_buffer),
                    BindGroupEntry::whole_buffer(5, mesh.counters_buffer),
                    BindGroupEntry::whole_buffer(6, mesh.indirect_buffer),
                ],
            })
            .map_err(LaneError::execution)?;
        self.bind_groups.insert(mesh.id, bind_group);
        Ok(bind_group)
    }

    fn drop_generators(&mut self, device: &dyn GraphicsDevice) {
        for (_, pipeline) in self.generators.drain() {
            let _ = device.destroy_compute_pipeline(pipeline);
        }
    }
}

impl Lane for PolygonizeLane {
    fn strategy_name(&self) -> &'static str {
        "Polygonize"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Compute
    }
}

impl RenderLane for PolygonizeLane {
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let device = ctx.device;
        let layout = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("Polygonize layout"),
                entries: &BINDINGS,
            })
            .map_err(LaneError::initialization)?;
        let pipeline_layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Polygonize pipeline layout")),
                bind_group_layouts: &[layout],
            })
            .map_err(LaneError::initialization)?;

        let time_buffer = device
            .create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed("Polygonize time")),
                size: std::mem::size_of::<[f32; 4]>() as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
            .map_err(LaneError::initialization)?;
        let table = |label: &'static str, data: &[u8]| {
            device.create_buffer_with_data(
                &BufferDescriptor {
                    label: Some(Cow::Borrowed(label)),
                    size: data.len() as u64,
                    usage: BufferUsage::STORAGE,
                    mapped_at_creation: false,
                },
                data,
            )
        };
        let cell_table = table("Polygonize cell table", bytemuck::cast_slice(&gpu_cell_table()))
            .map_err(LaneError::initialization)?;
        let vertex_table = table(
            "Polygonize vertex table",
            bytemuck::cast_slice(&cell_tables().vertices),
        )
        .map_err(LaneError::initialization)?;

        self.resources = Some(PolygonizeResources {
            layout,
            pipeline_layout,
            time_buffer,
            cell_table,
            vertex_table,
        });
        self.helpers = Some(self.compile_helpers(device, ctx.shaders, pipeline_layout)?);
        log::info!("Polygonize lane ready.");
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        self.time_since_start += frame.dt;

        let queue = frame.scene.regeneration_queue().to_vec();
        if queue.is_empty() {
            return Ok(());
        }
        let (Some(resources), Some(helpers)) = (self.resources, self.helpers) else {
            return Err(LaneError::NotInitialized);
        };
        let device = frame.device;
        let shaders = frame.shaders;

        let time = [self.time_since_start, frame.dt, 0.0, 0.0];
        device
            .write_buffer(resources.time_buffer, 0, bytemuck::cast_slice(&time))
            .map_err(LaneError::execution)?;

        self.prune_generators(device, frame.scene.generated_meshes());

        let mut jobs = Vec::with_capacity(queue.len());
        let mut retry = Vec::new();
        for id in queue {
            let Some(mesh) = frame.scene.generated_mesh(id) else {
                log::warn!("Queued generated mesh {:?} does not exist.", id);
                continue;
            };
            let Some(generator) = self.generator_pipeline(
                device,
                shaders,
                resources.pipeline_layout,
                mesh.generator_source(),
            ) else {
                retry.push(id);
                continue;
            };
            let bind_group = self.mesh_bind_group(device, &resources, mesh)?;
            jobs.push((generator, bind_group, mesh.dispatch_size()));
        }

        {
            let encoder = frame.encoder()?;
            for (generator, bind_group, (x, y, z)) in jobs {
                let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                    label: Some("Polygonize"),
                });
                pass.set_bind_group(0, bind_group);
                pass.set_pipeline(helpers.init);
                pass.dispatch_workgroups(1, 1, 1);
                pass.set_pipeline(generator);
                pass.dispatch_workgroups(x, y, z);
                pass.set_pipeline(helpers.finalize);
                pass.dispatch_workgroups(1, 1, 1);
            }
        }

        frame.scene.did_regenerate_all_meshes();
        for id in retry {
            frame.scene.queue_regeneration(id);
        }
        Ok(())
    }

    fn reinit_shading(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let Some(resources) = self.resources else {
            return Err(LaneError::NotInitialized);
        };
        let helpers = self.compile_helpers(ctx.device, ctx.shaders, resources.pipeline_layout)?;
        if let Some(old) = self.helpers.replace(helpers) {
            let _ = ctx.device.destroy_compute_pipeline(old.init);
            let _ = ctx.device.destroy_compute_pipeline(old.finalize);
        }
        self.drop_generators(ctx.device);
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.drop_generators(device);
        for (_, bind_group) in self.bind_groups.drain() {
            let _ = device.destroy_bind_group(bind_group);
        }
        if let Some(helpers) = self.helpers.take() {
            let _ = device.destroy_compute_pipeline(helpers.init);
            let _ = device.destroy_compute_pipeline(helpers.finalize);
        }
        if let Some(resources) = self.resources.take() {
            for buffer in [
                resources.time_buffer,
                resources.cell_table,
                resources.vertex_table,
            ] {
                if let Err(e) = device.destroy_buffer(buffer) {
                    log::warn!("Failed to destroy polygonize buffer {:?}: {}", buffer, e);
                }
            }
        }
    }
}
