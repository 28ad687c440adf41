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

//! Depth-only pass over every visible opaque surface.
//!
//! Filling the depth buffer up front gives the tile culler its per-tile depth
//! range and lets the shading pass reject hidden fragments early.
//! Alpha-tested subsets are left out; their depth is resolved by the shading
//! pass itself.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use crate::lanes::{
    build_render_pipeline, mesh_vertex_layout, program_failed, record_draws,
    surface_vertex_layout, DrawCall, Geometry,
};
use crate::resources::{ObjectUniforms, SharedRenderResources};
use crate::shaders::DEPTH_PREPASS;
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::renderer::{
    DepthStateDescriptor, DynamicUniformArena, GraphicsDevice, GraphicsShaderRequest, Operations,
    PipelineLayoutDescriptor, PipelineLayoutId, PrimitiveStateDescriptor,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, RenderPipelineDescriptor,
    RenderPipelineId, ShaderCompiler, DEFAULT_MAX_ELEMENTS, MIN_UNIFORM_ALIGNMENT,
};
use ember_data::SceneState;
use std::borrow::Cow;
use std::mem::size_of;

#[derive(Debug, Clone, Copy)]
struct PrepassPipelines {
    mesh: RenderPipelineId,
    procedural: RenderPipelineId,
}

/// Writes scene depth before any shading.
#[derive(Debug, Default)]
pub struct ZPrepassLane {
    layout: Option<PipelineLayoutId>,
    pipelines: Option<PrepassPipelines>,
    arena: Option<DynamicUniformArena>,
}

impl ZPrepassLane {
    /// Creates an uninitialized lane.
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        resources: &SharedRenderResources,
        layout: PipelineLayoutId,
    ) -> Result<PrepassPipelines, LaneError> {
        let depth = DepthStateDescriptor::write_less_equal(resources.depth_format);
        let mesh = build_render_pipeline(
            device,
            shaders,
            &GraphicsShaderRequest {
                path: DEPTH_PREPASS,
                vertex_entry_point: "vs_main",
                fragment_entry_point: None,
                defines: &[],
            },
            |desc| RenderPipelineDescriptor {
                vertex_buffers_layout: Cow::Owned(vec![mesh_vertex_layout()]),
                depth_stencil_state: Some(depth),
                ..desc
            },
            layout,
            "Z prepass",
        )
        .ok_or_else(|| program_failed("ZPrepass", "mesh program"))?;

        let procedural = build_render_pipeline(
            device,
            shaders,
            &GraphicsShaderRequest {
                path: DEPTH_PREPASS,
                vertex_entry_point: "vs_procedural",
                fragment_entry_point: None,
                defines: &[],
            },
            |desc| RenderPipelineDescriptor {
                vertex_buffers_layout: Cow::Owned(vec![surface_vertex_layout()]),
                primitive_state: PrimitiveStateDescriptor {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil_state: Some(depth),
                ..desc
            },
            layout,
            "Z prepass procedural",
        );
        match procedural {
            Some(procedural) => Ok(PrepassPipelines { mesh, procedural }),
            None => {
                let _ = device.destroy_render_pipeline(mesh);
                Err(program_failed("ZPrepass", "procedural program"))
            }
        }
    }

    fn collect_draws(
        &mut self,
        device: &dyn GraphicsDevice,
        scene: &SceneState,
    ) -> Result<Vec<DrawCall>, LaneError> {
        let (Some(pipelines), Some(arena)) = (self.pipelines, self.arena.as_mut()) else {
            return Err(LaneError::NotInitialized);
        };
        arena.reset();

        let mut draws = Vec::new();
        for record in scene.draw_list() {
            let Some(mesh) = scene.mesh(record.mesh) else {
                continue;
            };
            let opaque: Vec<_> = record
                .subsets
                .iter()
                .filter_map(|&index| mesh.subsets.get(index))
                .filter(|subset| !subset.material.is_alpha_tested())
                .collect();
            if opaque.is_empty() {
                continue;
            }
            let object = arena
                .push(
                    device,
                    bytemuck::bytes_of(&ObjectUniforms::transform_only(&record.world)),
                )
                .map_err(LaneError::execution)?;
            for subset in opaque {
                draws.push(DrawCall {
                    pipeline: pipelines.mesh,
                    object,
                    geometry: Geometry::Indexed {
                        vertex_buffer: mesh.vertex_buffer,
                        index_buffer: mesh.index_buffer,
                        index_format: mesh.index_format,
                        indices: subset.first_index..subset.first_index + subset.index_count,
                    },
                });
            }
        }

        for record in scene.procedural_draw_list() {
            let Some(mesh) = scene.generated_mesh(record.mesh) else {
                continue;
            };
            let object = arena
                .push(
                    device,
                    bytemuck::bytes_of(&ObjectUniforms::transform_only(&record.world)),
                )
                .map_err(LaneError::execution)?;
            draws.push(DrawCall {
                pipeline: pipelines.procedural,
                object,
                geometry: Geometry::Indirect {
                    vertex_buffer: mesh.vertex_buffer,
                    index_buffer: mesh.index_buffer,
                    indirect_buffer: mesh.indirect_buffer,
                },
            });
        }
        Ok(draws)
    }
}

impl Lane for ZPrepassLane {
    fn strategy_name(&self) -> &'static str {
        "ZPrepass"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Raster
    }
}

impl RenderLane for ZPrepassLane {
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let resources = ctx.resources;
        let layout = ctx
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Z prepass layout")),
                bind_group_layouts: &[resources.forward_layout, resources.object_layout],
            })
            .map_err(LaneError::initialization)?;
        self.layout = Some(layout);
        self.arena = Some(
            DynamicUniformArena::new(
                ctx.device,
                resources.object_layout,
                0,
                size_of::<ObjectUniforms>() as u32,
                DEFAULT_MAX_ELEMENTS,
                MIN_UNIFORM_ALIGNMENT,
                "Z prepass objects",
            )
            .map_err(LaneError::initialization)?,
        );
        self.pipelines = Some(Self::compile(ctx.device, ctx.shaders, resources, layout)?);
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        let draws = self.collect_draws(frame.device, frame.scene)?;
        let globals = frame.resources.forward_bind_group;
        let depth_view = frame.resources.depth_view;

        let encoder = frame.encoder()?;
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Z prepass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(Operations::load()),
            }),
        });
        record_draws(pass.as_mut(), globals, &draws);
        Ok(())
    }

    fn reinit_shading(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let layout = self.layout.ok_or(LaneError::NotInitialized)?;
        let pipelines = Self::compile(ctx.device, ctx.shaders, ctx.resources, layout)?;
        if let Some(old) = self.pipelines.replace(pipelines) {
            let _ = ctx.device.destroy_render_pipeline(old.mesh);
            let _ = ctx.device.destroy_render_pipeline(old.procedural);
        }
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipelines) = self.pipelines.take() {
            let _ = device.destroy_render_pipeline(pipelines.mesh);
            let _ = device.destroy_render_pipeline(pipelines.procedural);
        }
        if let Some(arena) = self.arena.take() {
            arena.destroy(device);
        }
        self.layout = None;
    }
}
