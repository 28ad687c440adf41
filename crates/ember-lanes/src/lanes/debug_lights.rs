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

//! Heat-map view of the per-tile light counts.
//!
//! Stands in for the draw lane in the debug routine. A single full-screen
//! triangle reads the count buffer written by the tile culler and blends a
//! color ramp over whatever the earlier lanes left in the surface.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use crate::lanes::{build_render_pipeline, program_failed};
use crate::resources::SharedRenderResources;
use crate::shaders::{tiling_defines, DEBUG_LIGHTS};
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::renderer::{
    BlendMode, ColorTargetStateDescriptor, DepthStateDescriptor, GraphicsDevice,
    GraphicsShaderRequest, Operations, PipelineLayoutDescriptor, PipelineLayoutId,
    PrimitiveStateDescriptor, RenderPassColorAttachment, RenderPassDepthStencilAttachment,
    RenderPassDescriptor, RenderPipelineDescriptor, RenderPipelineId, ShaderCompiler,
};
use std::borrow::Cow;

/// Draws the light-count heat map.
#[derive(Debug, Default)]
pub struct DebugLightsLane {
    layout: Option<PipelineLayoutId>,
    pipeline: Option<RenderPipelineId>,
}

impl DebugLightsLane {
    /// Creates an uninitialized lane.
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        resources: &SharedRenderResources,
        layout: PipelineLayoutId,
    ) -> Result<RenderPipelineId, LaneError> {
        build_render_pipeline(
            device,
            shaders,
            &GraphicsShaderRequest {
                path: DEBUG_LIGHTS,
                vertex_entry_point: "vs_fullscreen",
                fragment_entry_point: Some("fs_main"),
                defines: &tiling_defines(),
            },
            |desc| RenderPipelineDescriptor {
                primitive_state: PrimitiveStateDescriptor {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil_state: Some(DepthStateDescriptor::no_write_less_equal(
                    resources.depth_format,
                )),
                color_target_states: Cow::Owned(vec![ColorTargetStateDescriptor {
                    format: resources.color_format,
                    blend: Some(BlendMode::Alpha),
                }]),
                ..desc
            },
            layout,
            "Debug lights",
        )
        .ok_or_else(|| program_failed("DebugLights", "heat map program"))
    }
}

impl Lane for DebugLightsLane {
    fn strategy_name(&self) -> &'static str {
        "DebugLights"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Raster
    }
}

impl RenderLane for DebugLightsLane {
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let layout = ctx
            .device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Debug lights layout")),
                bind_group_layouts: &[ctx.resources.forward_layout],
            })
            .map_err(LaneError::initialization)?;
        self.layout = Some(layout);
        self.pipeline = Some(Self::compile(ctx.device, ctx.shaders, ctx.resources, layout)?);
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        let pipeline = self.pipeline.ok_or(LaneError::NotInitialized)?;
        let globals = frame.resources.forward_bind_group;
        let surface_view = frame.surface_view;
        let depth_view = frame.resources.depth_view;

        let encoder = frame.encoder()?;
        let color_attachment = RenderPassColorAttachment {
            view: &surface_view,
            ops: Operations::load(),
        };
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Debug lights"),
            color_attachments: std::slice::from_ref(&color_attachment),
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(Operations::load()),
            }),
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, globals, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn reinit_shading(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let layout = self.layout.ok_or(LaneError::NotInitialized)?;
        let pipeline = Self::compile(ctx.device, ctx.shaders, ctx.resources, layout)?;
        if let Some(old) = self.pipeline.replace(pipeline) {
            let _ = ctx.device.destroy_render_pipeline(old);
        }
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = device.destroy_render_pipeline(pipeline);
        }
        self.layout = None;
    }
}
