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

//! Tiled light culling.
//!
//! One workgroup per screen tile reduces the tile's depth range from the
//! prepass depth buffer and writes the indices of every light touching the
//! tile into the culled-light buffer, at most `MAX_LIGHTS_PER_TILE` per tile.
//! The shading pass reads those lists instead of looping over the scene.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use crate::lanes::{build_compute_pipeline, program_failed};
use crate::resources::SharedRenderResources;
use crate::shaders::{tiling_defines, TILE_LIGHTS};
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::renderer::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, ComputePassDescriptor, ComputePipelineId, ComputeShaderRequest,
    GpuPointLight, GraphicsDevice, PipelineLayoutDescriptor, PipelineLayoutId, RenderError,
    ShaderCompiler, ShaderDefine, ShaderStageFlags, TilingUniforms, MAX_LIGHTS_IN_SCENE,
};
use ember_data::SceneState;
use std::borrow::Cow;
use std::mem::size_of;

const BINDINGS: [BindGroupLayoutEntry; 6] = [
    BindGroupLayoutEntry::uniform(0, ShaderStageFlags::COMPUTE),
    BindGroupLayoutEntry::uniform(1, ShaderStageFlags::COMPUTE),
    BindGroupLayoutEntry::storage(2, ShaderStageFlags::COMPUTE, true),
    BindGroupLayoutEntry::depth_texture(3, ShaderStageFlags::COMPUTE),
    BindGroupLayoutEntry::storage(4, ShaderStageFlags::COMPUTE, false),
    BindGroupLayoutEntry::storage(5, ShaderStageFlags::COMPUTE, false),
];

/// Define switching the culler to a sphere-only test, ignoring tile depth.
const DEBUG_SPHERES: &str = "DEBUG_SPHERES";

#[derive(Debug, Clone, Copy)]
struct CullPipelines {
    normal: ComputePipelineId,
    debug: ComputePipelineId,
}

/// Builds the per-tile light lists.
#[derive(Debug, Default)]
pub struct TileLightsLane {
    layout: Option<PipelineLayoutId>,
    bind_group: Option<BindGroupId>,
    pipelines: Option<CullPipelines>,
    debug: bool,
}

impl TileLightsLane {
    /// Creates an uninitialized lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sphere-only debug culler is active.
    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Switches between the depth-aware and the sphere-only culler.
    pub fn toggle_debug(&mut self) -> bool {
        self.debug = !self.debug;
        log::info!(
            "Tile light culling: {}",
            if self.debug { "sphere only" } else { "depth aware" }
        );
        self.debug
    }

    /// Uploads this frame's light count and the moving lights.
    ///
    /// Moving lights are written right after the static ones, so the static
    /// region of the light buffer is never rewritten. Fails without writing
    /// anything when the scene holds `MAX_LIGHTS_IN_SCENE` lights or more.
    pub fn upload_lights(
        device: &dyn GraphicsDevice,
        resources: &SharedRenderResources,
        scene: &SceneState,
    ) -> Result<(), RenderError> {
        let total = scene.total_light_count();
        if total >= MAX_LIGHTS_IN_SCENE as usize {
            log::error!(
                "{} lights exceed the light buffer capacity of {}.",
                total,
                MAX_LIGHTS_IN_SCENE
            );
            return Err(RenderError::TooManyLights {
                requested: total,
                capacity: MAX_LIGHTS_IN_SCENE as usize,
            });
        }

        let uniforms =
            TilingUniforms::new(&resources.inverse_projection, &resources.grid, total as u32);
        device.write_buffer(resources.tiling_uniforms, 0, bytemuck::bytes_of(&uniforms))?;

        let dynamic = scene.dynamic_gpu_lights();
        if !dynamic.is_empty() {
            let offset = resources.static_light_count as u64 * size_of::<GpuPointLight>() as u64;
            device.write_buffer(
                resources.point_lights,
                offset,
                bytemuck::cast_slice(&dynamic),
            )?;
        }
        Ok(())
    }

    fn compile(
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        layout: PipelineLayoutId,
    ) -> Result<CullPipelines, LaneError> {
        let mut defines = tiling_defines();
        let build = |defines: &[ShaderDefine], label: &str| {
            build_compute_pipeline(
                device,
                shaders,
                &ComputeShaderRequest {
                    path: TILE_LIGHTS,
                    entry_point: "cull_lights",
                    defines,
                    prelude: None,
                },
                layout,
                label,
            )
        };
        let normal = build(&defines, "Tile lights")
            .ok_or_else(|| program_failed("TileLights", "culling program"))?;
        defines.push(ShaderDefine::flag(DEBUG_SPHERES));
        match build(&defines, "Tile lights debug") {
            Some(debug) => Ok(CullPipelines { normal, debug }),
            None => {
                let _ = device.destroy_compute_pipeline(normal);
                Err(program_failed("TileLights", "debug culling program"))
            }
        }
    }
}

impl Lane for TileLightsLane {
    fn strategy_name(&self) -> &'static str {
        "TileLights"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Compute
    }
}

impl RenderLane for TileLightsLane {
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let device = ctx.device;
        let resources = ctx.resources;
        let bind_group_layout = device
            .create_bind_group_layout(&BindGroupLayoutDescriptor {
                label: Some("Tile lights layout"),
                entries: &BINDINGS,
            })
            .map_err(LaneError::initialization)?;
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Tile lights pipeline layout")),
                bind_group_layouts: &[bind_group_layout],
            })
            .map_err(LaneError::initialization)?;
        let bind_group = device
            .create_bind_group(&BindGroupDescriptor {
                label: Some("Tile lights"),
                layout: bind_group_layout,
                entries: &[
                    BindGroupEntry::whole_buffer(0, resources.frame_uniforms),
                    BindGroupEntry::whole_buffer(1, resources.tiling_uniforms),
                    BindGroupEntry::whole_buffer(2, resources.point_lights),
                    BindGroupEntry::texture_view(3, resources.depth_view),
                    BindGroupEntry::whole_buffer(4, resources.culled_lights),
                    BindGroupEntry::whole_buffer(5, resources.light_counts),
                ],
            })
            .map_err(LaneError::initialization)?;
        self.layout = Some(layout);
        self.bind_group = Some(bind_group);
        self.pipelines = Some(Self::compile(device, ctx.shaders, layout)?);
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        let (Some(pipelines), Some(bind_group)) = (self.pipelines, self.bind_group) else {
            return Err(LaneError::NotInitialized);
        };
        if let Err(e) = Self::upload_lights(frame.device, frame.resources, frame.scene) {
            log::error!("Light upload skipped this frame: {}", e);
        }

        let grid = frame.resources.grid;
        let pipeline = if self.debug {
            pipelines.debug
        } else {
            pipelines.normal
        };
        let encoder = frame.encoder()?;
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("Tile lights"),
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group);
        pass.dispatch_workgroups(grid.tile_count_x, grid.tile_count_y, 1);
        Ok(())
    }

    fn reinit_shading(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let layout = self.layout.ok_or(LaneError::NotInitialized)?;
        let pipelines = Self::compile(ctx.device, ctx.shaders, layout)?;
        if let Some(old) = self.pipelines.replace(pipelines) {
            let _ = ctx.device.destroy_compute_pipeline(old.normal);
            let _ = ctx.device.destroy_compute_pipeline(old.debug);
        }
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Some(pipelines) = self.pipelines.take() {
            let _ = device.destroy_compute_pipeline(pipelines.normal);
            let _ = device.destroy_compute_pipeline(pipelines.debug);
        }
        if let Some(bind_group) = self.bind_group.take() {
            let _ = device.destroy_bind_group(bind_group);
        }
        self.layout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_toggle_flips_and_reports_state() {
        let mut lane = TileLightsLane::new();
        assert!(!lane.is_debug());
        assert!(lane.toggle_debug());
        assert!(lane.is_debug());
        assert!(!lane.toggle_debug());
    }

    #[test]
    fn lane_is_a_compute_lane() {
        let lane = TileLightsLane::new();
        assert_eq!(lane.strategy_name(), "TileLights");
        assert_eq!(lane.lane_kind(), LaneKind::Compute);
    }
}
