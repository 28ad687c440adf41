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

//! The passes of the frame pipeline.
//!
//! Every lane owns its programs and per-lane buffers and reads the shared
//! buffers through [`SharedRenderResources`](crate::SharedRenderResources).
//! Lanes that draw scene geometry first gather their draws into
//! [`DrawCall`]s, pushing per-draw uniforms as they go, and only then take the
//! frame's encoder to record them.

mod clear;
mod debug_lights;
mod draw;
mod polygonize;
mod present;
mod tile_lights;
mod zprepass;

pub use clear::{ClearLane, CLEAR_COLOR, CLEAR_DEPTH};
pub use debug_lights::DebugLightsLane;
pub use draw::{DrawLane, GeometryKind, VariantKey};
pub use polygonize::PolygonizeLane;
pub use present::PresentLane;
pub use tile_lights::TileLightsLane;
pub use zprepass::ZPrepassLane;

use ember_core::lane::LaneError;
use ember_core::renderer::api::util::DynamicAllocation;
use ember_core::renderer::procedural::SurfaceVertex;
use ember_core::renderer::{
    BindGroupId, BufferId, ComputePipelineDescriptor, ComputePipelineId, ComputeShaderRequest,
    GraphicsDevice, GraphicsShaderRequest, IndexFormat, PipelineLayoutId, RenderError,
    RenderPass, RenderPipelineDescriptor, RenderPipelineId, ShaderCompiler,
    VertexAttributeDescriptor, VertexBufferLayoutDescriptor, VertexFormat, VertexStepMode,
};
use ember_data::MeshVertex;
use std::borrow::Cow;
use std::mem::size_of;
use std::ops::Range;

const MESH_ATTRIBUTES: [VertexAttributeDescriptor; 3] = [
    VertexAttributeDescriptor {
        shader_location: 0,
        format: VertexFormat::Float32x3,
        offset: 0,
    },
    VertexAttributeDescriptor {
        shader_location: 1,
        format: VertexFormat::Float32x3,
        offset: 12,
    },
    VertexAttributeDescriptor {
        shader_location: 2,
        format: VertexFormat::Float32x2,
        offset: 24,
    },
];

const SURFACE_ATTRIBUTES: [VertexAttributeDescriptor; 2] = [
    VertexAttributeDescriptor {
        shader_location: 0,
        format: VertexFormat::Float32x4,
        offset: 0,
    },
    VertexAttributeDescriptor {
        shader_location: 1,
        format: VertexFormat::Float32x4,
        offset: 16,
    },
];

/// Vertex layout of static meshes ([`MeshVertex`]).
pub(crate) fn mesh_vertex_layout() -> VertexBufferLayoutDescriptor<'static> {
    VertexBufferLayoutDescriptor {
        array_stride: size_of::<MeshVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: Cow::Borrowed(&MESH_ATTRIBUTES),
    }
}

/// Vertex layout of generated surfaces ([`SurfaceVertex`]).
pub(crate) fn surface_vertex_layout() -> VertexBufferLayoutDescriptor<'static> {
    VertexBufferLayoutDescriptor {
        array_stride: size_of::<SurfaceVertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: Cow::Borrowed(&SURFACE_ATTRIBUTES),
    }
}

/// The error reported when a lane cannot build one of its programs.
pub(crate) fn program_failed(lane: &str, what: &str) -> LaneError {
    LaneError::initialization(RenderError::InitializationFailed(format!(
        "{lane}: failed to build {what}"
    )))
}

/// Compiles a compute program and wraps it in a pipeline.
///
/// Failures are logged and yield `None`. The shader module is released once
/// the pipeline exists.
pub(crate) fn build_compute_pipeline(
    device: &dyn GraphicsDevice,
    shaders: &dyn ShaderCompiler,
    request: &ComputeShaderRequest<'_>,
    layout: PipelineLayoutId,
    label: &str,
) -> Option<ComputePipelineId> {
    let compiled = shaders.compile_compute(device, request)?;
    let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
        label: Some(Cow::Borrowed(label)),
        layout: Some(layout),
        shader_module: compiled.module,
        entry_point: Cow::Borrowed(&compiled.entry_point),
    });
    let _ = device.destroy_shader_module(compiled.module);
    match pipeline {
        Ok(pipeline) => Some(pipeline),
        Err(e) => {
            log::error!("Failed to create compute pipeline '{}': {}", label, e);
            None
        }
    }
}

/// Compiles a graphics program and lets `describe` fill in the fixed-function
/// state of the pipeline built from it.
pub(crate) fn build_render_pipeline<'a>(
    device: &dyn GraphicsDevice,
    shaders: &dyn ShaderCompiler,
    request: &GraphicsShaderRequest<'_>,
    describe: impl FnOnce(RenderPipelineDescriptor<'a>) -> RenderPipelineDescriptor<'a>,
    layout: PipelineLayoutId,
    label: &'a str,
) -> Option<RenderPipelineId> {
    let compiled = shaders.compile_graphics(device, request)?;
    let descriptor = describe(RenderPipelineDescriptor {
        label: Some(Cow::Borrowed(label)),
        layout: Some(layout),
        vertex_shader_module: compiled.module,
        vertex_entry_point: Cow::Owned(compiled.vertex_entry_point),
        fragment_shader_module: compiled.fragment_entry_point.as_ref().map(|_| compiled.module),
        fragment_entry_point: compiled.fragment_entry_point.map(Cow::Owned),
        vertex_buffers_layout: Cow::Owned(Vec::new()),
        primitive_state: Default::default(),
        depth_stencil_state: None,
        color_target_states: Cow::Owned(Vec::new()),
    });
    let pipeline = device.create_render_pipeline(&descriptor);
    let _ = device.destroy_shader_module(compiled.module);
    match pipeline {
        Ok(pipeline) => Some(pipeline),
        Err(e) => {
            log::error!("Failed to create render pipeline '{}': {}", label, e);
            None
        }
    }
}

/// Where a draw's vertices and counts come from.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Geometry {
    /// A range of a static mesh's index buffer.
    Indexed {
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        index_format: IndexFormat,
        indices: Range<u32>,
    },
    /// A generated surface whose index count lives in its indirect buffer.
    Indirect {
        vertex_buffer: BufferId,
        index_buffer: BufferId,
        indirect_buffer: BufferId,
    },
}

/// One draw gathered before recording.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DrawCall {
    pub pipeline: RenderPipelineId,
    pub object: DynamicAllocation,
    pub geometry: Geometry,
}

/// Records `draws` in order, binding `globals` as group 0 and each draw's
/// object block as group 1.
pub(crate) fn record_draws(pass: &mut dyn RenderPass, globals: BindGroupId, draws: &[DrawCall]) {
    pass.set_bind_group(0, globals, &[]);
    let mut current = None;
    for draw in draws {
        if current != Some(draw.pipeline) {
            pass.set_pipeline(draw.pipeline);
            current = Some(draw.pipeline);
        }
        pass.set_bind_group(1, draw.object.bind_group, &[draw.object.offset]);
        match &draw.geometry {
            Geometry::Indexed {
                vertex_buffer,
                index_buffer,
                index_format,
                indices,
            } => {
                pass.set_vertex_buffer(0, *vertex_buffer, 0);
                pass.set_index_buffer(*index_buffer, 0, *index_format);
                pass.draw_indexed(indices.clone(), 0, 0..1);
            }
            Geometry::Indirect {
                vertex_buffer,
                index_buffer,
                indirect_buffer,
            } => {
                pass.set_vertex_buffer(0, *vertex_buffer, 0);
                pass.set_index_buffer(*index_buffer, 0, IndexFormat::Uint32);
                pass.draw_indexed_indirect(*indirect_buffer, 0);
            }
        }
    }
}
