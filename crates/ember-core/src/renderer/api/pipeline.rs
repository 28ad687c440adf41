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

//! Defines the data structures used to configure render and compute pipelines.

use super::bind_group::BindGroupLayoutId;
use super::shader::ShaderModuleId;
use super::texture::TextureFormat;
use std::borrow::Cow;

/// The memory format of a single vertex attribute's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Two 32-bit float components.
    Float32x2,
    /// Three 32-bit float components.
    Float32x3,
    /// Four 32-bit float components.
    Float32x4,
    /// One 32-bit unsigned integer component.
    Uint32,
}

impl VertexFormat {
    /// Size of the attribute in bytes.
    pub const fn size(self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
            VertexFormat::Uint32 => 4,
        }
    }
}

/// Defines how often the GPU advances to the next element in a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    /// The GPU advances to the next element for each vertex.
    Vertex,
    /// The GPU advances to the next element only for each new instance.
    Instance,
}

/// Describes a single vertex attribute within a vertex buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttributeDescriptor {
    /// The input location of this attribute in the vertex shader.
    pub shader_location: u32,
    /// The format of the attribute's data.
    pub format: VertexFormat,
    /// The byte offset of this attribute from the start of the vertex.
    pub offset: u64,
}

/// Describes the memory layout of a single vertex buffer.
#[derive(Debug, Clone)]
pub struct VertexBufferLayoutDescriptor<'a> {
    /// The byte distance between consecutive elements in the buffer.
    pub array_stride: u64,
    /// How often the vertex buffer is advanced.
    pub step_mode: VertexStepMode,
    /// The attributes contained within each element of the buffer.
    pub attributes: Cow<'a, [VertexAttributeDescriptor]>,
}

/// Defines how vertices are connected to form a geometric primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Every two vertices form a line.
    LineList,
    /// Every three vertices form a triangle.
    TriangleList,
}

/// Defines which face of a triangle to cull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    /// Cull front-facing triangles.
    Front,
    /// Cull back-facing triangles.
    Back,
}

/// Defines which vertex winding order is front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    /// Counter-clockwise winding order is the front face.
    Ccw,
    /// Clockwise winding order is the front face.
    Cw,
}

/// Defines how polygons are rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    /// Polygons are filled.
    Fill,
    /// Polygons are rendered as outlines (wireframe).
    Line,
}

/// Describes primitive assembly and rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveStateDescriptor {
    /// The topology of the primitives.
    pub topology: PrimitiveTopology,
    /// The winding order of front faces.
    pub front_face: FrontFace,
    /// The face culling mode, if any.
    pub cull_mode: Option<CullMode>,
    /// The rasterization mode for polygons.
    pub polygon_mode: PolygonMode,
}

impl Default for PrimitiveStateDescriptor {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: Some(CullMode::Back),
            polygon_mode: PolygonMode::Fill,
        }
    }
}

/// The comparison function used for depth testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// The test never passes.
    Never,
    /// Passes if the new value is less than the existing value.
    Less,
    /// Passes if the new value is equal to the existing value.
    Equal,
    /// Passes if the new value is less than or equal to the existing value.
    LessEqual,
    /// Passes if the new value is greater than the existing value.
    Greater,
    /// The test always passes.
    #[default]
    Always,
}

/// Depth test and write configuration of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStateDescriptor {
    /// The depth attachment format.
    pub format: TextureFormat,
    /// Whether passing fragments update the depth buffer.
    pub depth_write_enabled: bool,
    /// The depth comparison.
    pub depth_compare: CompareFunction,
}

impl DepthStateDescriptor {
    /// Depth test `LessEqual` with writes on.
    pub const fn write_less_equal(format: TextureFormat) -> Self {
        Self {
            format,
            depth_write_enabled: true,
            depth_compare: CompareFunction::LessEqual,
        }
    }

    /// Depth test `LessEqual` with writes off.
    pub const fn no_write_less_equal(format: TextureFormat) -> Self {
        Self {
            format,
            depth_write_enabled: false,
            depth_compare: CompareFunction::LessEqual,
        }
    }
}

/// Color blending applied to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// Standard `src * a + dst * (1 - a)` blending.
    Alpha,
    /// `src + dst`.
    Additive,
}

/// Describes a color target of a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetStateDescriptor {
    /// The target format.
    pub format: TextureFormat,
    /// Optional blending. `None` replaces the destination.
    pub blend: Option<BlendMode>,
}

/// An opaque handle to a render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub usize);

/// An opaque handle to a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineLayoutId(pub usize);

/// A descriptor for a pipeline layout: the ordered bind group layouts a pipeline uses.
#[derive(Debug, Clone)]
pub struct PipelineLayoutDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Bind group layouts, indexed by group number.
    pub bind_group_layouts: &'a [BindGroupLayoutId],
}

/// A descriptor for a render pipeline.
#[derive(Debug, Clone)]
pub struct RenderPipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The layout of the pipeline's bind groups.
    pub layout: Option<PipelineLayoutId>,
    /// The module holding the vertex stage.
    pub vertex_shader_module: ShaderModuleId,
    /// The vertex entry point.
    pub vertex_entry_point: Cow<'a, str>,
    /// The module holding the fragment stage, if any.
    pub fragment_shader_module: Option<ShaderModuleId>,
    /// The fragment entry point, required when a fragment module is set.
    pub fragment_entry_point: Option<Cow<'a, str>>,
    /// The vertex buffer layouts, indexed by slot.
    pub vertex_buffers_layout: Cow<'a, [VertexBufferLayoutDescriptor<'a>]>,
    /// Primitive assembly state.
    pub primitive_state: PrimitiveStateDescriptor,
    /// Depth state, if the pipeline uses a depth attachment.
    pub depth_stencil_state: Option<DepthStateDescriptor>,
    /// Color targets. Empty for depth-only pipelines.
    pub color_target_states: Cow<'a, [ColorTargetStateDescriptor]>,
}

/// An opaque handle to a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputePipelineId(pub usize);

/// A descriptor for a compute pipeline.
#[derive(Debug, Clone)]
pub struct ComputePipelineDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The layout of the pipeline's bind groups.
    pub layout: Option<PipelineLayoutId>,
    /// The module holding the compute stage.
    pub shader_module: ShaderModuleId,
    /// The compute entry point.
    pub entry_point: Cow<'a, str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_primitive_state_is_filled_back_culled_triangles() {
        let state = PrimitiveStateDescriptor::default();
        assert_eq!(state.topology, PrimitiveTopology::TriangleList);
        assert_eq!(state.cull_mode, Some(CullMode::Back));
        assert_eq!(state.polygon_mode, PolygonMode::Fill);
    }

    #[test]
    fn depth_state_helpers_differ_only_in_writes() {
        let write = DepthStateDescriptor::write_less_equal(TextureFormat::Depth32Float);
        let no_write = DepthStateDescriptor::no_write_less_equal(TextureFormat::Depth32Float);
        assert!(write.depth_write_enabled);
        assert!(!no_write.depth_write_enabled);
        assert_eq!(write.depth_compare, no_write.depth_compare);
    }

    #[test]
    fn compute_pipeline_ids_are_ordered() {
        assert!(ComputePipelineId(1) < ComputePipelineId(2));
    }
}
