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

use crate::renderer::api::{
    bind_group::BindGroupId,
    buffer::{BufferId, IndexFormat},
    command::{CommandBufferId, ComputePassDescriptor, RenderPassDescriptor},
    pipeline::{ComputePipelineId, RenderPipelineId},
};
use crate::renderer::traits::GpuProfiler;
use std::any::Any;
use std::ops::Range;

/// A trait representing an active render pass.
///
/// Commands are recorded until the pass is dropped.
pub trait RenderPass {
    /// Sets the render pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a bind group to `index`, with one dynamic offset per dynamic binding.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]);

    /// Binds a vertex buffer to a slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Draws non-indexed primitives.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Draws indexed primitives.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Draws indexed primitives with counts read from `indirect_buffer` at `indirect_offset`.
    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64);
}

/// A trait representing an active compute pass.
pub trait ComputePass {
    /// Sets the compute pipeline for subsequent dispatches.
    fn set_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Binds a bind group to `index`.
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId);

    /// Dispatches `x * y * z` workgroups.
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32);
}

/// A trait for an object that records a sequence of GPU commands.
pub trait CommandEncoder {
    /// Begins a new render pass.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder>;

    /// Begins a new compute pass.
    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder>;

    /// Records a GPU timestamp into `profiler`'s query set.
    ///
    /// `slot` selects the in-flight frame of the profiler ring and `marker` the
    /// timestamp inside that frame.
    fn write_timestamp(&mut self, profiler: &dyn GpuProfiler, slot: usize, marker: u32);

    /// Copies `size` bytes between two buffers.
    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    );

    /// Finalizes the recording and returns a command buffer ready for submission.
    fn finish(self: Box<Self>) -> CommandBufferId;

    /// Returns a mutable reference to the underlying `Any` trait object.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
