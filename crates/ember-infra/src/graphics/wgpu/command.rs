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

//! Command recording on top of `wgpu::CommandEncoder` and its passes.
//!
//! Passes resolve engine ids through the device while recording. An id that
//! no longer resolves is logged and the command is skipped.

use ember_core::renderer::traits::{CommandEncoder, ComputePass, GpuProfiler, RenderPass};
use ember_core::renderer::{
    BindGroupId, BufferId, CommandBufferId, ComputePassDescriptor, ComputePipelineId, IndexFormat,
    RenderPassDescriptor, RenderPipelineId,
};
use std::any::Any;
use std::ops::Range;
use std::sync::Arc;

use super::conversions::IntoWgpu;
use super::device::WgpuDevice;
use super::profiler::WgpuTimestampProfiler;

/// A render pass being recorded.
pub struct WgpuRenderPass<'a> {
    pub(crate) pass: wgpu::RenderPass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl RenderPass for WgpuRenderPass<'_> {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        match self.device.get_wgpu_render_pipeline(pipeline) {
            Some(pipeline) => self.pass.set_pipeline(&pipeline),
            None => log::warn!("WgpuRenderPass: RenderPipelineId {:?} not found.", pipeline),
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]) {
        match self.device.get_wgpu_bind_group(bind_group) {
            Some(group) => self.pass.set_bind_group(index, group.as_ref(), offsets),
            None => log::warn!("WgpuRenderPass: BindGroupId {:?} not found.", bind_group),
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64) {
        match self.device.get_wgpu_buffer(buffer) {
            Some(wgpu_buffer) => self.pass.set_vertex_buffer(slot, wgpu_buffer.slice(offset..)),
            None => log::warn!("WgpuRenderPass: Vertex BufferId {:?} not found.", buffer),
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat) {
        match self.device.get_wgpu_buffer(buffer) {
            Some(wgpu_buffer) => self
                .pass
                .set_index_buffer(wgpu_buffer.slice(offset..), index_format.into_wgpu()),
            None => log::warn!("WgpuRenderPass: Index BufferId {:?} not found.", buffer),
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.pass.draw(vertices, instances);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.pass.draw_indexed(indices, base_vertex, instances);
    }

    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, indirect_offset: u64) {
        match self.device.get_wgpu_buffer(indirect_buffer) {
            Some(wgpu_buffer) => self.pass.draw_indexed_indirect(&wgpu_buffer, indirect_offset),
            None => log::warn!(
                "WgpuRenderPass: Indirect BufferId {:?} not found.",
                indirect_buffer
            ),
        }
    }
}

/// A compute pass being recorded.
pub struct WgpuComputePass<'a> {
    pub(crate) pass: wgpu::ComputePass<'a>,
    pub(crate) device: &'a WgpuDevice,
}

impl ComputePass for WgpuComputePass<'_> {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        match self.device.get_wgpu_compute_pipeline(pipeline) {
            Some(pipeline) => self.pass.set_pipeline(&pipeline),
            None => log::warn!("WgpuComputePass: ComputePipelineId {:?} not found.", pipeline),
        }
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId) {
        match self.device.get_wgpu_bind_group(bind_group) {
            Some(group) => self.pass.set_bind_group(index, group.as_ref(), &[]),
            None => log::warn!("WgpuComputePass: BindGroupId {:?} not found.", bind_group),
        }
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.pass.dispatch_workgroups(x, y, z);
    }
}

/// Records commands into a `wgpu::CommandEncoder`.
pub struct WgpuCommandEncoder {
    encoder: wgpu::CommandEncoder,
    device: WgpuDevice,
}

impl WgpuCommandEncoder {
    pub(crate) fn new(encoder: wgpu::CommandEncoder, device: WgpuDevice) -> Self {
        Self { encoder, device }
    }

    /// The wrapped encoder, for backend code recording commands the
    /// engine-level trait does not expose.
    pub fn wgpu_encoder_mut(&mut self) -> &mut wgpu::CommandEncoder {
        &mut self.encoder
    }
}

impl CommandEncoder for WgpuCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder> {
        // Resolve every view first; the wgpu descriptor borrows from these.
        let color_views: Vec<Option<Arc<wgpu::TextureView>>> = descriptor
            .color_attachments
            .iter()
            .map(|attachment| {
                let view = self.device.get_wgpu_texture_view(*attachment.view);
                if view.is_none() {
                    log::warn!(
                        "WgpuCommandEncoder: color attachment {:?} not found.",
                        attachment.view
                    );
                }
                view
            })
            .collect();
        let depth_view = descriptor
            .depth_stencil_attachment
            .as_ref()
            .and_then(|ds| self.device.get_wgpu_texture_view(*ds.view));

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = descriptor
            .color_attachments
            .iter()
            .zip(color_views.iter())
            .map(|(attachment, view)| {
                view.as_deref().map(|view| wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: attachment.ops.clone().into_wgpu(),
                })
            })
            .collect();

        let depth_stencil_attachment = match (&descriptor.depth_stencil_attachment, &depth_view) {
            (Some(ds), Some(view)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: ds.depth_ops.clone().map(IntoWgpu::into_wgpu),
                stencil_ops: None,
            }),
            (Some(ds), None) => {
                log::warn!("WgpuCommandEncoder: depth attachment {:?} not found.", ds.view);
                None
            }
            _ => None,
        };

        let pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: descriptor.label,
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        Box::new(WgpuRenderPass {
            pass,
            device: &self.device,
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder> {
        let pass = self
            .encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: descriptor.label,
                timestamp_writes: None,
            });

        Box::new(WgpuComputePass {
            pass,
            device: &self.device,
        })
    }

    fn write_timestamp(&mut self, profiler: &dyn GpuProfiler, slot: usize, marker: u32) {
        let Some(profiler) = profiler.as_any().downcast_ref::<WgpuTimestampProfiler>() else {
            log::warn!("WgpuCommandEncoder: timestamps need a WgpuTimestampProfiler.");
            return;
        };
        match profiler.query_index(slot, marker) {
            Some(index) => self.encoder.write_timestamp(profiler.query_set(), index),
            None => log::warn!(
                "WgpuCommandEncoder: timestamp slot {} marker {} is out of range.",
                slot,
                marker
            ),
        }
    }

    fn copy_buffer_to_buffer(
        &mut self,
        source: BufferId,
        source_offset: u64,
        destination: BufferId,
        destination_offset: u64,
        size: u64,
    ) {
        match (
            self.device.get_wgpu_buffer(source),
            self.device.get_wgpu_buffer(destination),
        ) {
            (Some(source_buffer), Some(destination_buffer)) => {
                self.encoder.copy_buffer_to_buffer(
                    &source_buffer,
                    source_offset,
                    &destination_buffer,
                    destination_offset,
                    size,
                );
            }
            _ => log::warn!(
                "WgpuCommandEncoder: copy between {:?} and {:?} skipped, buffer not found.",
                source,
                destination
            ),
        }
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let this = *self;
        this.device.register_command_buffer(this.encoder.finish())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
