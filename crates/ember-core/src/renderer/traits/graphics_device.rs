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

use crate::renderer::api::*;
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::CommandEncoder;
use std::fmt::Debug;

/// The central trait for creating and managing GPU resources.
///
/// Resources are referenced through the opaque ids of [`crate::renderer::api`];
/// the backend keeps the actual objects in its own tables. The device also owns
/// the presentation surface, since the frame pipeline only ever renders to one.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Creates a shader module from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - The shader source and label.
    /// ## Returns
    /// The ID of the created shader module.
    /// ## Errors
    /// * `ResourceError` - If the source fails to validate or compile.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys the shader module associated with the given ID.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a bind group layout.
    /// ## Arguments
    /// * `descriptor` - The entries of the layout.
    /// ## Returns
    /// The ID of the created layout.
    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError>;

    /// Creates a bind group conforming to an existing layout.
    /// ## Arguments
    /// * `descriptor` - The layout and the bound resources.
    /// ## Returns
    /// The ID of the created bind group.
    /// ## Errors
    /// * `ResourceError::NotFound` - If the layout or a bound resource does not exist.
    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError>;

    /// Destroys a bind group.
    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError>;

    /// Creates a pipeline layout from the provided descriptor.
    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError>;

    /// Creates a render pipeline from the provided descriptor.
    /// ## Arguments
    /// * `descriptor` - The full pipeline configuration.
    /// ## Returns
    /// The ID of the created render pipeline.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If a shader module is missing or the backend rejects the pipeline.
    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys the render pipeline associated with the given ID.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    /// Creates a compute pipeline from the provided descriptor.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Destroys the compute pipeline associated with the given ID.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - Size, usage and label of the buffer.
    /// ## Returns
    /// The ID of the created buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Creates a new GPU buffer and initializes it with the provided data.
    /// ## Arguments
    /// * `descriptor` - Usage and label of the buffer. The size is taken from `data`.
    /// * `data` - The initial contents.
    /// ## Returns
    /// The ID of the created buffer.
    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Writes data to a GPU buffer through the queue.
    ///
    /// The write is ordered before any command buffer submitted afterwards.
    /// ## Arguments
    /// * `id` - The ID of the buffer to write to.
    /// * `offset` - The byte offset in the buffer where the data will be written.
    /// * `data` - The bytes to write.
    /// ## Errors
    /// * `ResourceError::OutOfBounds` - If the write does not fit inside the buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Creates a new 2D GPU texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a full view of a texture.
    fn create_texture_view(&self, texture_id: TextureId) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Creates a new command encoder to record GPU commands.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer to the queue.
    fn submit_command_buffer(&self, command_buffer: CommandBufferId);

    /// Acquires the next surface texture and returns a view of it.
    ///
    /// The view stays valid until [`GraphicsDevice::present_surface`] is called.
    /// ## Errors
    /// * `RenderError::SurfaceAcquisitionFailed` - If no frame could be acquired.
    fn acquire_surface_view(&self) -> Result<TextureViewId, RenderError>;

    /// Presents the frame acquired by [`GraphicsDevice::acquire_surface_view`].
    /// ## Errors
    /// * `RenderError::PresentFailed` - If no frame was acquired or presentation failed.
    fn present_surface(&self) -> Result<(), RenderError>;

    /// Reconfigures the surface for a new size.
    fn resize_surface(&self, width: u32, height: u32);

    /// Enables or disables vertical sync on the surface.
    fn set_vsync(&self, enabled: bool);

    /// Returns the format of the surface, if one is configured.
    fn get_surface_format(&self) -> Option<TextureFormat>;

    /// Returns the size of the surface in pixels.
    fn surface_size(&self) -> (u32, u32);

    /// Returns `true` if the device supports the named feature (e.g. `"timestamp_query"`).
    fn supports_feature(&self, feature_name: &str) -> bool;
}
