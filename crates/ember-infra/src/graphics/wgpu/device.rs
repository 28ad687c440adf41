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

//! The wgpu implementation of [`GraphicsDevice`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wgpu::util::DeviceExt;

use ember_core::renderer::traits::CommandEncoder;
use ember_core::renderer::{
    BindGroupDescriptor, BindGroupId, BindGroupLayoutDescriptor, BindGroupLayoutId, BindingResource,
    BindingType, BufferDescriptor, BufferId, CommandBufferId, ComputePipelineDescriptor,
    ComputePipelineId, GraphicsDevice, PipelineError, PipelineLayoutDescriptor, PipelineLayoutId,
    RenderError, RenderPipelineDescriptor, RenderPipelineId, ResourceError, ShaderError,
    ShaderModuleDescriptor, ShaderModuleId, ShaderSourceData, TextureDescriptor, TextureFormat,
    TextureId, TextureViewId,
};

use super::command::WgpuCommandEncoder;
use super::context::WgpuGraphicsContext;
use super::conversions::{binding_size, from_wgpu_texture_format, IntoWgpu};

/// Feature name reported when timestamps can be written inside encoders.
pub const FEATURE_GPU_TIMESTAMPS: &str = "gpu_timestamps";
/// Feature name reported when pipelines can rasterize polygons as lines.
pub const FEATURE_POLYGON_MODE_LINE: &str = "polygon_mode_line";

/// An id-keyed table of live wgpu objects.
#[derive(Debug)]
struct Registry<T> {
    kind: &'static str,
    next_id: AtomicUsize,
    entries: Mutex<HashMap<usize, Arc<T>>>,
}

impl<T> Registry<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            next_id: AtomicUsize::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<usize, Arc<T>>>, ResourceError> {
        self.entries.lock().map_err(|e| {
            ResourceError::BackendError(format!("Mutex poisoned ({}): {e}", self.kind))
        })
    }

    fn insert(&self, value: T) -> Result<usize, ResourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()?.insert(id, Arc::new(value));
        Ok(id)
    }

    fn get(&self, id: usize) -> Option<Arc<T>> {
        self.lock().ok()?.get(&id).cloned()
    }

    fn remove(&self, id: usize) -> Result<Option<Arc<T>>, ResourceError> {
        Ok(self.lock()?.remove(&id))
    }

    fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or_default()
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.lock() {
            entries.clear();
        }
    }
}

/// A surface texture handed out by `acquire_surface_view` and not yet presented.
#[derive(Debug)]
struct AcquiredFrame {
    texture: wgpu::SurfaceTexture,
    view: TextureViewId,
}

/// The internal, non-clonable state of the WgpuDevice.
#[derive(Debug)]
pub struct WgpuDeviceInternal {
    context: Mutex<WgpuGraphicsContext>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    features: wgpu::Features,

    shader_modules: Registry<wgpu::ShaderModule>,
    bind_group_layouts: Registry<wgpu::BindGroupLayout>,
    bind_groups: Registry<wgpu::BindGroup>,
    pipeline_layouts: Registry<wgpu::PipelineLayout>,
    render_pipelines: Registry<wgpu::RenderPipeline>,
    compute_pipelines: Registry<wgpu::ComputePipeline>,
    buffers: Registry<wgpu::Buffer>,
    textures: Registry<wgpu::Texture>,
    texture_views: Registry<wgpu::TextureView>,

    /// Command buffers that have been finished but not yet submitted.
    pending_command_buffers: Mutex<HashMap<CommandBufferId, wgpu::CommandBuffer>>,
    command_buffer_id_counter: AtomicU64,

    current_frame: Mutex<Option<AcquiredFrame>>,
}

/// A clonable, thread-safe handle to the wgpu graphics device.
///
/// Encoders keep a clone so that they can resolve ids while recording.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

impl WgpuDevice {
    /// Takes ownership of the context and starts with empty resource tables.
    pub fn new(context: WgpuGraphicsContext) -> Self {
        let device = context.device.clone();
        let queue = context.queue.clone();
        let features = context.active_device_features;
        Self {
            internal: Arc::new(WgpuDeviceInternal {
                context: Mutex::new(context),
                device,
                queue,
                features,
                shader_modules: Registry::new("shader_modules"),
                bind_group_layouts: Registry::new("bind_group_layouts"),
                bind_groups: Registry::new("bind_groups"),
                pipeline_layouts: Registry::new("pipeline_layouts"),
                render_pipelines: Registry::new("render_pipelines"),
                compute_pipelines: Registry::new("compute_pipelines"),
                buffers: Registry::new("buffers"),
                textures: Registry::new("textures"),
                texture_views: Registry::new("texture_views"),
                pending_command_buffers: Mutex::new(HashMap::new()),
                command_buffer_id_counter: AtomicU64::new(0),
                current_frame: Mutex::new(None),
            }),
        }
    }

    /// Helper to execute an operation with the context locked.
    fn with_context<F, R>(&self, operation: F) -> Result<R, String>
    where
        F: FnOnce(&mut WgpuGraphicsContext) -> R,
    {
        let mut guard = self
            .internal
            .context
            .lock()
            .map_err(|e| format!("Failed to lock WgpuGraphicsContext: {e}"))?;
        Ok(operation(&mut guard))
    }

    /// Runs `create` inside a validation error scope.
    ///
    /// wgpu reports invalid descriptors asynchronously; popping the scope
    /// blocks until the verdict for this call is known.
    fn validated<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.internal
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let object = create(&self.internal.device);
        match pollster::block_on(self.internal.device.pop_error_scope()) {
            Some(error) => Err(error.to_string()),
            None => Ok(object),
        }
    }

    /// The underlying `wgpu::Device`.
    pub fn wgpu_device(&self) -> &wgpu::Device {
        &self.internal.device
    }

    /// The underlying `wgpu::Queue`.
    pub fn wgpu_queue(&self) -> &wgpu::Queue {
        &self.internal.queue
    }

    /// The features the logical device was opened with.
    pub fn features(&self) -> wgpu::Features {
        self.internal.features
    }

    pub(crate) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        self.internal.buffers.get(id.0)
    }

    pub(crate) fn get_wgpu_texture_view(&self, id: TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        self.internal.texture_views.get(id.0)
    }

    pub(crate) fn get_wgpu_bind_group(&self, id: BindGroupId) -> Option<Arc<wgpu::BindGroup>> {
        self.internal.bind_groups.get(id.0)
    }

    pub(crate) fn get_wgpu_render_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<Arc<wgpu::RenderPipeline>> {
        self.internal.render_pipelines.get(id.0)
    }

    pub(crate) fn get_wgpu_compute_pipeline(
        &self,
        id: ComputePipelineId,
    ) -> Option<Arc<wgpu::ComputePipeline>> {
        self.internal.compute_pipelines.get(id.0)
    }

    fn pipeline_layout(
        &self,
        id: Option<PipelineLayoutId>,
    ) -> Result<Option<Arc<wgpu::PipelineLayout>>, ResourceError> {
        match id {
            Some(id) => self
                .internal
                .pipeline_layouts
                .get(id.0)
                .map(Some)
                .ok_or(ResourceError::NotFound),
            None => Ok(None),
        }
    }

    /// Polls the device until all submitted work has completed.
    pub fn poll_device_blocking(&self) {
        if let Err(e) = self.internal.device.poll(wgpu::PollType::Wait) {
            log::warn!("Failed to poll device: {:?}", e);
        }
    }

    /// Processes completed work and pending `map_async` callbacks without blocking.
    pub fn poll_device_non_blocking(&self) {
        if let Err(e) = self.internal.device.poll(wgpu::PollType::Poll) {
            log::warn!("Failed to poll device (non-blocking): {:?}", e);
        }
    }

    /// Stores a finished command buffer until it is submitted.
    pub(crate) fn register_command_buffer(&self, buffer: wgpu::CommandBuffer) -> CommandBufferId {
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::Relaxed),
        );
        match self.internal.pending_command_buffers.lock() {
            Ok(mut pending) => {
                pending.insert(id, buffer);
            }
            Err(e) => log::error!("Mutex poisoned (pending command buffers): {e}"),
        }
        id
    }

    /// Number of live buffers, for leak checks at shutdown.
    pub fn live_buffer_count(&self) -> usize {
        self.internal.buffers.len()
    }

    /// Drops every remaining resource. Called once the device is idle.
    pub fn release_all(&self) {
        if let Ok(mut frame) = self.internal.current_frame.lock() {
            frame.take();
        }
        self.internal.render_pipelines.clear();
        self.internal.compute_pipelines.clear();
        self.internal.bind_groups.clear();
        self.internal.pipeline_layouts.clear();
        self.internal.bind_group_layouts.clear();
        self.internal.shader_modules.clear();
        self.internal.texture_views.clear();
        self.internal.textures.clear();
        self.internal.buffers.clear();
    }
}

/// A bind group resource resolved to the wgpu object it names.
enum ResolvedResource {
    Buffer(Arc<wgpu::Buffer>, u64, Option<u64>),
    View(Arc<wgpu::TextureView>),
}

impl GraphicsDevice for WgpuDevice {
    // --- Shader Module Operations ---

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        let label = descriptor.label.unwrap_or("unnamed");
        let module = self
            .validated(|device| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: descriptor.label,
                    source: wgpu::ShaderSource::Wgsl(source.clone()),
                })
            })
            .map_err(|details| ShaderError::CompilationError {
                label: label.to_string(),
                details,
            })?;
        let id = ShaderModuleId(self.internal.shader_modules.insert(module)?);
        log::debug!("WgpuDevice: Created shader module '{}' with ID: {:?}", label, id);
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        match self.internal.shader_modules.remove(id.0)? {
            Some(_) => Ok(()),
            None => Err(ShaderError::NotFound { id }.into()),
        }
    }

    // --- Bind Groups ---

    fn create_bind_group_layout(
        &self,
        descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = descriptor
            .entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.into_wgpu(),
                ty: match entry.ty {
                    BindingType::Buffer {
                        ty,
                        has_dynamic_offset,
                        min_binding_size,
                    } => wgpu::BindingType::Buffer {
                        ty: ty.into_wgpu(),
                        has_dynamic_offset,
                        min_binding_size: binding_size(min_binding_size),
                    },
                    BindingType::DepthTexture => wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                },
                count: None,
            })
            .collect();

        let layout = self
            .validated(|device| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: descriptor.label,
                    entries: &entries,
                })
            })
            .map_err(ResourceError::BackendError)?;
        let id = BindGroupLayoutId(self.internal.bind_group_layouts.insert(layout)?);
        log::debug!(
            "WgpuDevice: Created bind group layout {:?} ({} entries)",
            descriptor.label,
            entries.len()
        );
        Ok(id)
    }

    fn create_bind_group(
        &self,
        descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        let layout = self
            .internal
            .bind_group_layouts
            .get(descriptor.layout.0)
            .ok_or(ResourceError::NotFound)?;

        let resolved = descriptor
            .entries
            .iter()
            .map(|entry| {
                let resource = match entry.resource {
                    BindingResource::Buffer(binding) => ResolvedResource::Buffer(
                        self.get_wgpu_buffer(binding.buffer)
                            .ok_or(ResourceError::NotFound)?,
                        binding.offset,
                        binding.size,
                    ),
                    BindingResource::TextureView(view) => ResolvedResource::View(
                        self.get_wgpu_texture_view(view)
                            .ok_or(ResourceError::NotFound)?,
                    ),
                };
                Ok((entry.binding, resource))
            })
            .collect::<Result<Vec<_>, ResourceError>>()?;

        let entries: Vec<wgpu::BindGroupEntry> = resolved
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    ResolvedResource::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer,
                            offset: *offset,
                            size: binding_size(*size),
                        })
                    }
                    ResolvedResource::View(view) => wgpu::BindingResource::TextureView(view),
                },
            })
            .collect();

        let group = self
            .validated(|device| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: descriptor.label,
                    layout: &layout,
                    entries: &entries,
                })
            })
            .map_err(ResourceError::BackendError)?;
        Ok(BindGroupId(self.internal.bind_groups.insert(group)?))
    }

    fn destroy_bind_group(&self, id: BindGroupId) -> Result<(), ResourceError> {
        self.internal
            .bind_groups
            .remove(id.0)?
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    // --- Pipelines ---

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        let layouts = descriptor
            .bind_group_layouts
            .iter()
            .map(|id| {
                self.internal
                    .bind_group_layouts
                    .get(id.0)
                    .ok_or(ResourceError::NotFound)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let layout_refs: Vec<&wgpu::BindGroupLayout> = layouts.iter().map(|layout| layout.as_ref()).collect();

        let layout = self
            .validated(|device| {
                device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: descriptor.label.as_deref(),
                    bind_group_layouts: &layout_refs,
                    push_constant_ranges: &[],
                })
            })
            .map_err(PipelineError::LayoutCreationFailed)?;
        log::debug!(
            "WgpuDevice: Created pipeline layout {:?} with {} groups",
            descriptor.label,
            layout_refs.len()
        );
        Ok(PipelineLayoutId(self.internal.pipeline_layouts.insert(layout)?))
    }

    fn create_render_pipeline(
        &self,
        descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let pipeline_label = descriptor.label.as_deref().map(String::from);

        // 1. Resolve shader modules and layout
        let vertex_module = self
            .internal
            .shader_modules
            .get(descriptor.vertex_shader_module.0)
            .ok_or_else(|| PipelineError::InvalidShaderModuleForPipeline {
                id: descriptor.vertex_shader_module,
                pipeline_label: pipeline_label.clone(),
            })?;
        let fragment = match descriptor.fragment_shader_module {
            Some(fs_id) => {
                let module = self.internal.shader_modules.get(fs_id.0).ok_or_else(|| {
                    PipelineError::InvalidShaderModuleForPipeline {
                        id: fs_id,
                        pipeline_label: pipeline_label.clone(),
                    }
                })?;
                let entry_point = descriptor.fragment_entry_point.as_deref().ok_or_else(|| {
                    PipelineError::MissingEntryPointForFragmentShader {
                        pipeline_label: pipeline_label.clone(),
                        shader_id: fs_id,
                    }
                })?;
                Some((module, entry_point))
            }
            None => None,
        };
        let layout = self.pipeline_layout(descriptor.layout)?;

        // 2. Vertex buffer layouts
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers_layout
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attr| wgpu::VertexAttribute {
                        format: attr.format.into_wgpu(),
                        offset: attr.offset,
                        shader_location: attr.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers_layout
            .iter()
            .zip(attributes.iter())
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();

        // 3. Fixed-function state
        let depth_stencil = descriptor
            .depth_stencil_state
            .map(|ds| wgpu::DepthStencilState {
                format: ds.format.into_wgpu(),
                depth_write_enabled: ds.depth_write_enabled,
                depth_compare: ds.depth_compare.into_wgpu(),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            });
        let targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_target_states
            .iter()
            .map(|target| {
                Some(wgpu::ColorTargetState {
                    format: target.format.into_wgpu(),
                    blend: target.blend.map(IntoWgpu::into_wgpu),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        // 4. Pipeline
        let pipeline = self
            .validated(|device| {
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: descriptor.label.as_deref(),
                    layout: layout.as_deref(),
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: Some(descriptor.vertex_entry_point.as_ref()),
                        compilation_options: Default::default(),
                        buffers: &vertex_buffers,
                    },
                    primitive: descriptor.primitive_state.into_wgpu(),
                    depth_stencil,
                    multisample: wgpu::MultisampleState::default(),
                    fragment: fragment.as_ref().map(|(module, entry_point)| {
                        wgpu::FragmentState {
                            module,
                            entry_point: Some(*entry_point),
                            compilation_options: Default::default(),
                            targets: &targets,
                        }
                    }),
                    multiview: None,
                    cache: None,
                })
            })
            .map_err(|details| PipelineError::CompilationFailed {
                label: pipeline_label.clone(),
                details,
            })?;

        let id = RenderPipelineId(self.internal.render_pipelines.insert(pipeline)?);
        log::debug!(
            "WgpuDevice: Created render pipeline '{}' with ID: {:?}",
            pipeline_label.as_deref().unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        match self.internal.render_pipelines.remove(id.0)? {
            Some(_) => Ok(()),
            None => Err(PipelineError::InvalidRenderPipeline { id }.into()),
        }
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        let pipeline_label = descriptor.label.as_deref().map(String::from);
        let module = self
            .internal
            .shader_modules
            .get(descriptor.shader_module.0)
            .ok_or_else(|| PipelineError::InvalidShaderModuleForPipeline {
                id: descriptor.shader_module,
                pipeline_label: pipeline_label.clone(),
            })?;
        let layout = self.pipeline_layout(descriptor.layout)?;

        let pipeline = self
            .validated(|device| {
                device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: descriptor.label.as_deref(),
                    layout: layout.as_deref(),
                    module: &module,
                    entry_point: Some(descriptor.entry_point.as_ref()),
                    compilation_options: Default::default(),
                    cache: None,
                })
            })
            .map_err(|details| PipelineError::CompilationFailed {
                label: pipeline_label.clone(),
                details,
            })?;

        let id = ComputePipelineId(self.internal.compute_pipelines.insert(pipeline)?);
        log::debug!(
            "WgpuDevice: Created compute pipeline '{}' with ID: {:?}",
            pipeline_label.as_deref().unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        match self.internal.compute_pipelines.remove(id.0)? {
            Some(_) => Ok(()),
            None => Err(PipelineError::InvalidComputePipeline { id }.into()),
        }
    }

    // --- Buffers ---

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let buffer = self.internal.device.create_buffer(&wgpu::BufferDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.size,
            usage: descriptor.usage.into_wgpu(),
            mapped_at_creation: descriptor.mapped_at_creation,
        });
        let id = BufferId(self.internal.buffers.insert(buffer)?);
        log::debug!(
            "WgpuDevice: Created buffer '{}' with ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            descriptor.size
        );
        Ok(id)
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        let buffer = self
            .internal
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: descriptor.label.as_deref(),
                contents: data,
                usage: descriptor.usage.into_wgpu(),
            });
        let id = BufferId(self.internal.buffers.insert(buffer)?);
        log::debug!(
            "WgpuDevice: Created buffer '{}' with initial data. ID: {:?}, size: {} bytes",
            descriptor.label.as_deref().unwrap_or_default(),
            id,
            data.len()
        );
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.internal
            .buffers
            .remove(id.0)?
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let buffer = self.get_wgpu_buffer(id).ok_or(ResourceError::NotFound)?;
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(ResourceError::OutOfBounds)?;
        if end > buffer.size() {
            return Err(ResourceError::OutOfBounds);
        }
        self.internal.queue.write_buffer(&buffer, offset, data);
        Ok(())
    }

    // --- Textures ---

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let texture = self.internal.device.create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: wgpu::Extent3d {
                width: descriptor.width.max(1),
                height: descriptor.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format.into_wgpu(),
            usage: descriptor.usage.into_wgpu(),
            view_formats: &[],
        });
        let id = TextureId(self.internal.textures.insert(texture)?);
        log::debug!(
            "WgpuDevice: Created texture '{}' ({}x{} {:?}) with ID: {:?}",
            descriptor.label.as_deref().unwrap_or_default(),
            descriptor.width,
            descriptor.height,
            descriptor.format,
            id
        );
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.internal
            .textures
            .remove(id.0)?
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_texture_view(&self, texture_id: TextureId) -> Result<TextureViewId, ResourceError> {
        let texture = self
            .internal
            .textures
            .get(texture_id.0)
            .ok_or(ResourceError::NotFound)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(TextureViewId(self.internal.texture_views.insert(view)?))
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.internal
            .texture_views
            .remove(id.0)?
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    // --- Commands ---

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        let encoder = self
            .internal
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label });
        Box::new(WgpuCommandEncoder::new(encoder, self.clone()))
    }

    fn submit_command_buffer(&self, command_buffer: CommandBufferId) {
        let buffer = match self.internal.pending_command_buffers.lock() {
            Ok(mut pending) => pending.remove(&command_buffer),
            Err(e) => {
                log::error!("Mutex poisoned (pending command buffers): {e}");
                return;
            }
        };
        match buffer {
            Some(buffer) => {
                self.internal.queue.submit(std::iter::once(buffer));
            }
            None => log::error!(
                "Attempted to submit a CommandBufferId ({:?}) that does not exist.",
                command_buffer
            ),
        }
    }

    // --- Surface ---

    fn acquire_surface_view(&self) -> Result<TextureViewId, RenderError> {
        let mut frame = self
            .internal
            .current_frame
            .lock()
            .map_err(|e| RenderError::SurfaceAcquisitionFailed(e.to_string()))?;
        if let Some(stale) = frame.take() {
            log::warn!("Dropping a surface texture that was never presented.");
            let _ = self.internal.texture_views.remove(stale.view.0);
        }

        let acquired = self
            .with_context(|context| match context.surface.get_current_texture() {
                Ok(texture) => Ok(texture),
                Err(error @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                    context.reconfigure();
                    Err(format!("{error}, surface reconfigured"))
                }
                Err(error) => Err(error.to_string()),
            })
            .map_err(RenderError::SurfaceAcquisitionFailed)?
            .map_err(RenderError::SurfaceAcquisitionFailed)?;

        let view = acquired.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Surface view"),
            ..Default::default()
        });
        let view = TextureViewId(
            self.internal
                .texture_views
                .insert(view)
                .map_err(|e| RenderError::SurfaceAcquisitionFailed(e.to_string()))?,
        );
        *frame = Some(AcquiredFrame {
            texture: acquired,
            view,
        });
        Ok(view)
    }

    fn present_surface(&self) -> Result<(), RenderError> {
        let acquired = self
            .internal
            .current_frame
            .lock()
            .map_err(|e| RenderError::PresentFailed(e.to_string()))?
            .take()
            .ok_or_else(|| RenderError::PresentFailed("no surface texture was acquired".into()))?;
        let _ = self.internal.texture_views.remove(acquired.view.0);
        acquired.texture.present();
        Ok(())
    }

    fn resize_surface(&self, width: u32, height: u32) {
        if let Err(e) = self.with_context(|context| context.resize(width, height)) {
            log::error!("Failed to resize surface: {e}");
        }
    }

    fn set_vsync(&self, enabled: bool) {
        if let Err(e) = self.with_context(|context| context.set_vsync(enabled)) {
            log::error!("Failed to change present mode: {e}");
        }
    }

    fn get_surface_format(&self) -> Option<TextureFormat> {
        self.with_context(|context| from_wgpu_texture_format(context.surface_config.format))
            .ok()
            .flatten()
    }

    fn surface_size(&self) -> (u32, u32) {
        self.with_context(|context| context.get_size())
            .unwrap_or((1, 1))
    }

    fn supports_feature(&self, feature_name: &str) -> bool {
        let features = self.internal.features;
        match feature_name {
            FEATURE_GPU_TIMESTAMPS | "timestamp_query" => features.contains(
                wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS,
            ),
            FEATURE_POLYGON_MODE_LINE => features.contains(wgpu::Features::POLYGON_MODE_LINE),
            _ => {
                log::warn!("WgpuDevice: Unsupported feature_name query in supports_feature: {feature_name}");
                false
            }
        }
    }
}
