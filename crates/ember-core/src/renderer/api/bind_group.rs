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

//! Defines data structures for bind groups and bind group layouts.
//!
//! Bind groups are how buffers and texture views reach shaders. A layout
//! declares the shape of a group; a bind group fills that shape with actual
//! resources.

use super::buffer::BufferId;
use super::texture::TextureViewId;
use super::util::flags::ShaderStageFlags;

/// An opaque handle to a bind group layout resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutId(pub usize);

/// An opaque handle to a bind group resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupId(pub usize);

/// Describes the type of buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferBindingType {
    /// A uniform buffer.
    Uniform,
    /// A storage buffer (read/write or read-only).
    Storage {
        /// Whether the buffer is read-only in the shader.
        read_only: bool,
    },
}

/// The type of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// A buffer binding.
    Buffer {
        /// Uniform or storage.
        ty: BufferBindingType,
        /// Whether the binding takes a dynamic offset at bind time.
        has_dynamic_offset: bool,
        /// The minimum size the bound range must have.
        min_binding_size: Option<u64>,
    },
    /// A single-sampled 2D depth texture read with `textureLoad`.
    DepthTexture,
}

/// Describes a single binding entry in a bind group layout.
#[derive(Debug, Clone, Copy)]
pub struct BindGroupLayoutEntry {
    /// The binding index (`@binding(n)` in WGSL).
    pub binding: u32,
    /// Which shader stages can access this binding.
    pub visibility: ShaderStageFlags,
    /// The type of resource being bound.
    pub ty: BindingType,
}

impl BindGroupLayoutEntry {
    /// A uniform buffer entry.
    pub const fn uniform(binding: u32, visibility: ShaderStageFlags) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    /// A uniform buffer entry bound with a dynamic offset.
    pub const fn dynamic_uniform(binding: u32, visibility: ShaderStageFlags, size: u64) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: Some(size),
            },
        }
    }

    /// A storage buffer entry.
    pub const fn storage(binding: u32, visibility: ShaderStageFlags, read_only: bool) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
        }
    }

    /// A depth texture entry.
    pub const fn depth_texture(binding: u32, visibility: ShaderStageFlags) -> Self {
        Self {
            binding,
            visibility,
            ty: BindingType::DepthTexture,
        }
    }
}

/// Describes a bind group layout.
#[derive(Debug, Clone)]
pub struct BindGroupLayoutDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// The entries of the layout.
    pub entries: &'a [BindGroupLayoutEntry],
}

/// A range of a buffer bound to a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBinding {
    /// The bound buffer.
    pub buffer: BufferId,
    /// Start of the range in bytes.
    pub offset: u64,
    /// Size of the range. `None` binds to the end of the buffer.
    pub size: Option<u64>,
}

/// A resource bound to a bind group entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    /// A buffer range.
    Buffer(BufferBinding),
    /// A texture view.
    TextureView(TextureViewId),
}

/// A single entry of a bind group.
#[derive(Debug, Clone, Copy)]
pub struct BindGroupEntry {
    /// The binding index matching the layout entry.
    pub binding: u32,
    /// The bound resource.
    pub resource: BindingResource,
}

impl BindGroupEntry {
    /// Binds a range of `buffer`.
    pub const fn buffer(binding: u32, buffer: BufferId, offset: u64, size: Option<u64>) -> Self {
        Self {
            binding,
            resource: BindingResource::Buffer(BufferBinding {
                buffer,
                offset,
                size,
            }),
        }
    }

    /// Binds the whole of `buffer`.
    pub const fn whole_buffer(binding: u32, buffer: BufferId) -> Self {
        Self::buffer(binding, buffer, 0, None)
    }

    /// Binds a texture view.
    pub const fn texture_view(binding: u32, view: TextureViewId) -> Self {
        Self {
            binding,
            resource: BindingResource::TextureView(view),
        }
    }
}

/// Describes a bind group.
#[derive(Debug, Clone)]
pub struct BindGroupDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<&'a str>,
    /// The layout this group conforms to.
    pub layout: BindGroupLayoutId,
    /// The bound resources.
    pub entries: &'a [BindGroupEntry],
}
