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

//! Per-frame arena for small uniform blocks bound with a dynamic offset.

use crate::renderer::{
    api::{
        bind_group::{BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutId},
        buffer::{BufferDescriptor, BufferId, BufferUsage},
    },
    error::ResourceError,
    traits::GraphicsDevice,
};
use std::borrow::Cow;

/// Default minimum uniform alignment required by most APIs.
pub const MIN_UNIFORM_ALIGNMENT: u32 = 256;

/// Default number of elements in the first chunk.
pub const DEFAULT_MAX_ELEMENTS: u32 = 1024;

#[derive(Debug)]
struct ArenaChunk {
    buffer: BufferId,
    bind_group: BindGroupId,
    capacity: u32,
    cursor: u32,
}

/// Where a pushed element landed: the chunk's bind group and the dynamic offset to bind it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicAllocation {
    /// The bind group covering the chunk that holds the element.
    pub bind_group: BindGroupId,
    /// The byte offset to pass as the dynamic offset.
    pub offset: u32,
}

/// A growable set of uniform buffers reset once per frame.
///
/// Every `push` writes one element through the queue and returns where it landed.
/// When the active chunk is full the arena moves to the next chunk, creating a
/// larger one if needed. Queue writes are ordered before the frame's submission,
/// so a single set of chunks is enough.
#[derive(Debug)]
pub struct DynamicUniformArena {
    chunks: Vec<ArenaChunk>,
    active: usize,
    element_size: u32,
    alignment: u32,
    layout: BindGroupLayoutId,
    binding: u32,
    label: &'static str,
}

impl DynamicUniformArena {
    /// Creates the arena with one chunk sized for `max_elements` aligned elements.
    ///
    /// # Arguments
    ///
    /// * `device` - The graphics device to use.
    /// * `layout` - The bind group layout the chunks are bound with.
    /// * `binding` - The binding index of the uniform inside that layout.
    /// * `element_size` - The size of each element in bytes.
    /// * `max_elements` - The capacity of the first chunk.
    /// * `alignment` - The dynamic offset alignment.
    /// * `label` - The label for the buffers.
    pub fn new(
        device: &dyn GraphicsDevice,
        layout: BindGroupLayoutId,
        binding: u32,
        element_size: u32,
        max_elements: u32,
        alignment: u32,
        label: &'static str,
    ) -> Result<Self, ResourceError> {
        let mut arena = Self {
            chunks: Vec::new(),
            active: 0,
            element_size,
            alignment,
            layout,
            binding,
            label,
        };
        let capacity = arena.aligned(element_size) * max_elements.max(1);
        arena.add_chunk(device, capacity)?;
        Ok(arena)
    }

    fn aligned(&self, size: u32) -> u32 {
        (size + self.alignment - 1) & !(self.alignment - 1)
    }

    fn add_chunk(&mut self, device: &dyn GraphicsDevice, capacity: u32) -> Result<(), ResourceError> {
        let index = self.chunks.len();
        let buffer = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(format!("{} [chunk {}]", self.label, index))),
            size: capacity as u64,
            usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        })?;
        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some(self.label),
            layout: self.layout,
            entries: &[BindGroupEntry::buffer(
                self.binding,
                buffer,
                0,
                Some(self.element_size as u64),
            )],
        })?;
        self.chunks.push(ArenaChunk {
            buffer,
            bind_group,
            capacity,
            cursor: 0,
        });
        Ok(())
    }

    /// Rewinds every chunk. Call once at the start of the frame.
    pub fn reset(&mut self) {
        for chunk in &mut self.chunks {
            chunk.cursor = 0;
        }
        self.active = 0;
    }

    /// Writes `data` into the arena and returns where it landed.
    pub fn push(
        &mut self,
        device: &dyn GraphicsDevice,
        data: &[u8],
    ) -> Result<DynamicAllocation, ResourceError> {
        let size = self.aligned(data.len() as u32);
        loop {
            let chunk = &self.chunks[self.active];
            if chunk.cursor + size <= chunk.capacity {
                break;
            }
            if self.active + 1 < self.chunks.len() {
                self.active += 1;
                continue;
            }
            let grown = (chunk.capacity * 2).max(size);
            self.add_chunk(device, grown)?;
            self.active = self.chunks.len() - 1;
        }

        let chunk = &mut self.chunks[self.active];
        let offset = chunk.cursor;
        device.write_buffer(chunk.buffer, offset as u64, data)?;
        chunk.cursor += size;

        Ok(DynamicAllocation {
            bind_group: chunk.bind_group,
            offset,
        })
    }

    /// Releases every buffer and bind group.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        for chunk in &self.chunks {
            if let Err(e) = device.destroy_bind_group(chunk.bind_group) {
                log::warn!(
                    "DynamicUniformArena({}): Failed to destroy bind group: {:?}",
                    self.label,
                    e
                );
            }
            if let Err(e) = device.destroy_buffer(chunk.buffer) {
                log::warn!(
                    "DynamicUniformArena({}): Failed to destroy buffer: {:?}",
                    self.label,
                    e
                );
            }
        }
    }
}
