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

//! Defines the descriptors used to record render and compute passes.

use crate::math::LinearRgba;
use crate::renderer::api::texture::TextureViewId;

/// An opaque handle to a finished command buffer, ready for submission.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// Defines the operation to perform on an attachment at the beginning of a render pass.
#[derive(Clone, Debug)]
pub enum LoadOp<V> {
    /// The existing contents of the attachment will be loaded into the pass.
    Load,
    /// The attachment will be cleared to the specified value before the pass begins.
    Clear(V),
}

/// Defines the operation to perform on an attachment at the end of a render pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOp {
    /// The results of the render pass will be stored to the attachment's memory.
    Store,
    /// The results of the render pass will be discarded.
    Discard,
}

/// Load and store operations of one attachment aspect.
#[derive(Debug, Clone)]
pub struct Operations<V> {
    /// The operation to perform at the beginning of the pass.
    pub load: LoadOp<V>,
    /// The operation to perform at the end of the pass.
    pub store: StoreOp,
}

impl<V> Operations<V> {
    /// Keeps the previous contents and stores the results.
    pub const fn load() -> Self {
        Self {
            load: LoadOp::Load,
            store: StoreOp::Store,
        }
    }

    /// Clears to `value` and stores the results.
    pub const fn clear(value: V) -> Self {
        Self {
            load: LoadOp::Clear(value),
            store: StoreOp::Store,
        }
    }
}

/// Describes a color attachment for a render pass.
#[derive(Debug)]
pub struct RenderPassColorAttachment<'a> {
    /// The [`TextureViewId`] that will be rendered to.
    pub view: &'a TextureViewId,
    /// The load and store operations for this color attachment.
    pub ops: Operations<LinearRgba>,
}

/// Describes the depth attachment for a render pass.
#[derive(Debug)]
pub struct RenderPassDepthStencilAttachment<'a> {
    /// The [`TextureViewId`] for the depth texture.
    pub view: &'a TextureViewId,
    /// The load and store operations for the depth aspect.
    /// If `None`, depth is read-only for the pass.
    pub depth_ops: Option<Operations<f32>>,
}

/// A complete description of a render pass.
#[derive(Debug, Default)]
pub struct RenderPassDescriptor<'a> {
    /// An optional debug label for the render pass.
    pub label: Option<&'a str>,
    /// A slice of color attachments to be used in the pass.
    pub color_attachments: &'a [RenderPassColorAttachment<'a>],
    /// An optional depth attachment for this pass.
    pub depth_stencil_attachment: Option<RenderPassDepthStencilAttachment<'a>>,
}

/// A complete description of a compute pass.
#[derive(Debug, Default)]
pub struct ComputePassDescriptor<'a> {
    /// An optional debug label for the compute pass.
    pub label: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_op_variants() {
        let clear_color: LoadOp<LinearRgba> = LoadOp::Clear(LinearRgba::new(0.5, 0.125, 0.3, 1.0));
        assert!(matches!(clear_color, LoadOp::Clear(_)));

        let clear_depth: LoadOp<f32> = LoadOp::Clear(1.0);
        assert!(matches!(clear_depth, LoadOp::Clear(v) if (v - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_operations_helpers_store() {
        let load: Operations<f32> = Operations::load();
        assert!(matches!(load.load, LoadOp::Load));
        assert_eq!(load.store, StoreOp::Store);

        let clear = Operations::clear(1.0f32);
        assert!(matches!(clear.load, LoadOp::Clear(_)));
        assert_eq!(clear.store, StoreOp::Store);
    }

    #[test]
    fn test_render_pass_descriptor_with_depth() {
        let view_id = TextureViewId(1);
        let depth_view_id = TextureViewId(2);

        let color_attachment = RenderPassColorAttachment {
            view: &view_id,
            ops: Operations::clear(LinearRgba::BLACK),
        };

        let descriptor = RenderPassDescriptor {
            label: Some("Test Pass"),
            color_attachments: std::slice::from_ref(&color_attachment),
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth_view_id,
                depth_ops: Some(Operations::clear(1.0)),
            }),
        };

        assert_eq!(descriptor.label, Some("Test Pass"));
        assert_eq!(descriptor.color_attachments.len(), 1);
        assert!(descriptor.depth_stencil_attachment.is_some());
    }

    #[test]
    fn test_render_pass_descriptor_default() {
        let descriptor = RenderPassDescriptor::default();

        assert!(descriptor.label.is_none());
        assert!(descriptor.color_attachments.is_empty());
        assert!(descriptor.depth_stencil_attachment.is_none());
    }
}
