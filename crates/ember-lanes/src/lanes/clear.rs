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

//! Clears the surface and the depth target at the start of the frame.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::math::LinearRgba;
use ember_core::renderer::{
    Operations, RenderPassColorAttachment, RenderPassDepthStencilAttachment, RenderPassDescriptor,
};

/// Color the surface is cleared to.
pub const CLEAR_COLOR: LinearRgba = LinearRgba::new(0.5, 0.125, 0.3, 1.0);

/// Value the depth target is cleared to.
pub const CLEAR_DEPTH: f32 = 1.0;

/// Clears the frame targets with an empty render pass.
#[derive(Debug, Clone)]
pub struct ClearLane {
    color: LinearRgba,
    depth: f32,
}

impl Default for ClearLane {
    fn default() -> Self {
        Self {
            color: CLEAR_COLOR,
            depth: CLEAR_DEPTH,
        }
    }
}

impl ClearLane {
    /// Creates the lane with the default clear values.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lane for ClearLane {
    fn strategy_name(&self) -> &'static str {
        "Clear"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Raster
    }
}

impl RenderLane for ClearLane {
    fn initialize(&mut self, _ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        let surface_view = frame.surface_view;
        let depth_view = frame.resources.depth_view;
        let encoder = frame.encoder()?;

        let color_attachment = RenderPassColorAttachment {
            view: &surface_view,
            ops: Operations::clear(self.color),
        };
        let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Clear"),
            color_attachments: std::slice::from_ref(&color_attachment),
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(Operations::clear(self.depth)),
            }),
        });
        Ok(())
    }
}
