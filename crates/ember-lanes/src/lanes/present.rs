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

//! Submits the frame and presents the surface.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::renderer::GraphicsDevice;

/// Closes the frame: records the last timestamp, resolves the frame's
/// queries, submits the encoder and presents.
///
/// This is the only lane whose failure ends the frame with an error.
#[derive(Debug, Clone)]
pub struct PresentLane {
    vsync: bool,
}

impl Default for PresentLane {
    fn default() -> Self {
        Self { vsync: true }
    }
}

impl PresentLane {
    /// Creates the lane with vertical sync `vsync`.
    pub fn new(vsync: bool) -> Self {
        Self { vsync }
    }

    /// Whether presentation waits for vertical sync.
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    /// Flips vertical sync and applies it to the surface. Returns the new state.
    pub fn toggle_vsync(&mut self, device: &dyn GraphicsDevice) -> bool {
        self.vsync = !self.vsync;
        device.set_vsync(self.vsync);
        log::info!("VSync {}", if self.vsync { "on" } else { "off" });
        self.vsync
    }
}

impl Lane for PresentLane {
    fn strategy_name(&self) -> &'static str {
        "Present"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Present
    }
}

impl RenderLane for PresentLane {
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        ctx.device.set_vsync(self.vsync);
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        frame.mark_timestamp();
        frame.resolve_timestamps();

        let encoder = frame
            .take_encoder()
            .ok_or(LaneError::MissingResource("command encoder"))?;
        frame.device.submit_command_buffer(encoder.finish());
        frame.device.present_surface().map_err(LaneError::execution)
    }
}
