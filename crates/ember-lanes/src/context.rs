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

//! What a lane receives at initialization and on every frame.

use crate::resources::SharedRenderResources;
use ember_core::lane::{Lane, LaneError};
use ember_core::renderer::{
    CommandEncoder, GpuProfiler, GraphicsDevice, ShaderCompiler, TextureViewId,
};
use ember_data::SceneState;

/// Everything a lane may use to create its GPU programs and resources.
#[derive(Clone, Copy)]
pub struct LaneInitContext<'a> {
    /// The device owning every resource.
    pub device: &'a dyn GraphicsDevice,
    /// Compiles the lane's programs.
    pub shaders: &'a dyn ShaderCompiler,
    /// Buffers and layouts shared between lanes.
    pub resources: &'a SharedRenderResources,
    /// The scene as it stands at startup.
    pub scene: &'a SceneState,
}

/// The per-frame state threaded through every lane of a routine.
pub struct FrameContext<'a> {
    /// The device owning every resource.
    pub device: &'a dyn GraphicsDevice,
    /// Compiles programs needed lazily during the frame.
    pub shaders: &'a dyn ShaderCompiler,
    /// Buffers and layouts shared between lanes.
    pub resources: &'a SharedRenderResources,
    /// The scene, already updated for this frame.
    pub scene: &'a mut SceneState,
    /// Seconds since the previous frame.
    pub dt: f32,
    /// The surface texture being rendered this frame.
    pub surface_view: TextureViewId,
    encoder: Option<Box<dyn CommandEncoder>>,
    profiler: Option<&'a dyn GpuProfiler>,
    timing_slot: usize,
    next_marker: u32,
}

impl<'a> FrameContext<'a> {
    /// Creates the context of a frame recording into `encoder`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &'a dyn GraphicsDevice,
        shaders: &'a dyn ShaderCompiler,
        resources: &'a SharedRenderResources,
        scene: &'a mut SceneState,
        encoder: Box<dyn CommandEncoder>,
        surface_view: TextureViewId,
        dt: f32,
        profiler: Option<&'a dyn GpuProfiler>,
        timing_slot: usize,
    ) -> Self {
        Self {
            device,
            shaders,
            resources,
            scene,
            dt,
            surface_view,
            encoder: Some(encoder),
            profiler,
            timing_slot,
            next_marker: 0,
        }
    }

    /// The frame's command encoder, until a lane has submitted it.
    pub fn encoder(&mut self) -> Result<&mut dyn CommandEncoder, LaneError> {
        match self.encoder.as_deref_mut() {
            Some(encoder) => Ok(encoder),
            None => Err(LaneError::MissingResource("command encoder")),
        }
    }

    /// Takes the encoder for submission. Later lanes find it missing.
    pub fn take_encoder(&mut self) -> Option<Box<dyn CommandEncoder>> {
        self.encoder.take()
    }

    /// Records the next timestamp of this frame, if timing is enabled.
    ///
    /// Markers past the profiler's per-frame budget are ignored.
    pub fn mark_timestamp(&mut self) {
        let (Some(profiler), Some(encoder)) = (self.profiler, self.encoder.as_deref_mut()) else {
            return;
        };
        if self.next_marker >= profiler.markers_per_frame() {
            return;
        }
        encoder.write_timestamp(profiler, self.timing_slot, self.next_marker);
        self.next_marker += 1;
    }

    /// Resolves this frame's timestamps into the profiler's readback buffers.
    pub fn resolve_timestamps(&mut self) {
        if let (Some(profiler), Some(encoder)) = (self.profiler, self.encoder.as_deref_mut()) {
            profiler.resolve(encoder, self.timing_slot);
        }
    }
}

/// A pass of the frame pipeline.
pub trait RenderLane: Lane {
    /// Creates the lane's programs and resources. Called once, before the first frame.
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError>;

    /// Records the lane's work for one frame.
    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError>;

    /// Recompiles the lane's programs without touching its buffers.
    ///
    /// On failure the previous programs stay in use.
    fn reinit_shading(&mut self, _ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        Ok(())
    }

    /// Releases the lane's GPU resources.
    fn destroy(&mut self, _device: &dyn GraphicsDevice) {}
}
