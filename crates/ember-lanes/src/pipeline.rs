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

//! The frame pipeline: owns the lanes, the shared resources and the GPU timer,
//! and runs the active routine once per frame.
//!
//! Every lane is initialized up front, including the ones only the debug
//! routine uses, so switching routines never recreates anything.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use crate::lanes::{
    ClearLane, DebugLightsLane, DrawLane, PolygonizeLane, PresentLane, TileLightsLane,
    ZPrepassLane,
};
use crate::resources::SharedRenderResources;
use crate::timing::{FrameTimer, FrameTimings};
use ember_core::lane::{LaneError, LaneKind};
use ember_core::math::{Mat4, Vec3, FRAC_PI_3};
use ember_core::renderer::{
    FrameUniforms, GpuProfiler, GraphicsDevice, RenderError, ShaderCompiler,
};
use ember_data::SceneState;
use std::fmt;

/// Timestamp ring length in debug builds.
pub const DEBUG_TIMING_RING_SIZE: usize = 3;

/// Timestamp ring length in release builds.
pub const RELEASE_TIMING_RING_SIZE: usize = 5;

/// Static parameters of the frame pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePipelineConfig {
    /// Backbuffer width in pixels.
    pub width: u32,
    /// Backbuffer height in pixels.
    pub height: u32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Near plane distance.
    pub near: f32,
    /// Far plane distance.
    pub far: f32,
    /// Frames in flight tracked by the GPU timer.
    pub timing_ring_size: usize,
    /// Initial vertical sync state.
    pub vsync: bool,
}

impl Default for FramePipelineConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fov_y: FRAC_PI_3,
            near: 1.0,
            far: 5000.0,
            timing_ring_size: if cfg!(debug_assertions) {
                DEBUG_TIMING_RING_SIZE
            } else {
                RELEASE_TIMING_RING_SIZE
            },
            vsync: true,
        }
    }
}

impl FramePipelineConfig {
    /// Width over height.
    pub fn aspect_ratio(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }

    /// The camera projection, `[0, 1]` depth.
    ///
    /// Fails on a degenerate depth range instead of building a singular matrix.
    pub fn projection(&self) -> Result<Mat4, RenderError> {
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(RenderError::InitializationFailed(format!(
                "invalid depth range: near {} far {}",
                self.near, self.far
            )));
        }
        Ok(Mat4::perspective_rh_zo(
            self.fov_y,
            self.aspect_ratio(),
            self.near,
            self.far,
        ))
    }
}

/// Identifies one lane of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaneId {
    /// Clears the frame targets.
    Clear,
    /// Regenerates procedural surfaces.
    Polygonize,
    /// Depth-only pass.
    ZPrepass,
    /// Per-tile light culling.
    TileLights,
    /// Forward shading.
    Draw,
    /// Light-count heat map.
    DebugLights,
    /// Submission and presentation.
    Present,
}

impl LaneId {
    /// Every lane, in the order they are initialized.
    pub const ALL: [LaneId; 7] = [
        LaneId::Clear,
        LaneId::Polygonize,
        LaneId::ZPrepass,
        LaneId::TileLights,
        LaneId::Draw,
        LaneId::DebugLights,
        LaneId::Present,
    ];
}

/// An ordered selection of lanes run each frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineSet {
    name: &'static str,
    lanes: Vec<LaneId>,
}

impl RoutineSet {
    /// Builds a routine running `lanes` in order.
    pub fn new(name: &'static str, lanes: Vec<LaneId>) -> Self {
        Self { name, lanes }
    }

    /// Clear, Polygonize, ZPrepass, TileLights, Draw, Present.
    pub fn normal() -> Self {
        Self::new(
            "normal",
            vec![
                LaneId::Clear,
                LaneId::Polygonize,
                LaneId::ZPrepass,
                LaneId::TileLights,
                LaneId::Draw,
                LaneId::Present,
            ],
        )
    }

    /// The normal routine with the heat map in place of shading.
    pub fn debug() -> Self {
        Self::new(
            "debug",
            vec![
                LaneId::Clear,
                LaneId::Polygonize,
                LaneId::ZPrepass,
                LaneId::TileLights,
                LaneId::DebugLights,
                LaneId::Present,
            ],
        )
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The lanes, in execution order.
    pub fn lanes(&self) -> &[LaneId] {
        &self.lanes
    }

    /// Whether the heat map replaces shading.
    pub fn is_debug(&self) -> bool {
        self.lanes.contains(&LaneId::DebugLights)
    }
}

impl fmt::Display for RoutineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Default)]
struct LaneTable {
    clear: ClearLane,
    polygonize: PolygonizeLane,
    zprepass: ZPrepassLane,
    tile_lights: TileLightsLane,
    draw: DrawLane,
    debug_lights: DebugLightsLane,
    present: PresentLane,
}

impl LaneTable {
    fn get(&self, id: LaneId) -> &dyn RenderLane {
        match id {
            LaneId::Clear => &self.clear,
            LaneId::Polygonize => &self.polygonize,
            LaneId::ZPrepass => &self.zprepass,
            LaneId::TileLights => &self.tile_lights,
            LaneId::Draw => &self.draw,
            LaneId::DebugLights => &self.debug_lights,
            LaneId::Present => &self.present,
        }
    }

    fn get_mut(&mut self, id: LaneId) -> &mut dyn RenderLane {
        match id {
            LaneId::Clear => &mut self.clear,
            LaneId::Polygonize => &mut self.polygonize,
            LaneId::ZPrepass => &mut self.zprepass,
            LaneId::TileLights => &mut self.tile_lights,
            LaneId::Draw => &mut self.draw,
            LaneId::DebugLights => &mut self.debug_lights,
            LaneId::Present => &mut self.present,
        }
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        for id in LaneId::ALL {
            self.get_mut(id).destroy(device);
        }
    }
}

/// Runs the lanes of the active routine every frame.
pub struct FramePipeline {
    lanes: LaneTable,
    resources: SharedRenderResources,
    routine: RoutineSet,
    profiler: Option<Box<dyn GpuProfiler>>,
    timer: FrameTimer,
    time_since_start: f32,
    width: u32,
    height: u32,
}

impl fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePipeline")
            .field("routine", &self.routine)
            .field("frame", &self.timer.frame())
            .field("timing", &self.profiler.is_some())
            .finish_non_exhaustive()
    }
}

impl FramePipeline {
    /// Creates the shared resources and initializes every lane.
    ///
    /// `profiler` enables GPU timing; without one, frames run untimed. On
    /// failure everything created so far is released.
    pub fn new(
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        scene: &SceneState,
        config: &FramePipelineConfig,
        profiler: Option<Box<dyn GpuProfiler>>,
    ) -> Result<Self, RenderError> {
        let projection = config.projection()?;
        let resources = SharedRenderResources::create(
            device,
            config.width,
            config.height,
            projection,
            &scene.static_gpu_lights(),
            scene.sun(),
        )?;

        let mut lanes = LaneTable {
            present: PresentLane::new(config.vsync),
            ..Default::default()
        };
        let ctx = LaneInitContext {
            device,
            shaders,
            resources: &resources,
            scene,
        };
        for id in LaneId::ALL {
            let lane = lanes.get_mut(id);
            if let Err(e) = lane.initialize(&ctx) {
                let name = lane.strategy_name();
                log::error!("Failed to initialize lane {}: {}", name, e);
                lanes.destroy(device);
                resources.destroy(device);
                return Err(RenderError::InitializationFailed(format!("{name}: {e}")));
            }
        }

        log::info!(
            "Frame pipeline ready: {}x{}, GPU timing {}.",
            config.width,
            config.height,
            if profiler.is_some() { "on" } else { "off" }
        );
        Ok(Self {
            lanes,
            resources,
            routine: RoutineSet::normal(),
            profiler,
            timer: FrameTimer::new(),
            time_since_start: 0.0,
            width: config.width,
            height: config.height,
        })
    }

    /// Records, submits and presents one frame.
    ///
    /// `scene` must already be updated for this frame. A failing lane is
    /// logged and the frame continues; only a presentation failure is
    /// returned. A surface that cannot be acquired skips the frame.
    pub fn render_frame(
        &mut self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        scene: &mut SceneState,
        view: &Mat4,
        camera_position: Vec3,
        dt: f32,
    ) -> Result<(), RenderError> {
        if let Some(profiler) = self.profiler.as_deref_mut() {
            self.timer.collect(profiler);
        }

        let surface_view = match device.acquire_surface_view() {
            Ok(view) => view,
            Err(e) => {
                log::warn!("Skipping frame {}: {}", self.timer.frame(), e);
                return Ok(());
            }
        };

        self.time_since_start += dt;
        let uniforms = FrameUniforms::new(
            view,
            &self.resources.projection,
            camera_position,
            self.width,
            self.height,
            self.time_since_start,
            dt,
        );
        if let Err(e) = self.resources.write_frame_uniforms(device, &uniforms) {
            log::error!("Frame {}: frame uniforms not written: {}", self.timer.frame(), e);
        }

        let slot = self
            .profiler
            .as_deref()
            .map_or(0, |profiler| self.timer.current_slot(profiler));
        let encoder = device.create_command_encoder(Some("Frame"));
        let mut ctx = FrameContext::new(
            device,
            shaders,
            &self.resources,
            scene,
            encoder,
            surface_view,
            dt,
            self.profiler.as_deref(),
            slot,
        );
        ctx.mark_timestamp();

        let mut outcome = Ok(());
        for &id in self.routine.lanes() {
            let lane = self.lanes.get_mut(id);
            let result = lane.render(&mut ctx);
            if lane.lane_kind() == LaneKind::Present {
                if let Err(e) = result {
                    log::error!("Frame {}: presentation failed: {}", self.timer.frame(), e);
                    outcome = Err(RenderError::PresentFailed(e.to_string()));
                }
                continue;
            }
            if let Err(e) = result {
                log::error!("Lane {} failed: {}", lane.strategy_name(), e);
            }
            ctx.mark_timestamp();
        }
        let submitted = ctx.take_encoder().is_none();
        drop(ctx);

        if submitted {
            if let Some(profiler) = self.profiler.as_deref_mut() {
                profiler.after_submit(slot);
            }
        }
        self.timer.advance();
        outcome
    }

    /// Switches to `routine`. Lanes are already initialized.
    pub fn set_routine(&mut self, routine: RoutineSet) {
        log::info!("Routine: {}", routine);
        self.routine = routine;
    }

    /// Swaps between the normal and the debug routine. Returns `true` in debug.
    pub fn toggle_routine(&mut self) -> bool {
        let next = if self.routine.is_debug() {
            RoutineSet::normal()
        } else {
            RoutineSet::debug()
        };
        self.set_routine(next);
        self.routine.is_debug()
    }

    /// The active routine.
    pub fn routine(&self) -> &RoutineSet {
        &self.routine
    }

    /// Switches the tile culler between its depth-aware and sphere-only tests.
    pub fn toggle_tile_debug(&mut self) -> bool {
        self.lanes.tile_lights.toggle_debug()
    }

    /// Requests line rasterization. Returns the resulting state.
    pub fn set_wireframe(&mut self, enabled: bool) -> bool {
        self.lanes.draw.set_wireframe(enabled)
    }

    /// Flips line rasterization. Returns the resulting state.
    pub fn toggle_wireframe(&mut self) -> bool {
        let enabled = !self.lanes.draw.wireframe();
        self.set_wireframe(enabled)
    }

    /// Shows or hides the static light markers.
    pub fn set_light_overlay(&mut self, enabled: bool) {
        self.lanes.draw.set_light_overlay(enabled);
    }

    /// Flips vertical sync. Returns the new state.
    pub fn toggle_vsync(&mut self, device: &dyn GraphicsDevice) -> bool {
        self.lanes.present.toggle_vsync(device)
    }

    /// Recompiles every lane's programs, keeping buffers and bind groups.
    ///
    /// A lane that fails keeps its previous programs; the first failure is
    /// returned once every lane has been tried.
    pub fn reinit_shading(
        &mut self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        scene: &SceneState,
    ) -> Result<(), RenderError> {
        let ctx = LaneInitContext {
            device,
            shaders,
            resources: &self.resources,
            scene,
        };
        let mut first_error: Option<(&'static str, LaneError)> = None;
        for id in LaneId::ALL {
            let lane = self.lanes.get_mut(id);
            if let Err(e) = lane.reinit_shading(&ctx) {
                log::error!("Lane {} kept its programs: {}", lane.strategy_name(), e);
                first_error.get_or_insert((lane.strategy_name(), e));
            }
        }
        match first_error {
            Some((name, e)) => Err(RenderError::InitializationFailed(format!("{name}: {e}"))),
            None => {
                log::info!("Shading reinitialized.");
                Ok(())
            }
        }
    }

    /// The lane registered as `id`.
    pub fn lane(&self, id: LaneId) -> &dyn RenderLane {
        self.lanes.get(id)
    }

    /// Buffers and layouts shared by the lanes.
    pub fn resources(&self) -> &SharedRenderResources {
        &self.resources
    }

    /// Frame counter and last GPU timings.
    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }

    /// The last GPU timings read back, if any.
    pub fn last_timings(&self) -> Option<&FrameTimings> {
        self.timer.last_timings()
    }

    /// Whether line rasterization is on.
    pub fn wireframe(&self) -> bool {
        self.lanes.draw.wireframe()
    }

    /// Whether the tile culler runs its sphere-only test.
    pub fn tile_debug(&self) -> bool {
        self.lanes.tile_lights.is_debug()
    }

    /// Releases every lane and shared resource.
    pub fn destroy(&mut self, device: &dyn GraphicsDevice) {
        self.lanes.destroy(device);
        self.resources.destroy(device);
        log::info!("Frame pipeline destroyed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_the_demo_camera() {
        let config = FramePipelineConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.near, 1.0);
        assert_eq!(config.far, 5000.0);
        let expected = if cfg!(debug_assertions) { 3 } else { 5 };
        assert_eq!(config.timing_ring_size, expected);
        assert!(config.projection().is_ok());
    }

    #[test]
    fn degenerate_depth_range_is_rejected() {
        let config = FramePipelineConfig {
            near: 10.0,
            far: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            config.projection(),
            Err(RenderError::InitializationFailed(_))
        ));
    }

    #[test]
    fn routines_differ_only_in_the_shading_lane() {
        let normal = RoutineSet::normal();
        let debug = RoutineSet::debug();
        assert!(!normal.is_debug());
        assert!(debug.is_debug());
        assert_eq!(normal.lanes().len(), debug.lanes().len());
        let differing: Vec<_> = normal
            .lanes()
            .iter()
            .zip(debug.lanes())
            .filter(|(a, b)| a != b)
            .collect();
        assert_eq!(differing, vec![(&LaneId::Draw, &LaneId::DebugLights)]);
        assert_eq!(normal.lanes().last(), Some(&LaneId::Present));
    }
}
