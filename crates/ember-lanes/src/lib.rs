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

//! # Ember Lanes
//!
//! The passes of the frame pipeline and the pipeline that runs them.
//!
//! Every frame runs a fixed routine: clear the targets, polygonize queued
//! procedural surfaces, lay down depth, cull point lights into screen tiles,
//! shade, and present. Passes ("lanes") share GPU buffers through
//! [`SharedRenderResources`] and talk to the backend only through the traits
//! of `ember-core`.

#![warn(missing_docs)]

pub mod context;
pub mod lanes;
pub mod pipeline;
pub mod resources;
pub mod shaders;
pub mod timing;

pub use context::{FrameContext, LaneInitContext, RenderLane};
pub use lanes::{
    ClearLane, DebugLightsLane, DrawLane, PolygonizeLane, PresentLane, TileLightsLane,
    ZPrepassLane,
};
pub use pipeline::{FramePipeline, FramePipelineConfig, LaneId, RoutineSet};
pub use resources::{GlobalProperties, ObjectUniforms, SharedRenderResources};
pub use timing::{FrameTimer, FrameTimings};
