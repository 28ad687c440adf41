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

//! The winit application: window, renderer bring-up and the frame loop.

use crate::camera::FlyCamera;
use crate::controls::{Controls, DemoCommand};
use crate::courtyard;
use anyhow::{Context, Result};
use ember_core::math::Vec3;
use ember_core::renderer::{GraphicsDevice, RenderError};
use ember_data::{Entity, EntityId, SceneConfig, SceneState};
use ember_infra::{
    translate_winit_input, WgpuRenderSystem, WgslShaderCompiler, WinitWindow, WinitWindowBuilder,
};
use ember_lanes::shaders::builtin_shaders;
use ember_lanes::timing::FRAME_MARKERS;
use ember_lanes::{FramePipeline, FramePipelineConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowId;

/// Seconds between two window title refreshes.
const TITLE_INTERVAL: f32 = 1.0;

const CAMERA_EYE: Vec3 = Vec3::new(-300.0, 150.0, -5.0);
const CAMERA_TARGET: Vec3 = Vec3::new(0.0, 100.0, 0.0);

/// Everything that exists once the window and the device are up.
struct Demo {
    system: WgpuRenderSystem,
    shaders: WgslShaderCompiler,
    scene: SceneState,
    pipeline: FramePipeline,
    camera: FlyCamera,
    controls: Controls,
    courtyard: EntityId,
    light_overlay: bool,
    adapter: String,
    frames_since_title: u32,
    seconds_since_title: f32,
}

impl Demo {
    fn new(window: &WinitWindow, root: &Path) -> Result<Self> {
        let mut config = SceneConfig::load(root.join("assets/scene.ron"))?;
        for procedural in &mut config.procedurals {
            if procedural.generator_path.is_relative() {
                procedural.generator_path = root.join(&procedural.generator_path);
            }
        }

        let (width, height) = window.inner_size();
        let pipeline_config = FramePipelineConfig {
            width,
            height,
            ..Default::default()
        };

        let system = WgpuRenderSystem::new(window.handle(), pipeline_config.vsync)?;
        let device = system.device();

        let shaders = WgslShaderCompiler::with_root(root.join("assets/shaders"));
        shaders.register_all(builtin_shaders());

        let mut scene = SceneState::new(&config, pipeline_config.projection()?)?;
        let mesh = scene.add_mesh(device, &courtyard::build(), "Courtyard")?;
        let courtyard = scene.spawn_entity(Entity::new(mesh, Vec3::ZERO))?;
        for procedural in &config.procedurals {
            let source = std::fs::read_to_string(&procedural.generator_path).with_context(|| {
                format!(
                    "failed to read generator '{}'",
                    procedural.generator_path.display()
                )
            })?;
            scene.spawn_procedural(device, procedural, source)?;
        }

        let profiler = system.create_profiler(pipeline_config.timing_ring_size, FRAME_MARKERS);
        let pipeline =
            FramePipeline::new(device, &shaders, &scene, &pipeline_config, profiler)?;

        let adapter = system.adapter_description();
        Ok(Self {
            system,
            shaders,
            scene,
            pipeline,
            camera: FlyCamera::look_at(CAMERA_EYE, CAMERA_TARGET),
            controls: Controls::default(),
            courtyard,
            light_overlay: false,
            adapter,
            frames_since_title: 0,
            seconds_since_title: 0.0,
        })
    }

    /// Runs a key command. Returns `false` when the demo should quit.
    fn run_command(&mut self, command: DemoCommand) -> bool {
        let device = self.system.device();
        match command {
            DemoCommand::ToggleRoutine => {
                self.pipeline.toggle_routine();
            }
            DemoCommand::ToggleTileDebug => {
                let debug = self.pipeline.toggle_tile_debug();
                log::info!("Sphere-only tile culling: {}", debug);
            }
            DemoCommand::ToggleWireframe => {
                let wireframe = self.pipeline.toggle_wireframe();
                log::info!("Wireframe: {}", wireframe);
            }
            DemoCommand::ToggleVsync => {
                let vsync = self.pipeline.toggle_vsync(device);
                log::info!("VSync: {}", vsync);
            }
            DemoCommand::ToggleLightOverlay => {
                self.light_overlay = !self.light_overlay;
                self.pipeline.set_light_overlay(self.light_overlay);
            }
            DemoCommand::ReloadProcedural => self.scene.reload_procedural(),
            DemoCommand::FireLight => {
                self.scene
                    .fire_light(self.camera.position(), self.camera.forward());
            }
            DemoCommand::ReinitShading => {
                if let Err(e) = self
                    .pipeline
                    .reinit_shading(device, &self.shaders, &self.scene)
                {
                    log::warn!("Shading reinitialized with errors: {}", e);
                }
            }
            DemoCommand::NudgeEntity(delta) => self.scene.nudge_entity(self.courtyard, delta),
            DemoCommand::Exit => return false,
        }
        true
    }

    fn frame(&mut self, dt: f32) -> Result<(), RenderError> {
        self.controls.apply(&mut self.camera, dt);
        let view = self.camera.view();
        self.scene.update(dt, view);
        self.pipeline.render_frame(
            self.system.device(),
            &self.shaders,
            &mut self.scene,
            &view,
            self.camera.position(),
            dt,
        )
    }

    /// Returns a new window title once per [`TITLE_INTERVAL`].
    fn title(&mut self, dt: f32) -> Option<String> {
        self.frames_since_title += 1;
        self.seconds_since_title += dt;
        if self.seconds_since_title < TITLE_INTERVAL {
            return None;
        }
        let fps = self.frames_since_title as f32 / self.seconds_since_title;
        self.frames_since_title = 0;
        self.seconds_since_title = 0.0;

        let gpu = self
            .pipeline
            .last_timings()
            .map_or_else(|| "n/a".to_string(), |t| format!("{:.2} ms", t.total_ms));
        Some(format!(
            "Ember [{}] - {} - {:.0} fps, GPU {} - {} lights",
            self.pipeline.routine(),
            self.adapter,
            fps,
            gpu,
            self.scene.total_light_count()
        ))
    }

    fn shutdown(&mut self) {
        let device = self.system.device();
        self.pipeline.destroy(device);
        self.scene.destroy(device);
        self.system.shutdown();
    }
}

/// The demo's `winit` application state.
pub struct DemoApp {
    root: PathBuf,
    window: Option<WinitWindow>,
    demo: Option<Demo>,
    last_frame: Instant,
    error: Option<anyhow::Error>,
}

impl DemoApp {
    /// `root` is the directory holding `assets/`.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            window: None,
            demo: None,
            last_frame: Instant::now(),
            error: None,
        }
    }

    /// The error that stopped the event loop, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.error = Some(error);
        event_loop.exit();
    }
}

impl Drop for DemoApp {
    fn drop(&mut self) {
        if let Some(mut demo) = self.demo.take() {
            log::info!("Shutting down the demo...");
            demo.shutdown();
        }
    }
}

impl ApplicationHandler for DemoApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        log::info!("Application resumed. Initializing window and renderer...");

        let window = match WinitWindowBuilder::new().with_title("Ember").build(event_loop) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e.into()),
        };
        match Demo::new(&window, &self.root) {
            Ok(demo) => self.demo = Some(demo),
            Err(e) => return self.fail(event_loop, e.context("failed to start the demo")),
        }
        self.window = Some(window);
        self.last_frame = Instant::now();
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, id: WindowId, event: WindowEvent) {
        let (Some(window), Some(demo)) = (self.window.as_ref(), self.demo.as_mut()) else {
            return;
        };
        if window.id() != id {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Shutdown requested, exiting event loop...");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if (size.width, size.height) != demo.system.device().surface_size() {
                    log::warn!(
                        "Window resized to {}x{}; frame targets keep their size.",
                        size.width,
                        size.height
                    );
                }
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = now.duration_since(self.last_frame).as_secs_f32();
                self.last_frame = now;

                if let Err(e) = demo.frame(dt) {
                    return self.fail(event_loop, e.into());
                }
                if let Some(title) = demo.title(dt) {
                    window.set_title(&title);
                }
            }
            _ => {
                let Some(input) = translate_winit_input(&event) else {
                    return;
                };
                if let Some(command) = demo.controls.handle(&input, &mut demo.camera) {
                    log::debug!("Command: {:?}", command);
                    if !demo.run_command(command) {
                        event_loop.exit();
                    }
                }
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}
