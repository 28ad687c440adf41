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

use ember_core::math::{LinearRgba, Mat4, Vec3};
use ember_core::renderer::api::*;
use ember_core::renderer::traits::{
    CommandEncoder, CompiledProgram, CompiledShader, ComputePass, ComputeShaderRequest,
    GpuProfiler, GraphicsDevice, GraphicsShaderRequest, RenderPass, ShaderCompiler,
    TimestampReadback,
};
use ember_core::renderer::{Material, RenderError, ResourceError, MAX_LIGHTS_IN_SCENE};
use ember_data::{Entity, MeshData, MeshVertex, ProceduralConfig, SceneConfig, SceneState};
use ember_infra::graphics::shader::preprocess;
use ember_lanes::shaders::{builtin_shaders, builtin_source, POLYGONIZE};
use ember_lanes::timing::FRAME_MARKERS;
use ember_lanes::{FramePipeline, FramePipelineConfig, TileLightsLane};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use std::any::Any;
use std::collections::HashSet;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
enum Cmd {
    BeginRender(String),
    BeginCompute(String),
    RenderPipeline(RenderPipelineId),
    ComputePipeline(ComputePipelineId),
    BindGroup(u32, BindGroupId, Vec<u32>),
    Draw(Range<u32>, Range<u32>),
    DrawIndexed(Range<u32>),
    DrawIndirect(BufferId),
    Dispatch(u32, u32, u32),
    Timestamp(usize, u32),
    Resolve(usize),
    Submit,
}

type CommandLog = Arc<Mutex<Vec<Cmd>>>;

/// A device that hands out fresh ids and records everything the lanes do.
#[derive(Debug, Default)]
struct RecordingDevice {
    next_id: AtomicUsize,
    commands: CommandLog,
    writes: Mutex<Vec<(BufferId, u64, usize)>>,
    buffer_labels: Mutex<Vec<(BufferId, String)>>,
    render_pipelines: AtomicUsize,
    compute_pipelines: AtomicUsize,
    destroyed_compute_pipelines: AtomicUsize,
    presents: AtomicUsize,
    fail_present: AtomicBool,
    fail_acquire: AtomicBool,
    fail_writes: AtomicBool,
}

impl RecordingDevice {
    fn id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn buffer(&self, descriptor: &BufferDescriptor) -> BufferId {
        let id = BufferId(self.id());
        let label = descriptor.label.as_deref().unwrap_or_default().to_string();
        self.buffer_labels.lock().unwrap().push((id, label));
        id
    }

    fn commands(&self) -> Vec<Cmd> {
        self.commands.lock().unwrap().clone()
    }

    fn clear_log(&self) {
        self.commands.lock().unwrap().clear();
        self.writes.lock().unwrap().clear();
    }

    fn writes_to(&self, buffer: BufferId) -> Vec<(u64, usize)> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == buffer)
            .map(|(_, offset, len)| (*offset, *len))
            .collect()
    }

    fn has_buffer_labelled(&self, label: &str) -> bool {
        self.buffer_labels
            .lock()
            .unwrap()
            .iter()
            .any(|(_, l)| l == label)
    }
}

struct RecordingEncoder {
    log: CommandLog,
}

struct RecordingPass {
    log: CommandLog,
}

impl RecordingPass {
    fn push(&self, cmd: Cmd) {
        self.log.lock().unwrap().push(cmd);
    }
}

impl RenderPass for RecordingPass {
    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.push(Cmd::RenderPipeline(pipeline));
    }
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId, offsets: &[u32]) {
        self.push(Cmd::BindGroup(index, bind_group, offsets.to_vec()));
    }
    fn set_vertex_buffer(&mut self, _slot: u32, _buffer: BufferId, _offset: u64) {}
    fn set_index_buffer(&mut self, _buffer: BufferId, _offset: u64, _format: IndexFormat) {}
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.push(Cmd::Draw(vertices, instances));
    }
    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, _instances: Range<u32>) {
        self.push(Cmd::DrawIndexed(indices));
    }
    fn draw_indexed_indirect(&mut self, indirect_buffer: BufferId, _indirect_offset: u64) {
        self.push(Cmd::DrawIndirect(indirect_buffer));
    }
}

impl ComputePass for RecordingPass {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.push(Cmd::ComputePipeline(pipeline));
    }
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupId) {
        self.push(Cmd::BindGroup(index, bind_group, Vec::new()));
    }
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.push(Cmd::Dispatch(x, y, z));
    }
}

impl CommandEncoder for RecordingEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass + 'encoder> {
        let label = descriptor.label.unwrap_or_default().to_string();
        self.log.lock().unwrap().push(Cmd::BeginRender(label));
        Box::new(RecordingPass {
            log: self.log.clone(),
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass + 'encoder> {
        let label = descriptor.label.unwrap_or_default().to_string();
        self.log.lock().unwrap().push(Cmd::BeginCompute(label));
        Box::new(RecordingPass {
            log: self.log.clone(),
        })
    }

    fn write_timestamp(&mut self, _profiler: &dyn GpuProfiler, slot: usize, marker: u32) {
        self.log.lock().unwrap().push(Cmd::Timestamp(slot, marker));
    }

    fn copy_buffer_to_buffer(&mut self, _: BufferId, _: u64, _: BufferId, _: u64, _: u64) {}

    fn finish(self: Box<Self>) -> CommandBufferId {
        CommandBufferId(0)
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_shader_module(
        &self,
        _descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        Ok(ShaderModuleId(self.id()))
    }

    fn destroy_shader_module(&self, _id: ShaderModuleId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        Ok(BindGroupLayoutId(self.id()))
    }

    fn create_bind_group(
        &self,
        _descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        Ok(BindGroupId(self.id()))
    }

    fn destroy_bind_group(&self, _id: BindGroupId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_pipeline_layout(
        &self,
        _descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        Ok(PipelineLayoutId(self.id()))
    }

    fn create_render_pipeline(
        &self,
        _descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        self.render_pipelines.fetch_add(1, Ordering::SeqCst);
        Ok(RenderPipelineId(self.id()))
    }

    fn destroy_render_pipeline(&self, _id: RenderPipelineId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_compute_pipeline(
        &self,
        _descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        self.compute_pipelines.fetch_add(1, Ordering::SeqCst);
        Ok(ComputePipelineId(self.id()))
    }

    fn destroy_compute_pipeline(&self, _id: ComputePipelineId) -> Result<(), ResourceError> {
        self.destroyed_compute_pipelines.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        Ok(self.buffer(descriptor))
    }

    fn create_buffer_with_data(
        &self,
        descriptor: &BufferDescriptor,
        _data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        Ok(self.buffer(descriptor))
    }

    fn destroy_buffer(&self, _id: BufferId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ResourceError::BackendError("queue lost".into()));
        }
        self.writes.lock().unwrap().push((id, offset, data.len()));
        Ok(())
    }

    fn create_texture(&self, _descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        Ok(TextureId(self.id()))
    }

    fn destroy_texture(&self, _id: TextureId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_texture_view(&self, _texture_id: TextureId) -> Result<TextureViewId, ResourceError> {
        Ok(TextureViewId(self.id()))
    }

    fn destroy_texture_view(&self, _id: TextureViewId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(RecordingEncoder {
            log: self.commands.clone(),
        })
    }

    fn submit_command_buffer(&self, _command_buffer: CommandBufferId) {
        self.commands.lock().unwrap().push(Cmd::Submit);
    }

    fn acquire_surface_view(&self) -> Result<TextureViewId, RenderError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(RenderError::SurfaceAcquisitionFailed("outdated".into()));
        }
        Ok(TextureViewId(usize::MAX))
    }

    fn present_surface(&self) -> Result<(), RenderError> {
        if self.fail_present.load(Ordering::SeqCst) {
            return Err(RenderError::PresentFailed("surface lost".into()));
        }
        self.presents.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resize_surface(&self, _width: u32, _height: u32) {}

    fn set_vsync(&self, _enabled: bool) {}

    fn get_surface_format(&self) -> Option<TextureFormat> {
        Some(TextureFormat::Bgra8UnormSrgb)
    }

    fn surface_size(&self) -> (u32, u32) {
        (1280, 720)
    }

    fn supports_feature(&self, _feature_name: &str) -> bool {
        false
    }
}

/// A program request as a lane issued it.
#[derive(Debug, Clone)]
struct Request {
    path: String,
    defines: Vec<ShaderDefine>,
    prelude: Option<String>,
}

/// Compiles everything except generators containing `BROKEN`, or nothing
/// at all while `fail_all` is set. Records every request.
#[derive(Debug, Default)]
struct MockCompiler {
    next_module: AtomicUsize,
    compute_requests: Mutex<Vec<Request>>,
    graphics_requests: Mutex<Vec<Request>>,
    fail_all: AtomicBool,
}

impl MockCompiler {
    fn generator_compiles(&self) -> usize {
        self.compute_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == POLYGONIZE)
            .count()
    }

    fn total_requests(&self) -> usize {
        self.compute_requests.lock().unwrap().len() + self.graphics_requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<Request> {
        let mut all = self.compute_requests.lock().unwrap().clone();
        all.extend(self.graphics_requests.lock().unwrap().iter().cloned());
        all
    }
}

impl ShaderCompiler for MockCompiler {
    fn compile_compute(
        &self,
        _device: &dyn GraphicsDevice,
        request: &ComputeShaderRequest<'_>,
    ) -> Option<CompiledShader> {
        self.compute_requests.lock().unwrap().push(Request {
            path: request.path.to_string(),
            defines: request.defines.to_vec(),
            prelude: request.prelude.map(str::to_string),
        });
        if self.fail_all.load(Ordering::SeqCst)
            || request.prelude.is_some_and(|p| p.contains("BROKEN"))
        {
            return None;
        }
        Some(CompiledShader {
            module: ShaderModuleId(self.next_module.fetch_add(1, Ordering::SeqCst)),
            entry_point: request.entry_point.to_string(),
        })
    }

    fn compile_graphics(
        &self,
        _device: &dyn GraphicsDevice,
        request: &GraphicsShaderRequest<'_>,
    ) -> Option<CompiledProgram> {
        self.graphics_requests.lock().unwrap().push(Request {
            path: request.path.to_string(),
            defines: request.defines.to_vec(),
            prelude: None,
        });
        if self.fail_all.load(Ordering::SeqCst) {
            return None;
        }
        Some(CompiledProgram {
            module: ShaderModuleId(self.next_module.fetch_add(1, Ordering::SeqCst)),
            vertex_entry_point: request.vertex_entry_point.to_string(),
            fragment_entry_point: request.fragment_entry_point.map(str::to_string),
        })
    }
}

/// A profiler whose slots never come back; it only tracks submissions.
struct RingProfiler {
    submitted: Arc<Mutex<Vec<usize>>>,
}

impl GpuProfiler for RingProfiler {
    fn ring_size(&self) -> usize {
        3
    }
    fn markers_per_frame(&self) -> u32 {
        FRAME_MARKERS
    }
    fn resolve(&self, encoder: &mut dyn CommandEncoder, slot: usize) {
        if let Some(encoder) = encoder.as_any_mut().downcast_mut::<RecordingEncoder>() {
            encoder.log.lock().unwrap().push(Cmd::Resolve(slot));
        }
    }
    fn after_submit(&mut self, slot: usize) {
        self.submitted.lock().unwrap().push(slot);
    }
    fn poll(&self) {}
    fn read_slot(&mut self, _slot: usize) -> TimestampReadback {
        TimestampReadback::Empty
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

const GENERATOR: &str = "fn sample_field(p: vec3<f32>) -> f32 { return length(p) - 0.5; }";

/// A complete generator prelude: a pulsing sphere.
const SPHERE_FIELD: &str =
    "fn generate(p: vec3<f32>, time: vec4<f32>) -> f32 { return length(p) - 0.5 - 0.1 * sin(time.x); }";

fn config() -> FramePipelineConfig {
    FramePipelineConfig::default()
}

fn view() -> Mat4 {
    Mat4::look_at_rh(Vec3::new(0.0, 0.0, -4.0), Vec3::new(0.0, 0.0, 5.0), Vec3::Y).unwrap()
}

fn empty_scene() -> SceneState {
    let scene_config = SceneConfig {
        procedurals: Vec::new(),
        ..SceneConfig::default()
    };
    SceneState::new(&scene_config, config().projection().unwrap()).unwrap()
}

fn triangle() -> [MeshVertex; 3] {
    [
        MeshVertex::new([-1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 0.0]),
        MeshVertex::new([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0]),
        MeshVertex::new([0.0, 1.0, 0.0], [0.0, 0.0, -1.0], [0.5, 1.0]),
    ]
}

/// A mesh whose alpha-tested subset comes first in the index buffer.
fn alpha_first_mesh() -> MeshData {
    let mut data = MeshData::default();
    data.push_subset(
        &triangle(),
        &[0, 1, 2],
        Material::opaque(LinearRgba::WHITE).with_alpha_cutoff(0.5),
    );
    data.push_subset(&triangle(), &[0, 1, 2], Material::opaque(LinearRgba::WHITE));
    data
}

fn opaque_mesh() -> MeshData {
    let mut data = MeshData::default();
    data.push_subset(&triangle(), &[0, 1, 2], Material::opaque(LinearRgba::WHITE));
    data
}

fn glossy_mesh() -> MeshData {
    let mut data = MeshData::default();
    data.push_subset(
        &triangle(),
        &[0, 1, 2],
        Material::opaque(LinearRgba::WHITE).with_specular_power(64.0),
    );
    data
}

fn procedural(path: &str, dynamic: bool) -> ProceduralConfig {
    ProceduralConfig {
        generator_path: path.into(),
        dynamic,
        ..ProceduralConfig::default()
    }
}

fn pipeline(device: &RecordingDevice, compiler: &MockCompiler, scene: &SceneState) -> FramePipeline {
    FramePipeline::new(device, compiler, scene, &config(), None).unwrap()
}

fn frame(
    pipeline: &mut FramePipeline,
    device: &RecordingDevice,
    compiler: &MockCompiler,
    scene: &mut SceneState,
) -> Result<(), RenderError> {
    scene.update(1.0 / 60.0, view());
    pipeline.render_frame(device, compiler, scene, &view(), Vec3::new(0.0, 0.0, -4.0), 1.0 / 60.0)
}

fn pass_labels(commands: &[Cmd]) -> Vec<String> {
    commands
        .iter()
        .filter_map(|cmd| match cmd {
            Cmd::BeginRender(label) | Cmd::BeginCompute(label) => Some(label.clone()),
            _ => None,
        })
        .collect()
}

/// The commands recorded inside every pass labelled `label`.
fn section(commands: &[Cmd], label: &str) -> Vec<Cmd> {
    let mut inside = false;
    let mut out = Vec::new();
    for cmd in commands {
        match cmd {
            Cmd::BeginRender(l) | Cmd::BeginCompute(l) => inside = l == label,
            Cmd::Submit | Cmd::Timestamp(..) | Cmd::Resolve(_) => inside = false,
            other if inside => out.push(other.clone()),
            _ => {}
        }
    }
    out
}

fn dispatches(commands: &[Cmd]) -> Vec<(u32, u32, u32)> {
    commands
        .iter()
        .filter_map(|cmd| match cmd {
            Cmd::Dispatch(x, y, z) => Some((*x, *y, *z)),
            _ => None,
        })
        .collect()
}

fn indexed_draws(commands: &[Cmd]) -> Vec<Range<u32>> {
    commands
        .iter()
        .filter_map(|cmd| match cmd {
            Cmd::DrawIndexed(range) => Some(range.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn lanes_run_in_order_and_the_frame_is_presented_once() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    scene
        .spawn_procedural(&device, &procedural("blob.wgsl", true), GENERATOR.into())
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);

    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();

    let commands = device.commands();
    assert_eq!(
        pass_labels(&commands),
        ["Clear", "Polygonize", "Z prepass", "Tile lights", "Forward"]
    );
    assert_eq!(commands.last(), Some(&Cmd::Submit));
    assert_eq!(device.presents.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.timer().frame(), 1);
}

#[test]
fn polygonize_records_init_generate_finalize_once_per_queued_mesh() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let id = scene
        .spawn_procedural(&device, &procedural("static.wgsl", false), GENERATOR.into())
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);

    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let commands = device.commands();
    assert_eq!(
        dispatches(&section(&commands, "Polygonize")),
        [(1, 1, 1), (10, 10, 10), (1, 1, 1)]
    );
    assert!(scene.regeneration_queue().is_empty());

    let indirect = scene.generated_mesh(id).unwrap().indirect_buffer;
    assert!(section(&commands, "Forward").contains(&Cmd::DrawIndirect(indirect)));
    assert!(section(&commands, "Z prepass").contains(&Cmd::DrawIndirect(indirect)));

    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let commands = device.commands();
    assert!(!pass_labels(&commands).contains(&"Polygonize".to_string()));
    assert!(section(&commands, "Forward").contains(&Cmd::DrawIndirect(indirect)));
}

#[test]
fn generator_programs_compile_once_per_source_and_failures_are_retried() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    for path in ["a.wgsl", "b.wgsl"] {
        scene
            .spawn_procedural(&device, &procedural(path, false), GENERATOR.into())
            .unwrap();
    }
    let broken = scene
        .spawn_procedural(
            &device,
            &procedural("broken.wgsl", false),
            "BROKEN".to_string(),
        )
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);
    let generated = |device: &RecordingDevice| {
        dispatches(&section(&device.commands(), "Polygonize"))
            .iter()
            .filter(|d| **d == (10, 10, 10))
            .count()
    };

    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert_eq!(compiler.generator_compiles(), 2);
    assert_eq!(generated(&device), 2);
    assert_eq!(scene.regeneration_queue(), [broken]);

    // The broken static mesh stays queued and its generator is compiled again.
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert_eq!(compiler.generator_compiles(), 3);
    assert_eq!(generated(&device), 0);
    assert_eq!(scene.regeneration_queue(), [broken]);

    let sources = |path: &Path| -> std::io::Result<String> {
        Ok(if path == Path::new("broken.wgsl") {
            "BROKEN".to_string()
        } else {
            GENERATOR.to_string()
        })
    };
    scene.reload_procedural_with(sources);
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert_eq!(compiler.generator_compiles(), 4);
    assert_eq!(generated(&device), 2);

    // The old text is no longer used by any mesh, so its program is released.
    let destroyed = device.destroyed_compute_pipelines.load(Ordering::SeqCst);
    scene.reload_procedural_with(|_| Ok(format!("{GENERATOR}\n// fixed")));
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert_eq!(compiler.generator_compiles(), 5);
    assert_eq!(generated(&device), 3);
    assert_eq!(
        device.destroyed_compute_pipelines.load(Ordering::SeqCst),
        destroyed + 1
    );
    assert!(scene.regeneration_queue().is_empty());
}

#[test]
fn debug_routine_replaces_shading_without_reinitializing_lanes() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mesh = scene.add_mesh(&device, &opaque_mesh(), "tri").unwrap();
    scene
        .spawn_entity(Entity::new(mesh, Vec3::new(0.0, 0.0, 20.0)))
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();

    let requests = compiler.total_requests();
    let render_pipelines = device.render_pipelines.load(Ordering::SeqCst);
    let compute_pipelines = device.compute_pipelines.load(Ordering::SeqCst);

    assert!(pipeline.toggle_routine());
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let labels = pass_labels(&device.commands());
    assert!(labels.contains(&"Debug lights".to_string()));
    assert!(!labels.contains(&"Forward".to_string()));
    assert_eq!(
        section(&device.commands(), "Debug lights")
            .iter()
            .filter(|c| matches!(c, Cmd::Draw(..)))
            .count(),
        1
    );

    assert!(!pipeline.toggle_routine());
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert!(pass_labels(&device.commands()).contains(&"Forward".to_string()));

    assert_eq!(compiler.total_requests(), requests);
    assert_eq!(device.render_pipelines.load(Ordering::SeqCst), render_pipelines);
    assert_eq!(device.compute_pipelines.load(Ordering::SeqCst), compute_pipelines);
}

#[test]
fn lane_failures_are_logged_but_a_present_failure_is_fatal() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mut pipeline = pipeline(&device, &compiler, &scene);

    let missing = MAX_LIGHTS_IN_SCENE as usize - scene.total_light_count();
    for _ in 0..missing {
        scene.fire_light(Vec3::ZERO, Vec3::Z);
    }
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let commands = device.commands();
    assert_eq!(dispatches(&section(&commands, "Tile lights")), [(160, 90, 1)]);
    assert_eq!(commands.last(), Some(&Cmd::Submit));

    device.fail_present.store(true, Ordering::SeqCst);
    let result = frame(&mut pipeline, &device, &compiler, &mut scene);
    assert!(matches!(result, Err(RenderError::PresentFailed(_))));
}

#[test]
fn a_failed_frame_uniform_write_still_presents_the_frame() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mut pipeline = pipeline(&device, &compiler, &scene);

    device.fail_writes.store(true, Ordering::SeqCst);
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let commands = device.commands();
    assert!(pass_labels(&commands).contains(&"Forward".to_string()));
    assert_eq!(commands.last(), Some(&Cmd::Submit));
    assert_eq!(device.presents.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.timer().frame(), 1);
}

#[test]
fn an_unavailable_surface_skips_the_frame() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mut pipeline = pipeline(&device, &compiler, &scene);

    device.fail_acquire.store(true, Ordering::SeqCst);
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert!(device.commands().is_empty());
    assert_eq!(pipeline.timer().frame(), 0);
}

#[test]
fn moving_lights_are_written_after_the_static_region() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mut pipeline = pipeline(&device, &compiler, &scene);
    let point_lights = pipeline.resources().point_lights;
    let static_count = scene.static_lights().len() as u64;

    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert!(device.writes_to(point_lights).is_empty());

    scene.fire_light(Vec3::ZERO, Vec3::Z);
    scene.fire_light(Vec3::ZERO, Vec3::X);
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert_eq!(device.writes_to(point_lights), [(static_count * 32, 64)]);
}

#[test]
fn a_full_light_buffer_is_rejected_before_anything_is_written() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let pipeline = pipeline(&device, &compiler, &scene);
    let resources = pipeline.resources();

    for _ in 0..(MAX_LIGHTS_IN_SCENE as usize - scene.total_light_count()) {
        scene.fire_light(Vec3::ZERO, Vec3::Z);
    }
    device.clear_log();
    let result = TileLightsLane::upload_lights(&device, resources, &scene);
    assert!(matches!(
        result,
        Err(RenderError::TooManyLights {
            requested: 1000,
            capacity: 1000
        })
    ));
    assert!(device.writes_to(resources.point_lights).is_empty());
    assert!(device.writes_to(resources.tiling_uniforms).is_empty());
}

#[test]
fn alpha_tested_subsets_draw_last_and_stay_out_of_the_prepass() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mesh = scene.add_mesh(&device, &alpha_first_mesh(), "quad").unwrap();
    scene
        .spawn_entity(Entity::new(mesh, Vec3::new(0.0, 0.0, 20.0)))
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);

    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let commands = device.commands();
    assert_eq!(indexed_draws(&section(&commands, "Forward")), [3..6, 0..3]);
    assert_eq!(indexed_draws(&section(&commands, "Z prepass")), [3..6]);
}

#[test]
fn object_uniform_arena_grows_past_its_first_chunk() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mesh = scene.add_mesh(&device, &opaque_mesh(), "tri").unwrap();
    for _ in 0..1100 {
        scene
            .spawn_entity(Entity::new(mesh, Vec3::new(0.0, 0.0, 20.0)))
            .unwrap();
    }
    let mut pipeline = pipeline(&device, &compiler, &scene);
    assert!(!device.has_buffer_labelled("Forward objects [chunk 1]"));

    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert!(device.has_buffer_labelled("Forward objects [chunk 1]"));
    assert_eq!(indexed_draws(&section(&device.commands(), "Forward")).len(), 1100);

    let object_groups: HashSet<_> = section(&device.commands(), "Forward")
        .iter()
        .filter_map(|cmd| match cmd {
            Cmd::BindGroup(1, group, _) => Some(*group),
            _ => None,
        })
        .collect();
    assert_eq!(object_groups.len(), 2);
}

#[test]
fn timestamps_bracket_every_lane_and_the_slot_is_reported_submitted() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let submitted = Arc::new(Mutex::new(Vec::new()));
    let profiler = RingProfiler {
        submitted: submitted.clone(),
    };
    let mut pipeline =
        FramePipeline::new(&device, &compiler, &scene, &config(), Some(Box::new(profiler)))
            .unwrap();

    for _ in 0..2 {
        frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    }
    let stamps: Vec<_> = device
        .commands()
        .into_iter()
        .filter(|cmd| matches!(cmd, Cmd::Timestamp(..) | Cmd::Resolve(_)))
        .collect();
    let mut expected: Vec<_> = (0..FRAME_MARKERS).map(|m| Cmd::Timestamp(0, m)).collect();
    expected.push(Cmd::Resolve(0));
    expected.extend((0..FRAME_MARKERS).map(|m| Cmd::Timestamp(1, m)));
    expected.push(Cmd::Resolve(1));
    assert_eq!(stamps, expected);
    assert_eq!(*submitted.lock().unwrap(), [0, 1]);
}

#[test]
fn failed_shading_reload_keeps_the_previous_programs() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    let mesh = scene.add_mesh(&device, &opaque_mesh(), "tri").unwrap();
    scene
        .spawn_entity(Entity::new(mesh, Vec3::new(0.0, 0.0, 20.0)))
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();

    compiler.fail_all.store(true, Ordering::SeqCst);
    assert!(pipeline.reinit_shading(&device, &compiler, &scene).is_err());
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    let commands = device.commands();
    assert_eq!(indexed_draws(&section(&commands, "Forward")).len(), 1);
    assert_eq!(indexed_draws(&section(&commands, "Z prepass")).len(), 1);

    compiler.fail_all.store(false, Ordering::SeqCst);
    assert!(pipeline.reinit_shading(&device, &compiler, &scene).is_ok());
    device.clear_log();
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert_eq!(indexed_draws(&section(&device.commands(), "Forward")).len(), 1);
}

#[test]
fn wireframe_stays_off_without_line_rasterization() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let scene = empty_scene();
    let mut pipeline = pipeline(&device, &compiler, &scene);
    assert!(!pipeline.set_wireframe(true));
    assert!(!pipeline.toggle_wireframe());
    assert!(!pipeline.wireframe());
}

#[test]
fn every_requested_program_preprocesses_and_validates() {
    let device = RecordingDevice::default();
    let compiler = MockCompiler::default();
    let mut scene = empty_scene();
    for data in [alpha_first_mesh(), glossy_mesh()] {
        let mesh = scene.add_mesh(&device, &data, "mesh").unwrap();
        scene
            .spawn_entity(Entity::new(mesh, Vec3::new(0.0, 0.0, 20.0)))
            .unwrap();
    }
    scene
        .spawn_procedural(&device, &procedural("sphere.wgsl", true), SPHERE_FIELD.into())
        .unwrap();
    let mut pipeline = pipeline(&device, &compiler, &scene);
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();
    assert!(pipeline.toggle_routine());
    assert!(pipeline.toggle_tile_debug());
    assert!(pipeline.tile_debug());
    frame(&mut pipeline, &device, &compiler, &mut scene).unwrap();

    let requests = compiler.requests();
    for request in &requests {
        let path = request.path.as_str();
        let file = builtin_source(path).unwrap_or_else(|| panic!("{path} is not built in"));
        let text = match &request.prelude {
            Some(prelude) => format!("{prelude}\n{file}"),
            None => file.to_string(),
        };
        let source = preprocess(&text, &request.defines, path)
            .unwrap_or_else(|e| panic!("{path}: {e}"));
        let module = naga::front::wgsl::parse_str(&source)
            .unwrap_or_else(|e| panic!("{path}: {}", e.emit_to_string(&source)));
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .unwrap_or_else(|e| panic!("{path}: {}", e.emit_to_string(&source)));
    }

    for (path, _) in builtin_shaders() {
        assert!(
            requests.iter().any(|r| r.path == *path),
            "{path} was never requested"
        );
    }
    let forward_variants: HashSet<Vec<String>> = requests
        .iter()
        .filter(|r| r.path == ember_lanes::shaders::FORWARD)
        .map(|r| r.defines.iter().map(|d| d.name.to_string()).collect())
        .collect();
    assert!(forward_variants.len() >= 3, "{forward_variants:?}");
}
