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

use ember_core::renderer::{
    BindGroupDescriptor, BindGroupId, BindGroupLayoutDescriptor, BindGroupLayoutId,
    BufferDescriptor, BufferId, CommandBufferId, CommandEncoder, ComputePipelineDescriptor,
    ComputePipelineId, ComputeShaderRequest, GraphicsDevice, GraphicsShaderRequest,
    PipelineLayoutDescriptor, PipelineLayoutId, RenderError, RenderPipelineDescriptor,
    RenderPipelineId, ResourceError, ShaderCompiler, ShaderDefine, ShaderModuleDescriptor,
    ShaderModuleId, ShaderSourceData, TextureDescriptor, TextureFormat, TextureId, TextureViewId,
};
use ember_infra::WgslShaderCompiler;
use std::sync::Mutex;
use tempfile::tempdir;

/// A device that only records the shader modules it is asked to create.
#[derive(Debug, Default)]
struct ShaderRecordingDevice {
    modules: Mutex<Vec<(String, String)>>,
}

impl ShaderRecordingDevice {
    fn modules(&self) -> Vec<(String, String)> {
        self.modules.lock().unwrap().clone()
    }
}

impl GraphicsDevice for ShaderRecordingDevice {
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        let ShaderSourceData::Wgsl(source) = &descriptor.source;
        let mut modules = self.modules.lock().unwrap();
        modules.push((
            descriptor.label.unwrap_or_default().to_string(),
            source.to_string(),
        ));
        Ok(ShaderModuleId(modules.len()))
    }

    fn destroy_shader_module(&self, _id: ShaderModuleId) -> Result<(), ResourceError> {
        Ok(())
    }

    fn create_bind_group_layout(
        &self,
        _descriptor: &BindGroupLayoutDescriptor,
    ) -> Result<BindGroupLayoutId, ResourceError> {
        unimplemented!()
    }

    fn create_bind_group(
        &self,
        _descriptor: &BindGroupDescriptor,
    ) -> Result<BindGroupId, ResourceError> {
        unimplemented!()
    }

    fn destroy_bind_group(&self, _id: BindGroupId) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn create_pipeline_layout(
        &self,
        _descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        unimplemented!()
    }

    fn create_render_pipeline(
        &self,
        _descriptor: &RenderPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        unimplemented!()
    }

    fn destroy_render_pipeline(&self, _id: RenderPipelineId) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn create_compute_pipeline(
        &self,
        _descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        unimplemented!()
    }

    fn destroy_compute_pipeline(&self, _id: ComputePipelineId) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn create_buffer(&self, _descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        unimplemented!()
    }

    fn create_buffer_with_data(
        &self,
        _descriptor: &BufferDescriptor,
        _data: &[u8],
    ) -> Result<BufferId, ResourceError> {
        unimplemented!()
    }

    fn destroy_buffer(&self, _id: BufferId) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn write_buffer(&self, _id: BufferId, _offset: u64, _data: &[u8]) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn create_texture(&self, _descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        unimplemented!()
    }

    fn destroy_texture(&self, _id: TextureId) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn create_texture_view(&self, _texture_id: TextureId) -> Result<TextureViewId, ResourceError> {
        unimplemented!()
    }

    fn destroy_texture_view(&self, _id: TextureViewId) -> Result<(), ResourceError> {
        unimplemented!()
    }

    fn create_command_encoder(&self, _label: Option<&str>) -> Box<dyn CommandEncoder> {
        unimplemented!()
    }

    fn submit_command_buffer(&self, _command_buffer: CommandBufferId) {
        unimplemented!()
    }

    fn acquire_surface_view(&self) -> Result<TextureViewId, RenderError> {
        unimplemented!()
    }

    fn present_surface(&self) -> Result<(), RenderError> {
        unimplemented!()
    }

    fn resize_surface(&self, _width: u32, _height: u32) {}

    fn set_vsync(&self, _enabled: bool) {}

    fn get_surface_format(&self) -> Option<TextureFormat> {
        None
    }

    fn surface_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn supports_feature(&self, _feature_name: &str) -> bool {
        false
    }
}

const TILED: &str = "\
@compute @workgroup_size(TILE_SIZE, TILE_SIZE, 1)
fn cs_main() {
#ifdef DEBUG_COUNTS
    debug();
#endif
}
";

fn compute_request<'a>(
    path: &'a str,
    defines: &'a [ShaderDefine],
    prelude: Option<&'a str>,
) -> ComputeShaderRequest<'a> {
    ComputeShaderRequest {
        path,
        entry_point: "cs_main",
        defines,
        prelude,
    }
}

#[test]
fn registered_source_is_preprocessed_and_labelled() {
    let device = ShaderRecordingDevice::default();
    let compiler = WgslShaderCompiler::new();
    compiler.register("tile_lights.wgsl", TILED);
    assert!(compiler.is_registered("tile_lights.wgsl"));

    let defines = [ShaderDefine::value("TILE_SIZE", 8)];
    let shader = compiler
        .compile_compute(&device, &compute_request("tile_lights.wgsl", &defines, None))
        .expect("registered source compiles");
    assert_eq!(shader.entry_point, "cs_main");

    let modules = device.modules();
    assert_eq!(modules.len(), 1);
    let (label, source) = &modules[0];
    assert_eq!(label, "tile_lights.wgsl:cs_main");
    assert!(source.contains("@workgroup_size(8, 8, 1)"));
    assert!(!source.contains("debug();"));
    assert_eq!(source.lines().count(), TILED.lines().count());
}

#[test]
fn prelude_is_prepended_and_sees_the_defines() {
    let device = ShaderRecordingDevice::default();
    let compiler = WgslShaderCompiler::new();
    compiler.register("polygonize.wgsl", "fn main() { let v = generate(); }\n");

    let prelude = "fn generate() -> f32 { return SCALE; }";
    let defines = [ShaderDefine::value("SCALE", "2.0")];
    compiler
        .compile_compute(
            &device,
            &compute_request("polygonize.wgsl", &defines, Some(prelude)),
        )
        .expect("prelude compiles");

    let (_, source) = &device.modules()[0];
    assert!(source.starts_with("fn generate() -> f32 { return 2.0; }\n"));
    assert!(source.contains("let v = generate();"));
}

#[test]
fn unknown_path_without_root_yields_none() {
    let device = ShaderRecordingDevice::default();
    let compiler = WgslShaderCompiler::new();
    assert!(compiler
        .compile_compute(&device, &compute_request("missing.wgsl", &[], None))
        .is_none());
    assert!(device.modules().is_empty());
}

#[test]
fn preprocessor_errors_yield_none() {
    let device = ShaderRecordingDevice::default();
    let compiler = WgslShaderCompiler::new();
    compiler.register("broken.wgsl", "#ifdef A\nfn x() {}\n");
    assert!(compiler
        .compile_compute(&device, &compute_request("broken.wgsl", &[], None))
        .is_none());
    assert!(device.modules().is_empty());
}

#[test]
fn graphics_programs_keep_both_entry_points() {
    let device = ShaderRecordingDevice::default();
    let compiler = WgslShaderCompiler::new();
    compiler.register(
        "forward.wgsl",
        "#ifdef ALPHA_MASK\nfn masked() {}\n#endif\nfn vs_main() {}\nfn fs_main() {}\n",
    );

    let defines = [ShaderDefine::flag("ALPHA_MASK")];
    let program = compiler
        .compile_graphics(
            &device,
            &GraphicsShaderRequest {
                path: "forward.wgsl",
                vertex_entry_point: "vs_main",
                fragment_entry_point: Some("fs_main"),
                defines: &defines,
            },
        )
        .expect("graphics program compiles");
    assert_eq!(program.vertex_entry_point, "vs_main");
    assert_eq!(program.fragment_entry_point.as_deref(), Some("fs_main"));

    let (label, source) = &device.modules()[0];
    assert_eq!(label, "forward.wgsl:vs_main");
    assert!(source.contains("fn masked() {}"));
}

#[test]
fn files_under_the_root_are_loaded_and_registered_sources_win() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("generators")).unwrap();
    std::fs::write(root.join("generators/blob.wgsl"), "fn from_disk() {}\n").unwrap();
    std::fs::write(root.join("shadowed.wgsl"), "fn from_disk() {}\n").unwrap();

    let device = ShaderRecordingDevice::default();
    let compiler = WgslShaderCompiler::with_root(root);
    compiler.register("shadowed.wgsl", "fn from_library() {}\n");

    compiler
        .compile_compute(&device, &compute_request("generators/blob.wgsl", &[], None))
        .expect("file under root compiles");
    compiler
        .compile_compute(&device, &compute_request("shadowed.wgsl", &[], None))
        .expect("registered source compiles");
    assert!(compiler
        .compile_compute(&device, &compute_request("absent.wgsl", &[], None))
        .is_none());

    let modules = device.modules();
    assert_eq!(modules.len(), 2);
    assert!(modules[0].1.contains("from_disk"));
    assert!(modules[1].1.contains("from_library"));
}
