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

//! Forward shading of the visible scene.
//!
//! Each subset is drawn with the shader variant matching its material flags
//! and geometry kind. Variants compile lazily the first time a key is seen and
//! are cached, failures included, so a broken variant is reported once and its
//! draws are skipped. Per-draw uniforms go through a dynamic-offset arena that
//! is rewound every frame.
//!
//! Draw order is opaque mesh subsets, then procedural surfaces, then the
//! alpha-tested tail of every visible entity with depth writes off.

use crate::context::{FrameContext, LaneInitContext, RenderLane};
use crate::lanes::{
    build_render_pipeline, mesh_vertex_layout, program_failed, record_draws,
    surface_vertex_layout, DrawCall, Geometry,
};
use crate::resources::ObjectUniforms;
use crate::shaders::{forward_defines, FORWARD, LIGHT_MARKERS};
use ahash::AHashMap;
use ember_core::lane::{Lane, LaneError, LaneKind};
use ember_core::renderer::{
    ColorTargetStateDescriptor, DepthStateDescriptor, DynamicUniformArena, GraphicsDevice,
    GraphicsShaderRequest, Material, MaterialFlags, Operations, PipelineLayoutDescriptor,
    PipelineLayoutId, PolygonMode, PrimitiveStateDescriptor, RenderPassColorAttachment,
    RenderPassDepthStencilAttachment, RenderPassDescriptor, RenderPipelineDescriptor,
    RenderPipelineId, ShaderCompiler, TextureFormat, DEFAULT_MAX_ELEMENTS,
    MIN_UNIFORM_ALIGNMENT,
};
use ember_data::SceneState;
use std::borrow::Cow;
use std::mem::size_of;

/// Device feature required for line rasterization.
const POLYGON_MODE_LINE: &str = "polygon_mode_line";

/// Vertices of one light marker cube.
const MARKER_VERTICES: u32 = 36;

/// The vertex layout a variant is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    /// Static meshes with position, normal and uv.
    Mesh,
    /// Polygonized surfaces with position and normal.
    Procedural,
}

/// Everything that selects a forward shading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariantKey {
    /// Vertex layout of the geometry.
    pub geometry: GeometryKind,
    /// Material features compiled into the program.
    pub flags: MaterialFlags,
    /// Line rasterization.
    pub wireframe: bool,
}

impl VariantKey {
    /// The key of a draw of `material` over `geometry`.
    pub fn new(geometry: GeometryKind, material: &Material, wireframe: bool) -> Self {
        Self {
            geometry,
            flags: material.flags(),
            wireframe,
        }
    }

    fn label(&self) -> String {
        format!(
            "Forward {:?} flags={:#x}{}",
            self.geometry,
            self.flags.bits(),
            if self.wireframe { " wireframe" } else { "" }
        )
    }
}

#[derive(Debug)]
struct VariantCache {
    layout: PipelineLayoutId,
    color_format: TextureFormat,
    depth_format: TextureFormat,
    pipelines: AHashMap<VariantKey, Option<RenderPipelineId>>,
}

impl VariantCache {
    fn pipeline(
        &mut self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        key: VariantKey,
    ) -> Option<RenderPipelineId> {
        if let Some(cached) = self.pipelines.get(&key) {
            return *cached;
        }
        let pipeline = self.compile(device, shaders, key);
        if pipeline.is_none() {
            log::error!("Shader variant '{}' failed; its draws are skipped.", key.label());
        }
        self.pipelines.insert(key, pipeline);
        pipeline
    }

    fn compile(
        &self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        key: VariantKey,
    ) -> Option<RenderPipelineId> {
        let defines = forward_defines(key.flags);
        let (vertex_entry_point, vertex_layout, cull_mode) = match key.geometry {
            GeometryKind::Mesh => (
                "vs_main",
                mesh_vertex_layout(),
                PrimitiveStateDescriptor::default().cull_mode,
            ),
            GeometryKind::Procedural => ("vs_procedural", surface_vertex_layout(), None),
        };
        let depth = if key.flags.contains(MaterialFlags::ALPHA_MASK) {
            DepthStateDescriptor::no_write_less_equal(self.depth_format)
        } else {
            DepthStateDescriptor::write_less_equal(self.depth_format)
        };
        let color = ColorTargetStateDescriptor {
            format: self.color_format,
            blend: None,
        };
        let label = key.label();
        build_render_pipeline(
            device,
            shaders,
            &GraphicsShaderRequest {
                path: FORWARD,
                vertex_entry_point,
                fragment_entry_point: Some("fs_main"),
                defines: &defines,
            },
            |desc| RenderPipelineDescriptor {
                vertex_buffers_layout: Cow::Owned(vec![vertex_layout]),
                primitive_state: PrimitiveStateDescriptor {
                    cull_mode,
                    polygon_mode: if key.wireframe {
                        PolygonMode::Line
                    } else {
                        PolygonMode::Fill
                    },
                    ..Default::default()
                },
                depth_stencil_state: Some(depth),
                color_target_states: Cow::Owned(vec![color]),
                ..desc
            },
            self.layout,
            &label,
        )
    }

    fn clear(&mut self, device: &dyn GraphicsDevice) {
        for pipeline in self.pipelines.drain().filter_map(|(_, p)| p) {
            let _ = device.destroy_render_pipeline(pipeline);
        }
    }
}

/// Shades the visible scene into the surface.
#[derive(Debug, Default)]
pub struct DrawLane {
    variants: Option<VariantCache>,
    arena: Option<DynamicUniformArena>,
    marker_layout: Option<PipelineLayoutId>,
    markers: Option<RenderPipelineId>,
    wireframe: bool,
    wireframe_supported: bool,
    light_overlay: bool,
}

impl DrawLane {
    /// Creates an uninitialized lane.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether subsets are drawn as lines.
    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    /// Enables line rasterization when the device supports it.
    ///
    /// Returns the resulting state.
    pub fn set_wireframe(&mut self, enabled: bool) -> bool {
        if enabled && !self.wireframe_supported {
            log::warn!("Wireframe requested but the device lacks line polygon mode.");
            return self.wireframe;
        }
        self.wireframe = enabled;
        self.wireframe
    }

    /// Whether a marker is drawn at each static light.
    pub fn light_overlay(&self) -> bool {
        self.light_overlay
    }

    /// Shows or hides the static light markers.
    pub fn set_light_overlay(&mut self, enabled: bool) {
        self.light_overlay = enabled;
    }

    fn compile_markers(
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        layout: PipelineLayoutId,
        color_format: TextureFormat,
        depth_format: TextureFormat,
    ) -> Option<RenderPipelineId> {
        build_render_pipeline(
            device,
            shaders,
            &GraphicsShaderRequest {
                path: LIGHT_MARKERS,
                vertex_entry_point: "vs_main",
                fragment_entry_point: Some("fs_main"),
                defines: &[],
            },
            |desc| RenderPipelineDescriptor {
                primitive_state: PrimitiveStateDescriptor {
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil_state: Some(DepthStateDescriptor::write_less_equal(depth_format)),
                color_target_states: Cow::Owned(vec![ColorTargetStateDescriptor {
                    format: color_format,
                    blend: None,
                }]),
                ..desc
            },
            layout,
            "Light markers",
        )
    }

    fn collect_draws(
        &mut self,
        device: &dyn GraphicsDevice,
        shaders: &dyn ShaderCompiler,
        scene: &mut SceneState,
    ) -> Result<Vec<DrawCall>, LaneError> {
        let wireframe = self.wireframe;
        let (Some(variants), Some(arena)) = (self.variants.as_mut(), self.arena.as_mut()) else {
            return Err(LaneError::NotInitialized);
        };
        arena.reset();

        let opaque_counts = scene.partition_draw_list();
        let scene: &SceneState = scene;

        let mut opaque = Vec::new();
        let mut alpha = Vec::new();
        for (record, &opaque_count) in scene.draw_list().iter().zip(&opaque_counts) {
            let Some(mesh) = scene.mesh(record.mesh) else {
                continue;
            };
            for (position, &index) in record.subsets.iter().enumerate() {
                let Some(subset) = mesh.subsets.get(index) else {
                    continue;
                };
                let key = VariantKey::new(GeometryKind::Mesh, &subset.material, wireframe);
                let Some(pipeline) = variants.pipeline(device, shaders, key) else {
                    continue;
                };
                let object = arena
                    .push(
                        device,
                        bytemuck::bytes_of(&ObjectUniforms::new(&record.world, &subset.material)),
                    )
                    .map_err(LaneError::execution)?;
                let draw = DrawCall {
                    pipeline,
                    object,
                    geometry: Geometry::Indexed {
                        vertex_buffer: mesh.vertex_buffer,
                        index_buffer: mesh.index_buffer,
                        index_format: mesh.index_format,
                        indices: subset.first_index..subset.first_index + subset.index_count,
                    },
                };
                if position < opaque_count {
                    opaque.push(draw);
                } else {
                    alpha.push(draw);
                }
            }
        }

        for record in scene.procedural_draw_list() {
            let Some(mesh) = scene.generated_mesh(record.mesh) else {
                continue;
            };
            let key = VariantKey::new(GeometryKind::Procedural, &record.material, wireframe);
            let Some(pipeline) = variants.pipeline(device, shaders, key) else {
                continue;
            };
            let object = arena
                .push(
                    device,
                    bytemuck::bytes_of(&ObjectUniforms::new(&record.world, &record.material)),
                )
                .map_err(LaneError::execution)?;
            opaque.push(DrawCall {
                pipeline,
                object,
                geometry: Geometry::Indirect {
                    vertex_buffer: mesh.vertex_buffer,
                    index_buffer: mesh.index_buffer,
                    indirect_buffer: mesh.indirect_buffer,
                },
            });
        }

        opaque.append(&mut alpha);
        Ok(opaque)
    }
}

impl Lane for DrawLane {
    fn strategy_name(&self) -> &'static str {
        "Draw"
    }

    fn lane_kind(&self) -> LaneKind {
        LaneKind::Raster
    }
}

impl RenderLane for DrawLane {
    fn initialize(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let device = ctx.device;
        let resources = ctx.resources;
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Forward layout")),
                bind_group_layouts: &[resources.forward_layout, resources.object_layout],
            })
            .map_err(LaneError::initialization)?;
        let marker_layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Light markers layout")),
                bind_group_layouts: &[resources.forward_layout],
            })
            .map_err(LaneError::initialization)?;

        self.arena = Some(
            DynamicUniformArena::new(
                device,
                resources.object_layout,
                0,
                size_of::<ObjectUniforms>() as u32,
                DEFAULT_MAX_ELEMENTS,
                MIN_UNIFORM_ALIGNMENT,
                "Forward objects",
            )
            .map_err(LaneError::initialization)?,
        );
        self.variants = Some(VariantCache {
            layout,
            color_format: resources.color_format,
            depth_format: resources.depth_format,
            pipelines: AHashMap::new(),
        });
        self.marker_layout = Some(marker_layout);
        self.markers = Some(
            Self::compile_markers(
                device,
                ctx.shaders,
                marker_layout,
                resources.color_format,
                resources.depth_format,
            )
            .ok_or_else(|| program_failed("Draw", "light marker program"))?,
        );
        self.wireframe_supported = device.supports_feature(POLYGON_MODE_LINE);
        if !self.wireframe_supported {
            log::info!("Line polygon mode unavailable; wireframe is disabled.");
        }
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameContext<'_>) -> Result<(), LaneError> {
        let draws = self.collect_draws(frame.device, frame.shaders, frame.scene)?;
        let globals = frame.resources.forward_bind_group;
        let surface_view = frame.surface_view;
        let depth_view = frame.resources.depth_view;
        let marker_count = frame.resources.static_light_count;
        let markers = self.markers.filter(|_| self.light_overlay && marker_count > 0);

        let encoder = frame.encoder()?;
        let color_attachment = RenderPassColorAttachment {
            view: &surface_view,
            ops: Operations::load(),
        };
        let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Forward"),
            color_attachments: std::slice::from_ref(&color_attachment),
            depth_stencil_attachment: Some(RenderPassDepthStencilAttachment {
                view: &depth_view,
                depth_ops: Some(Operations::load()),
            }),
        });
        record_draws(pass.as_mut(), globals, &draws);

        if let Some(markers) = markers {
            pass.set_pipeline(markers);
            pass.set_bind_group(0, globals, &[]);
            pass.draw(0..MARKER_VERTICES, 0..marker_count);
        }
        Ok(())
    }

    fn reinit_shading(&mut self, ctx: &LaneInitContext<'_>) -> Result<(), LaneError> {
        let (Some(variants), Some(marker_layout)) = (self.variants.as_mut(), self.marker_layout)
        else {
            return Err(LaneError::NotInitialized);
        };
        let markers = Self::compile_markers(
            ctx.device,
            ctx.shaders,
            marker_layout,
            variants.color_format,
            variants.depth_format,
        )
        .ok_or_else(|| program_failed("Draw", "light marker program"))?;
        if let Some(old) = self.markers.replace(markers) {
            let _ = ctx.device.destroy_render_pipeline(old);
        }
        variants.clear(ctx.device);
        Ok(())
    }

    fn destroy(&mut self, device: &dyn GraphicsDevice) {
        if let Some(mut variants) = self.variants.take() {
            variants.clear(device);
        }
        if let Some(markers) = self.markers.take() {
            let _ = device.destroy_render_pipeline(markers);
        }
        if let Some(arena) = self.arena.take() {
            arena.destroy(device);
        }
        self.marker_layout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::math::LinearRgba;

    #[test]
    fn variant_keys_follow_material_flags() {
        let opaque = Material::opaque(LinearRgba::WHITE);
        let masked = opaque.with_alpha_cutoff(0.5);
        let a = VariantKey::new(GeometryKind::Mesh, &opaque, false);
        let b = VariantKey::new(GeometryKind::Mesh, &masked, false);
        assert_ne!(a, b);
        assert!(b.flags.contains(MaterialFlags::ALPHA_MASK));
        assert_eq!(a, VariantKey::new(GeometryKind::Mesh, &opaque, false));
        assert_ne!(a, VariantKey::new(GeometryKind::Procedural, &opaque, false));
        assert_ne!(a, VariantKey::new(GeometryKind::Mesh, &opaque, true));
    }

    #[test]
    fn wireframe_needs_device_support() {
        let mut lane = DrawLane::new();
        assert!(!lane.set_wireframe(true));
        lane.wireframe_supported = true;
        assert!(lane.set_wireframe(true));
        assert!(!lane.set_wireframe(false));
    }
}
