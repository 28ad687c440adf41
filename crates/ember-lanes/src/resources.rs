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

//! GPU resources shared by the lanes of one frame pipeline.

use bytemuck::{Pod, Zeroable};
use ember_core::math::Mat4;
use ember_core::renderer::{
    BindGroupDescriptor, BindGroupEntry, BindGroupId, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindGroupLayoutId, BufferDescriptor, BufferId, BufferUsage,
    DirectionalSun, FrameUniforms, GpuPointLight, GraphicsDevice, Material, RenderError,
    ResourceError, ShaderStageFlags, TextureDescriptor, TextureFormat, TextureId, TextureUsage,
    TextureViewId, TileGrid, TilingUniforms, MAX_LIGHTS_IN_SCENE,
};
use std::borrow::Cow;
use std::mem::size_of;

/// Scene-wide shading constants. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GlobalProperties {
    /// Sun travel direction in `xyz`, intensity in `w`.
    pub sun_direction_and_intensity: [f32; 4],
    /// Sun color.
    pub sun_color: [f32; 4],
}

impl From<&DirectionalSun> for GlobalProperties {
    fn from(sun: &DirectionalSun) -> Self {
        Self {
            sun_direction_and_intensity: sun.direction_and_intensity.to_array(),
            sun_color: sun.color.to_array(),
        }
    }
}

/// Per-draw block bound with a dynamic offset. 96 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectUniforms {
    /// Object to world transform.
    pub world: [[f32; 4]; 4],
    /// Diffuse color.
    pub diffuse: [f32; 4],
    /// `(specular power, alpha cutoff, 0, 0)`.
    pub params: [f32; 4],
}

impl ObjectUniforms {
    /// Builds the block for a draw with `material`.
    pub fn new(world: &Mat4, material: &Material) -> Self {
        let [specular_power, alpha_cutoff] = material.shading_params();
        Self {
            world: world.to_cols_array_2d(),
            diffuse: material.diffuse.to_array(),
            params: [specular_power, alpha_cutoff, 0.0, 0.0],
        }
    }

    /// A block carrying only a transform, for depth-only draws.
    pub fn transform_only(world: &Mat4) -> Self {
        Self::new(world, &Material::default())
    }
}

/// Bind group 0 layout of every raster lane.
const FORWARD_BINDINGS: [BindGroupLayoutEntry; 6] = [
    BindGroupLayoutEntry::uniform(0, ShaderStageFlags::VERTEX_FRAGMENT),
    BindGroupLayoutEntry::uniform(1, ShaderStageFlags::VERTEX_FRAGMENT),
    BindGroupLayoutEntry::storage(2, ShaderStageFlags::VERTEX_FRAGMENT, true),
    BindGroupLayoutEntry::storage(3, ShaderStageFlags::FRAGMENT, true),
    BindGroupLayoutEntry::storage(4, ShaderStageFlags::FRAGMENT, true),
    BindGroupLayoutEntry::uniform(5, ShaderStageFlags::VERTEX_FRAGMENT),
];

/// Buffers, targets and layouts created once per renderer and borrowed by the lanes.
///
/// Only the tile-light lane writes the light buffers after creation; the
/// shading lanes read them through the forward bind group.
#[derive(Debug)]
pub struct SharedRenderResources {
    /// Tile grid of the backbuffer.
    pub grid: TileGrid,
    /// Camera projection.
    pub projection: Mat4,
    /// Inverse of `projection`.
    pub inverse_projection: Mat4,
    /// Format of the presented surface.
    pub color_format: TextureFormat,
    /// Format of the depth target.
    pub depth_format: TextureFormat,
    /// Depth target, written by the prepass and read by the tile culler.
    pub depth_texture: TextureId,
    /// View of `depth_texture`.
    pub depth_view: TextureViewId,
    /// One [`FrameUniforms`] block.
    pub frame_uniforms: BufferId,
    /// One [`GlobalProperties`] block.
    pub global_properties: BufferId,
    /// One [`TilingUniforms`] block.
    pub tiling_uniforms: BufferId,
    /// `MAX_LIGHTS_IN_SCENE` [`GpuPointLight`] records, static lights first.
    pub point_lights: BufferId,
    /// `MAX_LIGHTS_PER_TILE` light indices per tile.
    pub culled_lights: BufferId,
    /// One light count per tile.
    pub light_counts: BufferId,
    /// Number of static lights at the head of `point_lights`.
    pub static_light_count: u32,
    /// Layout of bind group 0 of the raster lanes.
    pub forward_layout: BindGroupLayoutId,
    /// Bind group 0 of the raster lanes.
    pub forward_bind_group: BindGroupId,
    /// Layout of the per-draw [`ObjectUniforms`] group.
    pub object_layout: BindGroupLayoutId,
}

impl SharedRenderResources {
    /// Creates every shared resource and uploads the static lights.
    ///
    /// Fails with [`RenderError::TooManyLights`] when the static lights do not
    /// leave room in the light buffer.
    pub fn create(
        device: &dyn GraphicsDevice,
        width: u32,
        height: u32,
        projection: Mat4,
        static_lights: &[GpuPointLight],
        sun: &DirectionalSun,
    ) -> Result<Self, RenderError> {
        if static_lights.len() >= MAX_LIGHTS_IN_SCENE as usize {
            return Err(RenderError::TooManyLights {
                requested: static_lights.len(),
                capacity: MAX_LIGHTS_IN_SCENE as usize,
            });
        }
        let inverse_projection = projection.inverse().ok_or_else(|| {
            RenderError::InitializationFailed("projection matrix is not invertible".to_string())
        })?;

        let grid = TileGrid::new(width, height);
        let color_format = device
            .get_surface_format()
            .unwrap_or(TextureFormat::Bgra8UnormSrgb);
        let depth_format = TextureFormat::Depth32Float;

        let depth_texture = device.create_texture(&TextureDescriptor {
            label: Some(Cow::Borrowed("Scene depth")),
            width: grid.width,
            height: grid.height,
            format: depth_format,
            usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        })?;
        let depth_view = device.create_texture_view(depth_texture)?;

        let uniform = |label: &'static str, size: usize| {
            device.create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed(label)),
                size: size as u64,
                usage: BufferUsage::UNIFORM | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let frame_uniforms = uniform("Frame uniforms", size_of::<FrameUniforms>())?;
        let global_properties = uniform("Global properties", size_of::<GlobalProperties>())?;
        let tiling_uniforms = uniform("Tiling uniforms", size_of::<TilingUniforms>())?;

        device.write_buffer(
            global_properties,
            0,
            bytemuck::bytes_of(&GlobalProperties::from(sun)),
        )?;
        device.write_buffer(
            tiling_uniforms,
            0,
            bytemuck::bytes_of(&TilingUniforms::new(
                &inverse_projection,
                &grid,
                static_lights.len() as u32,
            )),
        )?;

        let mut lights = vec![GpuPointLight::default(); MAX_LIGHTS_IN_SCENE as usize];
        lights[..static_lights.len()].copy_from_slice(static_lights);
        let point_lights = device.create_buffer_with_data(
            &BufferDescriptor {
                label: Some(Cow::Borrowed("Point lights")),
                size: (lights.len() * size_of::<GpuPointLight>()) as u64,
                usage: BufferUsage::STORAGE | BufferUsage::COPY_DST,
                mapped_at_creation: false,
            },
            bytemuck::cast_slice(&lights),
        )?;

        let storage = |label: &'static str, size: u64| {
            device.create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed(label)),
                size,
                usage: BufferUsage::STORAGE | BufferUsage::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let culled_lights = storage("Culled lights", grid.culled_lights_size())?;
        let light_counts = storage("Culled light counts", grid.light_counts_size())?;

        let forward_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Forward globals layout"),
            entries: &FORWARD_BINDINGS,
        })?;
        let forward_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("Forward globals"),
            layout: forward_layout,
            entries: &[
                BindGroupEntry::whole_buffer(0, frame_uniforms),
                BindGroupEntry::whole_buffer(1, global_properties),
                BindGroupEntry::whole_buffer(2, point_lights),
                BindGroupEntry::whole_buffer(3, culled_lights),
                BindGroupEntry::whole_buffer(4, light_counts),
                BindGroupEntry::whole_buffer(5, tiling_uniforms),
            ],
        })?;
        let object_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Object uniforms layout"),
            entries: &[BindGroupLayoutEntry::dynamic_uniform(
                0,
                ShaderStageFlags::VERTEX_FRAGMENT,
                size_of::<ObjectUniforms>() as u64,
            )],
        })?;

        log::info!(
            "Shared render resources ready: {}x{} tiles, {} static lights.",
            grid.tile_count_x,
            grid.tile_count_y,
            static_lights.len()
        );

        Ok(Self {
            grid,
            projection,
            inverse_projection,
            color_format,
            depth_format,
            depth_texture,
            depth_view,
            frame_uniforms,
            global_properties,
            tiling_uniforms,
            point_lights,
            culled_lights,
            light_counts,
            static_light_count: static_lights.len() as u32,
            forward_layout,
            forward_bind_group,
            object_layout,
        })
    }

    /// Uploads the per-frame camera block.
    pub fn write_frame_uniforms(
        &self,
        device: &dyn GraphicsDevice,
        uniforms: &FrameUniforms,
    ) -> Result<(), ResourceError> {
        device.write_buffer(self.frame_uniforms, 0, bytemuck::bytes_of(uniforms))
    }

    /// Releases every resource.
    pub fn destroy(&self, device: &dyn GraphicsDevice) {
        if let Err(e) = device.destroy_bind_group(self.forward_bind_group) {
            log::warn!("Failed to destroy forward bind group: {}", e);
        }
        for buffer in [
            self.frame_uniforms,
            self.global_properties,
            self.tiling_uniforms,
            self.point_lights,
            self.culled_lights,
            self.light_counts,
        ] {
            if let Err(e) = device.destroy_buffer(buffer) {
                log::warn!("Failed to destroy shared buffer {:?}: {}", buffer, e);
            }
        }
        let _ = device.destroy_texture_view(self.depth_view);
        let _ = device.destroy_texture(self.depth_texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_blocks_have_their_wgsl_sizes() {
        assert_eq!(size_of::<GlobalProperties>(), 32);
        assert_eq!(size_of::<ObjectUniforms>(), 96);
    }

    #[test]
    fn object_uniforms_carry_material_parameters() {
        let material = Material::default()
            .with_specular_power(42.0)
            .with_alpha_cutoff(0.25);
        let block = ObjectUniforms::new(&Mat4::IDENTITY, &material);
        assert_eq!(block.params, [42.0, 0.25, 0.0, 0.0]);
        assert_eq!(block.world, Mat4::IDENTITY.to_cols_array_2d());
    }

    #[test]
    fn global_properties_pack_the_sun() {
        let sun = DirectionalSun::default();
        let props = GlobalProperties::from(&sun);
        assert_eq!(props.sun_direction_and_intensity[3], 0.3);
        assert_eq!(props.sun_color[0], 0.77);
    }
}
