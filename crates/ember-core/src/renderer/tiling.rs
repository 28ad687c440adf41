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

//! Screen-tile grid math and the uniform layouts of the tiled light culling pass.
//!
//! The screen is split into `TILE_SIZE`×`TILE_SIZE` pixel tiles. Every tile owns
//! `MAX_LIGHTS_PER_TILE` culled-light slots, stored row-major by
//! `tile_y * tile_count_x + tile_x`, plus one entry in a parallel count array.
//! The CPU reference of the per-tile test lives here as well so the GPU
//! kernel's math can be checked without a device.

use crate::math::{Mat4, Plane, Vec3};
use bytemuck::{Pod, Zeroable};

/// Edge length of a screen tile in pixels.
pub const TILE_SIZE: u32 = 8;

/// Number of culled-light slots per tile. Further lights are dropped.
pub const MAX_LIGHTS_PER_TILE: u32 = 32;

/// Capacity of the point-light buffer. The light count must stay strictly below it.
pub const MAX_LIGHTS_IN_SCENE: u32 = 1000;

/// The tile grid covering a backbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    /// Backbuffer width in pixels.
    pub width: u32,
    /// Backbuffer height in pixels.
    pub height: u32,
    /// Number of tile columns.
    pub tile_count_x: u32,
    /// Number of tile rows.
    pub tile_count_y: u32,
}

impl TileGrid {
    /// Computes the grid for a `width`×`height` backbuffer.
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tile_count_x: width.div_ceil(TILE_SIZE),
            tile_count_y: height.div_ceil(TILE_SIZE),
        }
    }

    /// Total number of tiles.
    #[inline]
    pub const fn tile_count(&self) -> u32 {
        self.tile_count_x * self.tile_count_y
    }

    /// Number of culled-light records (`u32` slots) over all tiles.
    #[inline]
    pub const fn culled_light_records(&self) -> u64 {
        self.tile_count() as u64 * MAX_LIGHTS_PER_TILE as u64
    }

    /// Size in bytes of the culled-light buffer.
    #[inline]
    pub const fn culled_lights_size(&self) -> u64 {
        self.culled_light_records() * std::mem::size_of::<u32>() as u64
    }

    /// Size in bytes of the per-tile count buffer.
    #[inline]
    pub const fn light_counts_size(&self) -> u64 {
        self.tile_count() as u64 * std::mem::size_of::<u32>() as u64
    }

    /// Row-major index of a tile.
    #[inline]
    pub const fn tile_index(&self, tile_x: u32, tile_y: u32) -> u32 {
        tile_y * self.tile_count_x + tile_x
    }
}

/// Uniform block of the tile culling kernel. 80 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TilingUniforms {
    /// Inverse of the camera projection, column-major.
    pub inverse_projection: [[f32; 4]; 4],
    /// Number of active lights (static + dynamic).
    pub lights_count: u32,
    /// Number of tile columns.
    pub tile_count_x: u32,
    /// Number of tile rows.
    pub tile_count_y: u32,
    /// Padding to a 16-byte multiple.
    pub _pad: u32,
}

impl TilingUniforms {
    /// Builds the block for `grid` with `lights_count` active lights.
    pub fn new(inverse_projection: &Mat4, grid: &TileGrid, lights_count: u32) -> Self {
        Self {
            inverse_projection: inverse_projection.to_cols_array_2d(),
            lights_count,
            tile_count_x: grid.tile_count_x,
            tile_count_y: grid.tile_count_y,
            _pad: 0,
        }
    }
}

/// Per-frame camera block shared by every pass. 176 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// World to view transform.
    pub view: [[f32; 4]; 4],
    /// View to clip transform.
    pub projection: [[f32; 4]; 4],
    /// World-space eye position, `w = 1`.
    pub camera_position: [f32; 4],
    /// `(width, height, 1 / width, 1 / height)`.
    pub screen_size: [f32; 4],
    /// `(time since start, delta time, 0, 0)` in seconds.
    pub time: [f32; 4],
}

impl FrameUniforms {
    /// Builds the block from the camera state.
    pub fn new(
        view: &Mat4,
        projection: &Mat4,
        camera_position: Vec3,
        width: u32,
        height: u32,
        time: f32,
        dt: f32,
    ) -> Self {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            camera_position: [camera_position.x, camera_position.y, camera_position.z, 1.0],
            screen_size: [w, h, 1.0 / w, 1.0 / h],
            time: [time, dt, 0.0, 0.0],
        }
    }
}

/// The four side planes of a tile's view-space frustum, normals pointing inwards.
///
/// The planes pass through the eye. Corners are taken on the far plane of the
/// projection, so `inverse_projection` must be the inverse of a `[0, 1]` depth
/// projection.
pub fn tile_frustum(
    grid: &TileGrid,
    tile_x: u32,
    tile_y: u32,
    inverse_projection: &Mat4,
) -> [Plane; 4] {
    let to_view = |px: f32, py: f32| {
        let ndc_x = px / grid.width as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - py / grid.height as f32 * 2.0;
        inverse_projection.project_point(Vec3::new(ndc_x, ndc_y, 1.0))
    };

    let x0 = (tile_x * TILE_SIZE) as f32;
    let y0 = (tile_y * TILE_SIZE) as f32;
    let x1 = x0 + TILE_SIZE as f32;
    let y1 = y0 + TILE_SIZE as f32;

    let corners = [
        to_view(x0, y0),
        to_view(x1, y0),
        to_view(x1, y1),
        to_view(x0, y1),
    ];
    let center = to_view((x0 + x1) * 0.5, (y0 + y1) * 0.5);

    std::array::from_fn(|i| {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let mut normal = a.cross(b).normalize();
        if normal.dot(center) < 0.0 {
            normal = -normal;
        }
        Plane::from_point_normal(Vec3::ZERO, normal)
    })
}

/// Converts a `[0, 1]` depth-buffer value to a view-space z (negative in front of the eye).
pub fn view_depth(inverse_projection: &Mat4, depth: f32) -> f32 {
    inverse_projection.project_point(Vec3::new(0.0, 0.0, depth)).z
}

/// The per-tile light test: a sphere is kept when it is not fully outside any
/// side plane and overlaps the tile's `[near_z, far_z]` view-space depth slab.
///
/// `near_z` and `far_z` are view-space depths, so `near_z >= far_z`.
pub fn sphere_intersects_tile(
    planes: &[Plane; 4],
    near_z: f32,
    far_z: f32,
    center: Vec3,
    radius: f32,
) -> bool {
    if center.z - radius > near_z || center.z + radius < far_z {
        return false;
    }
    planes
        .iter()
        .all(|plane| plane.signed_distance(center) >= -radius)
}

/// Per-tile light lists in the layout the culling kernel writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLightLists {
    /// `MAX_LIGHTS_PER_TILE` slots per tile, row-major. Slots past a tile's count are `u32::MAX`.
    pub culled_lights: Vec<u32>,
    /// Valid slots per tile, never above `MAX_LIGHTS_PER_TILE`.
    pub light_counts: Vec<u32>,
}

impl TileLightLists {
    /// The lights recorded for one tile.
    pub fn lights(&self, grid: &TileGrid, tile_x: u32, tile_y: u32) -> &[u32] {
        let index = grid.tile_index(tile_x, tile_y) as usize;
        let start = index * MAX_LIGHTS_PER_TILE as usize;
        let count = self.light_counts.get(index).copied().unwrap_or(0) as usize;
        self.culled_lights.get(start..start + count).unwrap_or(&[])
    }
}

/// Builds every tile's light list on the CPU, tile by tile like the culling kernel.
///
/// `depth_bounds` holds each tile's `(min, max)` depth-buffer value, row-major;
/// tiles without an entry use the full `[0, 1]` range. `lights` are view-space
/// `(center, radius)` pairs. A light is listed when its sphere touches the tile
/// frustum. Matches past `MAX_LIGHTS_PER_TILE` are dropped and the stored count
/// is clamped. Lights are visited in index order, so a full tile keeps its
/// lowest indices; the kernel keeps whichever matches win the slot counter.
pub fn cull_tile_lights(
    grid: &TileGrid,
    inverse_projection: &Mat4,
    depth_bounds: &[(f32, f32)],
    lights: &[(Vec3, f32)],
) -> TileLightLists {
    let slots = MAX_LIGHTS_PER_TILE as usize;
    let mut lists = TileLightLists {
        culled_lights: vec![u32::MAX; grid.culled_light_records() as usize],
        light_counts: vec![0; grid.tile_count() as usize],
    };

    for tile_y in 0..grid.tile_count_y {
        for tile_x in 0..grid.tile_count_x {
            let index = grid.tile_index(tile_x, tile_y) as usize;
            let (min_depth, max_depth) = depth_bounds.get(index).copied().unwrap_or((0.0, 1.0));
            let near_z = view_depth(inverse_projection, min_depth);
            let far_z = view_depth(inverse_projection, max_depth);
            let planes = tile_frustum(grid, tile_x, tile_y, inverse_projection);

            let mut count = 0usize;
            for (light_index, &(center, radius)) in lights.iter().enumerate() {
                if !sphere_intersects_tile(&planes, near_z, far_z, center, radius) {
                    continue;
                }
                if count < slots {
                    lists.culled_lights[index * slots + count] = light_index as u32;
                }
                count += 1;
            }
            lists.light_counts[index] = count.min(slots) as u32;
        }
    }
    lists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FRAC_PI_3;
    use approx::assert_relative_eq;

    fn projection(grid: &TileGrid) -> Mat4 {
        Mat4::perspective_rh_zo(
            FRAC_PI_3,
            grid.width as f32 / grid.height as f32,
            1.0,
            5000.0,
        )
    }

    #[test]
    fn grid_for_720p() {
        let grid = TileGrid::new(1280, 720);
        assert_eq!(grid.tile_count_x, 160);
        assert_eq!(grid.tile_count_y, 90);
        assert_eq!(grid.tile_count(), 14_400);
        assert_eq!(grid.culled_light_records(), 460_800);
        assert_eq!(grid.culled_lights_size(), 460_800 * 4);
        assert_eq!(grid.light_counts_size(), 14_400 * 4);
    }

    #[test]
    fn partial_tiles_round_up() {
        let grid = TileGrid::new(1281, 721);
        assert_eq!((grid.tile_count_x, grid.tile_count_y), (161, 91));
        let tiny = TileGrid::new(1, 1);
        assert_eq!(tiny.tile_count(), 1);
    }

    #[test]
    fn uniform_layouts_match_shader_blocks() {
        assert_eq!(std::mem::size_of::<TilingUniforms>(), 80);
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 176);
    }

    #[test]
    fn view_depth_maps_near_and_far() {
        let grid = TileGrid::new(1280, 720);
        let inv = projection(&grid).inverse().unwrap();
        assert_relative_eq!(view_depth(&inv, 0.0), -1.0, epsilon = 1e-3);
        let far = view_depth(&inv, 1.0);
        assert!(far < -4000.0 && far > -6000.0, "far plane unprojected to {far}");
    }

    #[test]
    fn light_in_front_of_center_tile_is_kept_there_only() {
        let grid = TileGrid::new(1280, 720);
        let inv = projection(&grid).inverse().unwrap();
        let (near_z, far_z) = (-1.0, -5000.0);
        let light = Vec3::new(0.0, 0.0, -100.0);

        let center = tile_frustum(&grid, 80, 45, &inv);
        assert!(sphere_intersects_tile(&center, near_z, far_z, light, 1.0));

        let corner = tile_frustum(&grid, 0, 0, &inv);
        assert!(!sphere_intersects_tile(&corner, near_z, far_z, light, 1.0));
    }

    #[test]
    fn depth_slab_rejects_lights_behind_geometry() {
        let grid = TileGrid::new(1280, 720);
        let inv = projection(&grid).inverse().unwrap();
        let planes = tile_frustum(&grid, 80, 45, &inv);
        let light = Vec3::new(0.0, 0.0, -400.0);

        assert!(!sphere_intersects_tile(&planes, -10.0, -200.0, light, 50.0));
        assert!(sphere_intersects_tile(&planes, -10.0, -200.0, light, 250.0));
    }

    /// View-space point `distance` in front of the eye under pixel `(px, py)`.
    fn under_pixel(grid: &TileGrid, inv: &Mat4, px: f32, py: f32, distance: f32) -> Vec3 {
        let ndc_x = px / grid.width as f32 * 2.0 - 1.0;
        let ndc_y = 1.0 - py / grid.height as f32 * 2.0;
        let far = inv.project_point(Vec3::new(ndc_x, ndc_y, 1.0));
        far * (-distance / far.z)
    }

    #[test]
    fn crowded_tile_keeps_the_first_lights_and_clamps_its_count() {
        let grid = TileGrid::new(1280, 720);
        let inv = projection(&grid).inverse().unwrap();
        let center = under_pixel(&grid, &inv, 644.0, 364.0, 100.0);
        let lights = vec![(center, 0.2); 40];

        let lists = cull_tile_lights(&grid, &inv, &[], &lights);
        let expected: Vec<u32> = (0..MAX_LIGHTS_PER_TILE).collect();
        assert_eq!(lists.lights(&grid, 80, 45), expected.as_slice());
        assert_eq!(lists.light_counts[grid.tile_index(80, 45) as usize], MAX_LIGHTS_PER_TILE);
        assert_eq!(lists.light_counts.iter().sum::<u32>(), MAX_LIGHTS_PER_TILE);
    }

    #[test]
    fn light_on_a_tile_corner_is_listed_by_all_four_tiles() {
        let grid = TileGrid::new(1280, 720);
        let inv = projection(&grid).inverse().unwrap();
        let lights = [(Vec3::new(0.0, 0.0, -100.0), 0.1)];

        let lists = cull_tile_lights(&grid, &inv, &[], &lights);
        for (x, y) in [(79, 44), (80, 44), (79, 45), (80, 45)] {
            assert_eq!(lists.lights(&grid, x, y), [0], "tile ({x}, {y})");
        }
        assert_eq!(lists.light_counts.iter().sum::<u32>(), 4);
        assert!(lists.lights(&grid, 81, 45).is_empty());
    }

    #[test]
    fn partial_last_row_and_column_get_lists() {
        let grid = TileGrid::new(1281, 721);
        let inv = projection(&grid).inverse().unwrap();
        let corner = under_pixel(&grid, &inv, 1280.5, 720.5, 100.0);

        let lists = cull_tile_lights(&grid, &inv, &[], &[(corner, 0.01)]);
        assert_eq!(lists.light_counts.len(), 161 * 91);
        assert_eq!(lists.culled_lights.len() as u64, grid.culled_light_records());
        assert_eq!(lists.lights(&grid, 160, 90), [0]);
        assert_eq!(lists.light_counts.iter().sum::<u32>(), 1);
    }

    #[test]
    fn tile_depth_bounds_reject_lights_behind_the_geometry() {
        let grid = TileGrid::new(64, 64);
        let inv = projection(&grid).inverse().unwrap();
        let lights = [(Vec3::new(0.0, 0.0, -100.0), 1.0)];

        let open = cull_tile_lights(&grid, &inv, &[], &lights);
        assert!(open.light_counts.iter().sum::<u32>() > 0);

        let close_geometry = vec![(0.0, 0.0); grid.tile_count() as usize];
        let closed = cull_tile_lights(&grid, &inv, &close_geometry, &lights);
        assert!(closed.light_counts.iter().all(|&c| c == 0));
        assert!(closed.culled_lights.iter().all(|&l| l == u32::MAX));
    }

    #[test]
    fn large_light_reaches_neighbouring_tiles() {
        let grid = TileGrid::new(1280, 720);
        let inv = projection(&grid).inverse().unwrap();
        let light = Vec3::new(0.0, 0.0, -100.0);
        let neighbour = tile_frustum(&grid, 82, 45, &inv);
        assert!(!sphere_intersects_tile(&neighbour, -1.0, -5000.0, light, 0.1));
        assert!(sphere_intersects_tile(&neighbour, -1.0, -5000.0, light, 5.0));
    }
}
