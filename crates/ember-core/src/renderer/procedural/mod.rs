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

//! GPU layouts of the procedural surface pipeline and its CPU reference.
//!
//! A generator is a scalar field evaluated over a cubic lattice of
//! `extent * POLYGONIZE_WORKGROUP_SIZE` cells per axis. The field is sampled at
//! coordinates normalized to `[-1, 1]`; emitted positions are in lattice units
//! centered on the origin, so the owning entity's transform scales the result.

mod cell_tables;

pub use self::cell_tables::{
    build_cell_tables, cell_tables, CellTables, RegularCell, CELL_CONFIGURATIONS, CELL_EDGES,
    EDGE_CORNERS, MAX_CELL_TRIANGLES,
};

use crate::math::Vec3;
use bytemuck::{Pod, Zeroable};

/// Vertex and index capacity of a generated mesh.
pub const SURFACE_BUFF_SIZE: u32 = 250_000;

/// Edge length of a polygonizer workgroup, in cells.
pub const POLYGONIZE_WORKGROUP_SIZE: u32 = 4;

/// A vertex written by the polygonizer. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SurfaceVertex {
    /// Lattice-space position, `w = 1`.
    pub position: [f32; 4],
    /// Normalized field gradient, `w = 0`.
    pub normal: [f32; 4],
}

/// Atomic counters of one generated mesh. 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct MeshCounters {
    /// Vertices reserved so far, may exceed the capacity.
    pub vertex_count: u32,
    /// Indices reserved so far, may exceed the capacity.
    pub index_count: u32,
    /// Non-zero once a cell was dropped for lack of space.
    pub overflowed: u32,
    /// Padding.
    pub _pad: u32,
}

/// Arguments of an indexed indirect draw. 20 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// First index in the index buffer.
    pub first_index: u32,
    /// Value added to each index.
    pub base_vertex: i32,
    /// First instance.
    pub first_instance: u32,
}

impl DrawIndexedIndirectArgs {
    /// Arguments produced by the finalize step for `counters`.
    pub fn finalize(counters: &MeshCounters, capacity: u32) -> Self {
        Self {
            index_count: counters.index_count.min(capacity / 3 * 3),
            instance_count: 1,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// A cell table row as read by the polygonizer shader. 68 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct GpuCell {
    /// Vertices emitted by the configuration.
    pub vertex_count: u32,
    /// Triangles emitted by the configuration.
    pub triangle_count: u32,
    /// Local vertex indices.
    pub indices: [u32; MAX_CELL_TRIANGLES * 3],
}

impl From<&RegularCell> for GpuCell {
    fn from(cell: &RegularCell) -> Self {
        Self {
            vertex_count: cell.vertex_count as u32,
            triangle_count: cell.triangle_count as u32,
            indices: cell.indices.map(u32::from),
        }
    }
}

/// The cell table in its GPU layout.
pub fn gpu_cell_table() -> Vec<GpuCell> {
    cell_tables().cells.iter().map(GpuCell::from).collect()
}

/// Cells per axis for a generator `extent` given in workgroups.
#[inline]
pub const fn cells_per_axis(extent: u32) -> u32 {
    extent * POLYGONIZE_WORKGROUP_SIZE
}

/// Output of [`polygonize_reference`].
#[derive(Debug, Clone, PartialEq)]
pub struct PolygonizedSurface {
    /// Final counter values.
    pub counters: MeshCounters,
    /// The draw arguments the finalize step would write.
    pub draw_args: DrawIndexedIndirectArgs,
    /// The first `min(vertex_count, capacity)` vertices.
    pub vertices: Vec<SurfaceVertex>,
    /// The drawn indices.
    pub indices: Vec<u32>,
}

/// Polygonizes `field` on the CPU exactly the way the GPU pipeline does,
/// visiting cells in x-major order.
///
/// `field` receives normalized coordinates and is negative inside the surface.
pub fn polygonize_reference(
    field: impl Fn(Vec3) -> f32,
    extent: u32,
    capacity: u32,
) -> PolygonizedSurface {
    let tables = cell_tables();
    let grid = cells_per_axis(extent);
    let half = grid as f32 * 0.5;
    let normalized = |p: Vec3| p * (1.0 / half);
    let h = 1.0 / grid as f32;
    let gradient = |p: Vec3| {
        Vec3::new(
            field(p + Vec3::new(h, 0.0, 0.0)) - field(p - Vec3::new(h, 0.0, 0.0)),
            field(p + Vec3::new(0.0, h, 0.0)) - field(p - Vec3::new(0.0, h, 0.0)),
            field(p + Vec3::new(0.0, 0.0, h)) - field(p - Vec3::new(0.0, 0.0, h)),
        )
        .normalize()
    };

    let cap = capacity as usize;
    let mut counters = MeshCounters::default();
    let mut vertices = vec![SurfaceVertex::default(); cap];
    let mut indices = vec![0u32; cap];

    for z in 0..grid {
        for y in 0..grid {
            for x in 0..grid {
                let corner = |c: u8| {
                    Vec3::new(
                        (x + (c & 1) as u32) as f32 - half,
                        (y + ((c >> 1) & 1) as u32) as f32 - half,
                        (z + ((c >> 2) & 1) as u32) as f32 - half,
                    )
                };
                let values: [f32; 8] = std::array::from_fn(|c| field(normalized(corner(c as u8))));
                let config = values
                    .iter()
                    .enumerate()
                    .fold(0usize, |acc, (i, v)| if *v < 0.0 { acc | 1 << i } else { acc });

                let cell = &tables.cells[config];
                if cell.triangle_count == 0 {
                    continue;
                }

                let vertex_count = cell.vertex_count as u32;
                let index_count = cell.triangle_count as u32 * 3;
                let base_vertex = counters.vertex_count;
                let base_index = counters.index_count;
                counters.vertex_count += vertex_count;
                counters.index_count += index_count;

                if base_vertex + vertex_count > capacity || base_index + index_count > capacity {
                    counters.overflowed = 1;
                    let end = (base_index + index_count).min(capacity);
                    for slot in base_index.min(capacity)..end {
                        indices[slot as usize] = 0;
                    }
                    continue;
                }

                let row = &tables.vertices[config * CELL_EDGES..(config + 1) * CELL_EDGES];
                for local in 0..vertex_count as usize {
                    let (a, b) = ((row[local] & 0xF) as u8, (row[local] >> 4) as u8);
                    let (va, vb) = (values[a as usize], values[b as usize]);
                    let t = va / (va - vb);
                    let (pa, pb) = (corner(a), corner(b));
                    let position = pa + (pb - pa) * t;
                    let normal = gradient(normalized(position));
                    vertices[(base_vertex as usize) + local] = SurfaceVertex {
                        position: [position.x, position.y, position.z, 1.0],
                        normal: [normal.x, normal.y, normal.z, 0.0],
                    };
                }
                for (i, &local) in cell.triangles().iter().enumerate() {
                    indices[base_index as usize + i] = base_vertex + local as u32;
                }
            }
        }
    }

    let draw_args = DrawIndexedIndirectArgs::finalize(&counters, capacity);
    vertices.truncate((counters.vertex_count as usize).min(cap));
    indices.truncate(draw_args.index_count as usize);

    PolygonizedSurface {
        counters,
        draw_args,
        vertices,
        indices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sphere(p: Vec3) -> f32 {
        p.length() - 0.537
    }

    #[test]
    fn gpu_layouts_have_shader_sizes() {
        assert_eq!(std::mem::size_of::<SurfaceVertex>(), 32);
        assert_eq!(std::mem::size_of::<MeshCounters>(), 16);
        assert_eq!(std::mem::size_of::<DrawIndexedIndirectArgs>(), 20);
        assert_eq!(std::mem::size_of::<GpuCell>(), 68);
        assert_eq!(gpu_cell_table().len(), CELL_CONFIGURATIONS);
    }

    #[test]
    fn finalize_clamps_to_whole_triangles() {
        let counters = MeshCounters {
            vertex_count: 10,
            index_count: 250_010,
            overflowed: 1,
            _pad: 0,
        };
        let args = DrawIndexedIndirectArgs::finalize(&counters, SURFACE_BUFF_SIZE);
        assert_eq!(args.index_count, 249_999);
        assert_eq!(args.instance_count, 1);
    }

    #[test]
    fn empty_field_emits_nothing() {
        let surface = polygonize_reference(|_| 1.0, 2, SURFACE_BUFF_SIZE);
        assert_eq!(surface.counters, MeshCounters::default());
        assert_eq!(surface.draw_args.index_count, 0);
    }

    #[test]
    fn sphere_is_closed_and_faces_outwards() {
        let surface = polygonize_reference(sphere, 10, SURFACE_BUFF_SIZE);
        assert_eq!(surface.counters.overflowed, 0);
        assert!(!surface.indices.is_empty());

        let key = |i: u32| {
            let p = surface.vertices[i as usize].position;
            [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]
        };
        let mut directed: HashMap<_, u32> = HashMap::new();
        for tri in surface.indices.chunks(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                *directed.entry((key(a), key(b))).or_default() += 1;
            }

            let p = |i: u32| {
                let v = surface.vertices[i as usize].position;
                Vec3::new(v[0], v[1], v[2])
            };
            let (a, b, c) = (p(tri[0]), p(tri[1]), p(tri[2]));
            let centroid = (a + b + c) * (1.0 / 3.0);
            assert!((b - a).cross(c - a).dot(centroid) > 0.0);
        }
        for ((a, b), count) in &directed {
            assert_eq!(*count, 1);
            assert_eq!(directed.get(&(*b, *a)), Some(&1), "open edge");
        }
    }

    #[test]
    fn normals_point_away_from_the_center() {
        let surface = polygonize_reference(sphere, 4, SURFACE_BUFF_SIZE);
        for v in &surface.vertices {
            let p = Vec3::new(v.position[0], v.position[1], v.position[2]);
            let n = Vec3::new(v.normal[0], v.normal[1], v.normal[2]);
            assert!(n.dot(p) > 0.0);
        }
    }

    #[test]
    fn polygonizing_twice_is_identical() {
        let first = polygonize_reference(sphere, 4, SURFACE_BUFF_SIZE);
        let second = polygonize_reference(sphere, 4, SURFACE_BUFF_SIZE);
        assert_eq!(first, second);
    }

    #[test]
    fn overflow_drops_whole_cells_and_flags() {
        let full = polygonize_reference(sphere, 4, SURFACE_BUFF_SIZE);
        let capacity = full.counters.index_count / 2;
        let clipped = polygonize_reference(sphere, 4, capacity);

        assert_eq!(clipped.counters.overflowed, 1);
        assert_eq!(clipped.counters.index_count, full.counters.index_count);
        assert!(clipped.draw_args.index_count <= capacity);
        assert_eq!(clipped.draw_args.index_count % 3, 0);
        for &index in &clipped.indices {
            assert!((index as usize) < clipped.vertices.len().max(1));
        }
    }
}
