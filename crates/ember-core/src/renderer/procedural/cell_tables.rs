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

//! Lookup tables for polygonizing one grid cell.
//!
//! Cell corners are numbered by their offset bits: corner `i` sits at
//! `(i & 1, (i >> 1) & 1, (i >> 2) & 1)`. A corner is inside the surface when
//! the field is negative there, and the eight inside bits form the cell's
//! configuration index.
//!
//! The tables are derived rather than transcribed. Each cell face contributes
//! segments between its crossing edges; where a face is ambiguous (two
//! diagonal inside corners) every inside corner gets its own segment. The
//! choice only depends on the face's corners, so neighbouring cells agree and
//! the surface has no cracks. Segments are chained into loops and each loop is
//! fanned into triangles wound counter-clockwise seen from outside.

use std::sync::OnceLock;

/// Number of cell configurations.
pub const CELL_CONFIGURATIONS: usize = 256;

/// Edges of a cell.
pub const CELL_EDGES: usize = 12;

/// Upper bound of triangles a single cell can produce.
pub const MAX_CELL_TRIANGLES: usize = 5;

/// Corner pairs of every edge, lower corner first.
pub const EDGE_CORNERS: [(u8, u8); CELL_EDGES] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Triangulation of one cell configuration.
///
/// Local vertex `i` lies on the `i`-th crossing edge in edge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegularCell {
    /// Number of crossing edges, and so of emitted vertices.
    pub vertex_count: u8,
    /// Number of emitted triangles.
    pub triangle_count: u8,
    /// Local vertex indices, three per triangle.
    pub indices: [u8; MAX_CELL_TRIANGLES * 3],
}

impl RegularCell {
    const EMPTY: Self = Self {
        vertex_count: 0,
        triangle_count: 0,
        indices: [0; MAX_CELL_TRIANGLES * 3],
    };

    /// The used part of `indices`.
    pub fn triangles(&self) -> &[u8] {
        &self.indices[..self.triangle_count as usize * 3]
    }
}

/// The cell and vertex tables.
#[derive(Debug, Clone)]
pub struct CellTables {
    /// One triangulation per configuration.
    pub cells: Vec<RegularCell>,
    /// `CELL_EDGES` entries per configuration. Entry `i` packs the corners of
    /// local vertex `i` as `low | high << 4`. Unused entries are zero.
    pub vertices: Vec<u32>,
}

/// The process-wide tables, built on first use.
pub fn cell_tables() -> &'static CellTables {
    static TABLES: OnceLock<CellTables> = OnceLock::new();
    TABLES.get_or_init(build_cell_tables)
}

/// Builds both tables.
pub fn build_cell_tables() -> CellTables {
    let mut cells = Vec::with_capacity(CELL_CONFIGURATIONS);
    let mut vertices = Vec::with_capacity(CELL_CONFIGURATIONS * CELL_EDGES);

    for config in 0..CELL_CONFIGURATIONS {
        let config = config as u8;
        let crossing: Vec<usize> = (0..CELL_EDGES)
            .filter(|&e| {
                let (a, b) = EDGE_CORNERS[e];
                is_inside(config, a) != is_inside(config, b)
            })
            .collect();

        let mut row = [0u32; CELL_EDGES];
        for (local, &edge) in crossing.iter().enumerate() {
            let (a, b) = EDGE_CORNERS[edge];
            row[local] = a as u32 | (b as u32) << 4;
        }
        vertices.extend_from_slice(&row);

        cells.push(triangulate(config, &crossing));
    }

    CellTables { cells, vertices }
}

#[inline]
fn is_inside(config: u8, corner: u8) -> bool {
    config & (1 << corner) != 0
}

/// Corner position with coordinates doubled, so edge midpoints stay integral.
fn corner_position(corner: u8) -> [i32; 3] {
    [
        (corner & 1) as i32 * 2,
        ((corner >> 1) & 1) as i32 * 2,
        ((corner >> 2) & 1) as i32 * 2,
    ]
}

fn edge_midpoint(edge: usize) -> [i32; 3] {
    let (a, b) = EDGE_CORNERS[edge];
    let (pa, pb) = (corner_position(a), corner_position(b));
    [
        (pa[0] + pb[0]) / 2,
        (pa[1] + pb[1]) / 2,
        (pa[2] + pb[2]) / 2,
    ]
}

fn edge_between(a: u8, b: u8) -> usize {
    let key = (a.min(b), a.max(b));
    EDGE_CORNERS
        .iter()
        .position(|&pair| pair == key)
        .unwrap_or(0)
}

fn sub(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [i32; 3], b: [i32; 3]) -> [i32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [i32; 3], b: [i32; 3]) -> i32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

struct Face {
    corners: [u8; 4],
    normal: [i32; 3],
}

/// The six faces, corners in cyclic order, normals pointing out of the cell.
fn faces() -> [Face; 6] {
    std::array::from_fn(|i| {
        let axis = i / 2;
        let side = (i % 2) as u8;
        let (u, v) = ((axis + 1) % 3, (axis + 2) % 3);
        let corner = |du: u8, dv: u8| side << axis | du << u | dv << v;
        let mut normal = [0; 3];
        normal[axis] = if side == 1 { 1 } else { -1 };
        Face {
            corners: [corner(0, 0), corner(1, 0), corner(1, 1), corner(0, 1)],
            normal,
        }
    })
}

/// Directed segments `(from_edge, to_edge)` of one face.
fn face_segments(config: u8, face: &Face, out: &mut Vec<(usize, usize)>) {
    let c = face.corners;
    let edges: [usize; 4] = std::array::from_fn(|k| edge_between(c[k], c[(k + 1) % 4]));
    let crosses: Vec<usize> = (0..4)
        .filter(|&k| is_inside(config, c[k]) != is_inside(config, c[(k + 1) % 4]))
        .collect();

    let mut push = |from: usize, to: usize, inside_corner: u8| {
        let p = edge_midpoint(from);
        let q = edge_midpoint(to);
        let toward_corner = sub(corner_position(inside_corner), p);
        if dot(cross(sub(q, p), toward_corner), face.normal) > 0 {
            out.push((to, from));
        } else {
            out.push((from, to));
        }
    };

    match crosses.len() {
        2 => {
            let inside = c
                .iter()
                .copied()
                .find(|&corner| is_inside(config, corner))
                .unwrap_or(c[0]);
            push(edges[crosses[0]], edges[crosses[1]], inside);
        }
        4 => {
            for k in 0..4 {
                if is_inside(config, c[k]) {
                    push(edges[(k + 3) % 4], edges[k], c[k]);
                }
            }
        }
        _ => {}
    }
}

fn triangulate(config: u8, crossing: &[usize]) -> RegularCell {
    if crossing.is_empty() {
        return RegularCell::EMPTY;
    }

    let mut segments = Vec::with_capacity(CELL_EDGES);
    for face in faces().iter() {
        face_segments(config, face, &mut segments);
    }

    let mut next = [usize::MAX; CELL_EDGES];
    for &(from, to) in &segments {
        debug_assert_eq!(next[from], usize::MAX, "edge {from} leaves twice in {config}");
        next[from] = to;
    }

    let mut local = [0u8; CELL_EDGES];
    for (i, &edge) in crossing.iter().enumerate() {
        local[edge] = i as u8;
    }

    let mut cell = RegularCell {
        vertex_count: crossing.len() as u8,
        ..RegularCell::EMPTY
    };
    let mut visited = [false; CELL_EDGES];
    let mut written = 0usize;

    for &start in crossing {
        if visited[start] {
            continue;
        }
        let mut ring = Vec::with_capacity(CELL_EDGES);
        let mut edge = start;
        while edge != usize::MAX && !visited[edge] {
            visited[edge] = true;
            ring.push(edge);
            edge = next[edge];
        }
        for i in 1..ring.len().saturating_sub(1) {
            if written + 3 > cell.indices.len() {
                break;
            }
            cell.indices[written] = local[ring[0]];
            cell.indices[written + 1] = local[ring[i]];
            cell.indices[written + 2] = local[ring[i + 1]];
            written += 3;
        }
    }

    cell.triangle_count = (written / 3) as u8;
    cell
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_have_one_row_per_configuration() {
        let tables = cell_tables();
        assert_eq!(tables.cells.len(), CELL_CONFIGURATIONS);
        assert_eq!(tables.vertices.len(), CELL_CONFIGURATIONS * CELL_EDGES);
    }

    #[test]
    fn empty_and_full_cells_emit_nothing() {
        let tables = cell_tables();
        assert_eq!(tables.cells[0], RegularCell::EMPTY);
        assert_eq!(tables.cells[255].triangle_count, 0);
        assert_eq!(tables.cells[255].vertex_count, 0);
    }

    #[test]
    fn single_corner_cuts_one_triangle() {
        let tables = cell_tables();
        for corner in 0..8 {
            let cell = tables.cells[1 << corner];
            assert_eq!(cell.vertex_count, 3);
            assert_eq!(cell.triangle_count, 1);
        }
    }

    #[test]
    fn corner_zero_triangle_faces_away_from_the_corner() {
        let tables = cell_tables();
        let cell = tables.cells[1];
        let vertex = |local: u8| {
            let packed = tables.vertices[CELL_EDGES + local as usize];
            let (a, b) = ((packed & 0xF) as u8, (packed >> 4) as u8);
            let (pa, pb) = (corner_position(a), corner_position(b));
            [pa[0] + pb[0], pa[1] + pb[1], pa[2] + pb[2]]
        };
        let t = cell.triangles();
        let (a, b, c) = (vertex(t[0]), vertex(t[1]), vertex(t[2]));
        let normal = cross(sub(b, a), sub(c, a));
        assert!(dot(normal, [1, 1, 1]) > 0);
    }

    #[test]
    fn every_configuration_is_consistent() {
        let tables = cell_tables();
        for (config, cell) in tables.cells.iter().enumerate() {
            let crossing = (0..CELL_EDGES)
                .filter(|&e| {
                    let (a, b) = EDGE_CORNERS[e];
                    is_inside(config as u8, a) != is_inside(config as u8, b)
                })
                .count();
            assert_eq!(cell.vertex_count as usize, crossing, "config {config}");
            assert!(cell.triangle_count as usize <= MAX_CELL_TRIANGLES);
            if crossing > 0 {
                assert!(cell.triangle_count > 0, "config {config} has no triangles");
            }
            for &index in cell.triangles() {
                assert!(index < cell.vertex_count, "config {config}");
            }
            let row = &tables.vertices[config * CELL_EDGES..(config + 1) * CELL_EDGES];
            for &packed in &row[..crossing] {
                let (a, b) = (packed & 0xF, packed >> 4);
                assert!(a < b && b < 8);
                assert_ne!(is_inside(config as u8, a as u8), is_inside(config as u8, b as u8));
            }
        }
    }

    #[test]
    fn every_crossing_edge_is_used_by_a_triangle() {
        let tables = cell_tables();
        for cell in &tables.cells {
            for local in 0..cell.vertex_count {
                assert!(cell.triangles().contains(&local));
            }
        }
    }
}
