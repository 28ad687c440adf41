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

//! The demo's static geometry: a long walled courtyard lined with columns and
//! hanging banners, sized to the area the scene's lights are scattered over.

use ember_core::math::{LinearRgba, Vec3};
use ember_core::renderer::Material;
use ember_data::{MeshData, MeshVertex};

const HALF_LENGTH: f32 = 1500.0;
const BACK_WALL_Z: f32 = -250.0;
const FRONT_WALL_Z: f32 = 180.0;
const WALL_HEIGHT: f32 = 1100.0;
const COLUMN_ROWS: [f32; 2] = [-120.0, 60.0];
const COLUMN_SPACING: f32 = 200.0;
const COLUMN_HALF_WIDTH: f32 = 20.0;
const COLUMN_HEIGHT: f32 = 400.0;

/// Accumulates quads for one subset.
#[derive(Default)]
struct QuadBatch {
    vertices: Vec<MeshVertex>,
    indices: Vec<u32>,
}

impl QuadBatch {
    /// Adds the quad `corner, corner + u, corner + u + v, corner + v`, wound
    /// counter-clockwise as seen from the side `normal` points to.
    fn quad(&mut self, corner: Vec3, u: Vec3, v: Vec3, normal: Vec3) {
        let (u, v) = if u.cross(v).dot(normal) >= 0.0 {
            (u, v)
        } else {
            (v, u)
        };
        let base = self.vertices.len() as u32;
        let n = normal.to_array();
        for (p, uv) in [
            (corner, [0.0, 1.0]),
            (corner + u, [1.0, 1.0]),
            (corner + u + v, [1.0, 0.0]),
            (corner + v, [0.0, 0.0]),
        ] {
            self.vertices.push(MeshVertex::new(p.to_array(), n, uv));
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Adds the five visible faces of an axis-aligned box standing on `base`.
    fn column(&mut self, base: Vec3, half_width: f32, height: f32) {
        let min = base - Vec3::new(half_width, 0.0, half_width);
        let size = Vec3::new(half_width * 2.0, height, half_width * 2.0);
        let dx = Vec3::new(size.x, 0.0, 0.0);
        let dy = Vec3::new(0.0, size.y, 0.0);
        let dz = Vec3::new(0.0, 0.0, size.z);

        self.quad(min, dy, dz, -Vec3::X);
        self.quad(min + dx, dy, dz, Vec3::X);
        self.quad(min, dx, dy, -Vec3::Z);
        self.quad(min + dz, dx, dy, Vec3::Z);
        self.quad(min + dy, dx, dz, Vec3::Y);
    }

    fn push_into(self, mesh: &mut MeshData, material: Material) {
        mesh.push_subset(&self.vertices, &self.indices, material);
    }
}

/// Builds the courtyard: floor, walls, columns, then the alpha-masked banners.
pub fn build() -> MeshData {
    let mut mesh = MeshData::default();
    let depth = FRONT_WALL_Z - BACK_WALL_Z;

    let mut floor = QuadBatch::default();
    floor.quad(
        Vec3::new(-HALF_LENGTH, 0.0, BACK_WALL_Z),
        Vec3::new(HALF_LENGTH * 2.0, 0.0, 0.0),
        Vec3::new(0.0, 0.0, depth),
        Vec3::Y,
    );
    floor.push_into(
        &mut mesh,
        Material::opaque(LinearRgba::rgb(0.55, 0.5, 0.45)).with_specular_power(4.0),
    );

    let mut walls = QuadBatch::default();
    let along = Vec3::new(HALF_LENGTH * 2.0, 0.0, 0.0);
    let up = Vec3::new(0.0, WALL_HEIGHT, 0.0);
    let across = Vec3::new(0.0, 0.0, depth);
    walls.quad(Vec3::new(-HALF_LENGTH, 0.0, BACK_WALL_Z), along, up, Vec3::Z);
    walls.quad(Vec3::new(-HALF_LENGTH, 0.0, FRONT_WALL_Z), along, up, -Vec3::Z);
    walls.quad(Vec3::new(-HALF_LENGTH, 0.0, BACK_WALL_Z), across, up, Vec3::X);
    walls.quad(Vec3::new(HALF_LENGTH, 0.0, BACK_WALL_Z), across, up, -Vec3::X);
    walls.push_into(&mut mesh, Material::opaque(LinearRgba::rgb(0.8, 0.75, 0.65)));

    let mut columns = QuadBatch::default();
    let mut banners = QuadBatch::default();
    let count = (HALF_LENGTH / COLUMN_SPACING) as i32;
    for &z in &COLUMN_ROWS {
        for i in -count + 1..count {
            let x = i as f32 * COLUMN_SPACING;
            columns.column(Vec3::new(x, 0.0, z), COLUMN_HALF_WIDTH, COLUMN_HEIGHT);

            if i % 2 == 0 {
                // Banners hang between columns; both faces are emitted.
                let corner = Vec3::new(x + COLUMN_HALF_WIDTH, COLUMN_HEIGHT * 0.4, z);
                let width = Vec3::new(COLUMN_SPACING - COLUMN_HALF_WIDTH * 2.0, 0.0, 0.0);
                let drop = Vec3::new(0.0, COLUMN_HEIGHT * 0.5, 0.0);
                banners.quad(corner, width, drop, Vec3::Z);
                banners.quad(corner, width, drop, -Vec3::Z);
            }
        }
    }
    columns.push_into(
        &mut mesh,
        Material::opaque(LinearRgba::rgb(0.7, 0.68, 0.62)).with_specular_power(20.0),
    );
    banners.push_into(
        &mut mesh,
        Material::opaque(LinearRgba::new(0.6, 0.1, 0.1, 1.0)).with_alpha_cutoff(0.5),
    );

    mesh
}
