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

//! Transient lights and the seeded placement of the static light set.

use crate::config::SceneConfig;
use ember_core::math::Vec3;
use ember_core::renderer::PointLight;
use rand::Rng;

/// Distance a moving light travels per second.
pub const MOVING_LIGHT_SPEED: f32 = 100.0;

/// Age at which a moving light is removed, in seconds.
pub const MOVING_LIGHT_LIFETIME: f32 = 15.0;

/// Radius range of fired lights.
pub const FIRED_LIGHT_RADIUS: (f32, f32) = (50.0, 100.0);

/// A point light travelling in a straight line for a limited time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingLight {
    /// The light itself. Its position advances every update.
    pub light: PointLight,
    /// Normalized travel direction.
    pub direction: Vec3,
    /// Seconds since the light was fired.
    pub lifetime: f32,
}

impl MovingLight {
    /// Creates a light at `light.position` moving along `direction`.
    pub fn new(light: PointLight, direction: Vec3) -> Self {
        Self {
            light,
            direction: direction.normalize(),
            lifetime: 0.0,
        }
    }

    /// Fires a light from `origin` with a random radius and color.
    pub fn fire<R: Rng>(rng: &mut R, origin: Vec3, direction: Vec3) -> Self {
        let radius = rng.gen_range(FIRED_LIGHT_RADIUS.0..FIRED_LIGHT_RADIUS.1);
        let color = random_color(rng);
        Self::new(PointLight::new(origin, radius, color), direction)
    }

    /// Moves the light and ages it by `dt` seconds.
    pub fn advance(&mut self, dt: f32) {
        self.light.position += self.direction * (MOVING_LIGHT_SPEED * dt);
        self.lifetime += dt;
    }

    /// Returns `true` once the light has reached its lifetime limit.
    pub fn is_expired(&self) -> bool {
        self.lifetime >= MOVING_LIGHT_LIFETIME
    }
}

fn random_color<R: Rng>(rng: &mut R) -> Vec3 {
    let r = rng.gen::<f32>();
    let g = rng.gen::<f32>();
    let b = rng.gen::<f32>();
    Vec3::new(r, g, b)
}

#[derive(Clone, Copy)]
enum Height {
    Range(f32, f32),
    Fixed(f32),
}

/// Bounds of one group of randomly placed lights.
struct Placement {
    x: (f32, f32),
    y: Height,
    z: (f32, f32),
    radius: (f32, f32),
}

impl Placement {
    fn sample<R: Rng>(&self, rng: &mut R) -> PointLight {
        let x = rng.gen_range(self.x.0..=self.x.1);
        let y = match self.y {
            Height::Range(lo, hi) => rng.gen_range(lo..=hi),
            Height::Fixed(y) => y,
        };
        let z = rng.gen_range(self.z.0..=self.z.1);
        let radius = rng.gen_range(self.radius.0..=self.radius.1);
        let color = random_color(rng);
        PointLight::new(Vec3::new(x, y, z), radius, color)
    }
}

const FLOOR: Placement = Placement {
    x: (-1400.0, 1400.0),
    y: Height::Fixed(5.0),
    z: (-150.0, 150.0),
    radius: (250.0, 350.0),
};

const NEAR_WALL: Placement = Placement {
    x: (-1000.0, 1000.0),
    y: Height::Range(250.0, 1000.0),
    z: (-240.0, -220.0),
    radius: (150.0, 250.0),
};

const FAR_WALL: Placement = Placement {
    x: (-1000.0, 1000.0),
    y: Height::Range(250.0, 1000.0),
    z: (150.0, 170.0),
    radius: (150.0, 250.0),
};

/// Places the static lights of a scene: a band over the floor, then the two walls.
///
/// The wall count is split evenly, the first wall taking the odd light.
pub fn populate_static_lights<R: Rng>(
    config: &SceneConfig,
    rng: &mut R,
) -> Vec<PointLight> {
    let near_wall = config.wall_lights.div_ceil(2);
    let far_wall = config.wall_lights - near_wall;

    let mut lights = Vec::with_capacity(config.static_light_count());
    for (placement, count) in [
        (&FLOOR, config.floor_lights),
        (&NEAR_WALL, near_wall),
        (&FAR_WALL, far_wall),
    ] {
        lights.extend((0..count).map(|_| placement.sample(rng)));
    }
    lights
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn light() -> MovingLight {
        MovingLight::new(PointLight::new(Vec3::ZERO, 75.0, Vec3::ONE), Vec3::Z)
    }

    #[test]
    fn advance_moves_at_fixed_speed() {
        let mut l = light();
        l.advance(0.5);
        assert_relative_eq!(l.light.position.z, 50.0);
        assert_relative_eq!(l.lifetime, 0.5);
    }

    #[test]
    fn expiry_starts_exactly_at_the_limit() {
        let mut l = light();
        l.lifetime = MOVING_LIGHT_LIFETIME - 0.001;
        assert!(!l.is_expired());
        l.lifetime = MOVING_LIGHT_LIFETIME;
        assert!(l.is_expired());
    }

    #[test]
    fn fired_lights_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let l = MovingLight::fire(&mut rng, Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0));
            assert!((50.0..100.0).contains(&l.light.radius));
            assert_relative_eq!(l.direction.length(), 1.0, epsilon = 1e-6);
            for c in l.light.color.to_array() {
                assert!((0.0..1.0).contains(&c));
            }
        }
    }

    #[test]
    fn static_lights_follow_their_groups() {
        let config = SceneConfig::default();
        let mut rng = StdRng::seed_from_u64(config.light_seed);
        let lights = populate_static_lights(&config, &mut rng);
        assert_eq!(lights.len(), 60);

        for l in &lights[..30] {
            assert_eq!(l.position.y, 5.0);
            assert!((-1400.0..=1400.0).contains(&l.position.x));
            assert!((-150.0..=150.0).contains(&l.position.z));
            assert!((250.0..=350.0).contains(&l.radius));
        }
        for l in &lights[30..45] {
            assert!((-240.0..=-220.0).contains(&l.position.z));
            assert!((250.0..=1000.0).contains(&l.position.y));
        }
        for l in &lights[45..] {
            assert!((150.0..=170.0).contains(&l.position.z));
            assert!((150.0..=250.0).contains(&l.radius));
        }
    }

    #[test]
    fn placement_is_reproducible_from_the_seed() {
        let config = SceneConfig::default();
        let a = populate_static_lights(&config, &mut StdRng::seed_from_u64(1));
        let b = populate_static_lights(&config, &mut StdRng::seed_from_u64(1));
        let c = populate_static_lights(&config, &mut StdRng::seed_from_u64(2));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn odd_wall_counts_favor_the_near_wall() {
        let config = SceneConfig {
            floor_lights: 0,
            wall_lights: 3,
            ..SceneConfig::default()
        };
        let lights = populate_static_lights(&config, &mut StdRng::seed_from_u64(1));
        let near = lights.iter().filter(|l| l.position.z < 0.0).count();
        assert_eq!(near, 2);
    }
}
