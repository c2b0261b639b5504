use glam::IVec3;
use noise::{NoiseFn, Perlin};

use crate::coords::CHUNK_WIDTH;

// Perlin noise is zero at every lattice point, so samples are nudged off the
// integer grid.
const LATTICE_NUDGE: f64 = 0.1;

/// Seeded scalar field shared by every generation pass.
#[derive(Clone)]
pub struct NoiseField {
    seed: u32,
    perlin: Perlin,
}

impl NoiseField {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            perlin: Perlin::new(seed),
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// 2D sample in `[0, 1]`. `scale` is expressed per chunk width, so a scale
    /// of 1 completes roughly one noise period every chunk.
    pub fn get_2d(&self, x: i32, z: i32, offset: f32, scale: f32) -> f32 {
        let offset = f64::from(offset);
        let scale = f64::from(scale);
        let width = CHUNK_WIDTH as f64;
        let px = (f64::from(x) + offset + LATTICE_NUDGE) / width * scale;
        let pz = (f64::from(z) + offset + LATTICE_NUDGE) / width * scale;
        to_unit(self.perlin.get([px, pz]))
    }

    /// 3D sample in `[0, 1]`.
    pub fn get_3d(&self, pos: IVec3, offset: f32, scale: f32) -> f32 {
        let offset = f64::from(offset);
        let scale = f64::from(scale);
        let sample = |value: i32| (f64::from(value) + offset + LATTICE_NUDGE) * scale;
        to_unit(
            self.perlin
                .get([sample(pos.x), sample(pos.y), sample(pos.z)]),
        )
    }

    pub fn passes_3d(&self, pos: IVec3, offset: f32, scale: f32, threshold: f32) -> bool {
        self.get_3d(pos, offset, scale) > threshold
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").field("seed", &self.seed).finish()
    }
}

fn to_unit(value: f64) -> f32 {
    (((value + 1.0) * 0.5).clamp(0.0, 1.0)) as f32
}

#[cfg(test)]
mod tests {
    use glam::IVec3;

    use super::NoiseField;

    #[test]
    fn same_seed_gives_same_samples() {
        let a = NoiseField::new(42);
        let b = NoiseField::new(42);
        for x in -20..20 {
            assert_eq!(a.get_2d(x, x * 3, 0.0, 0.25), b.get_2d(x, x * 3, 0.0, 0.25));
            let pos = IVec3::new(x, x + 7, -x);
            assert_eq!(a.get_3d(pos, 5.0, 0.1), b.get_3d(pos, 5.0, 0.1));
        }
    }

    #[test]
    fn samples_stay_in_unit_range() {
        let field = NoiseField::new(7);
        for x in -50..50 {
            for z in -5..5 {
                let value = field.get_2d(x * 13, z * 29, 123.0, 1.3);
                assert!((0.0..=1.0).contains(&value), "{value}");
            }
        }
    }

    #[test]
    fn threshold_test_is_strict() {
        let field = NoiseField::new(1);
        let pos = IVec3::new(3, 60, -8);
        let value = field.get_3d(pos, 0.0, 0.2);
        assert!(!field.passes_3d(pos, 0.0, 0.2, value));
        assert!(field.passes_3d(pos, 0.0, 0.2, value - 0.001));
    }

    #[test]
    fn different_seeds_diverge_somewhere() {
        let a = NoiseField::new(1);
        let b = NoiseField::new(2);
        let differs = (0..64).any(|x| a.get_2d(x, 0, 0.0, 0.7) != b.get_2d(x, 0, 0.0, 0.7));
        assert!(differs);
    }
}
