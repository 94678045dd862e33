use std::f32::consts::TAU;
use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::geometry::{Color, Fp, Vec3f};
use crate::layout::GpuMaterial;
use crate::scene::MaterialKind;

const NOISE_SEED: u64 = 0x5eed_0f_57a1;
const GRAIN_TURBULENCE: Fp = 0.35;

struct Permutation([u8; 512]);

// Fixed seed, so every thread and every run sees the same table.
fn permutation() -> &'static Permutation {
    static TABLE: OnceLock<Permutation> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(NOISE_SEED);
        let mut values: Vec<u8> = (0..=255).collect();
        values.shuffle(&mut rng);
        let mut table = [0u8; 512];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = values[i & 255];
        }
        Permutation(table)
    })
}

fn lattice(x: i32, y: i32, z: i32) -> Fp {
    let p = &permutation().0;
    let h = p[p[p[(x & 255) as usize] as usize + (y & 255) as usize] as usize + (z & 255) as usize];
    h as Fp / 255.0
}

fn smooth(t: Fp) -> Fp {
    t * t * (3.0 - 2.0 * t)
}

fn lerp(a: Fp, b: Fp, t: Fp) -> Fp {
    a + (b - a) * t
}

/// Trilinear value noise in `[0, 1]`.
pub fn value_noise(point: &Vec3f) -> Fp {
    let base = point.map(|c| c.floor());
    let (x, y, z) = (base.x as i32, base.y as i32, base.z as i32);
    let f = point - base;
    let (u, v, w) = (smooth(f.x), smooth(f.y), smooth(f.z));

    let x00 = lerp(lattice(x, y, z), lattice(x + 1, y, z), u);
    let x10 = lerp(lattice(x, y + 1, z), lattice(x + 1, y + 1, z), u);
    let x01 = lerp(lattice(x, y, z + 1), lattice(x + 1, y, z + 1), u);
    let x11 = lerp(lattice(x, y + 1, z + 1), lattice(x + 1, y + 1, z + 1), u);
    lerp(lerp(x00, x10, v), lerp(x01, x11, v), w)
}

/// Diffuse colour of `material` at world position `point`.
pub fn texture_color(material: &GpuMaterial, point: &Vec3f) -> Color {
    let q = (point - material.offset()) / material.size;
    match material.kind() {
        MaterialKind::Flat => material.diffuse(),
        MaterialKind::Checkerboard => {
            let which = (q.x.floor() as i32 + q.y.floor() as i32 + q.z.floor() as i32) & 1;
            if which != 0 {
                material.diffuse()
            } else {
                material.diffuse2()
            }
        }
        MaterialKind::Circles => {
            let ring = (q.x * q.x + q.z * q.z).sqrt().floor() as i32;
            if ring & 1 == 0 {
                material.diffuse()
            } else {
                material.diffuse2()
            }
        }
        MaterialKind::Wood => {
            let grain = (q.x * q.x + q.z * q.z).sqrt() + GRAIN_TURBULENCE * value_noise(&q);
            let t = 0.5 + 0.5 * (grain * TAU).sin();
            material.diffuse() * (1.0 - t) + material.diffuse2() * t
        }
    }
}
