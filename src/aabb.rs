use arrayvec::ArrayVec;

use crate::geometry::{Fp, Ray, Vec3f, MIN_HIT_DISTANCE};

#[derive(Clone, Debug)]
pub struct Aabb {
    pub min: Vec3f,
    pub max: Vec3f,
}

impl Aabb {
    pub fn new(p1: Vec3f, p2: Vec3f) -> Aabb {
        Aabb {
            min: p1.inf(&p2),
            max: p1.sup(&p2),
        }
    }

    /// Entry and exit distances of the slab test, entry first.
    pub fn intersect_all_points(&self, ray: &Ray) -> ArrayVec<Fp, 2> {
        let mut t_min = Fp::NEG_INFINITY;
        let mut t_max = Fp::INFINITY;
        for axis in 0..3 {
            let inverse = 1.0 / ray.direction[axis];
            let mut t_near = (self.min[axis] - ray.origin[axis]) * inverse;
            let mut t_far = (self.max[axis] - ray.origin[axis]) * inverse;
            if inverse < 0.0 {
                std::mem::swap(&mut t_near, &mut t_far);
            }
            // f32::max/min drop the NaN from 0 * inf on a parallel axis
            t_min = Fp::max(t_min, t_near);
            t_max = Fp::min(t_max, t_far);
        }
        let mut result = ArrayVec::<Fp, 2>::new();
        if t_min <= t_max {
            result.push(t_min);
            result.push(t_max);
        }
        result
    }

    pub fn intersect(&self, ray: &Ray, upper_bound: Fp) -> Option<Fp> {
        self.intersect_all_points(ray)
            .into_iter()
            .find(|t| MIN_HIT_DISTANCE < *t && *t < upper_bound)
    }

    /// Outward normal of the face closest to `point`.
    pub fn normal_at(&self, point: &Vec3f) -> Vec3f {
        let mut best = Fp::INFINITY;
        let mut normal = Vec3f::zeros();
        for axis in 0..3 {
            for (face, sign) in [(self.min[axis], -1.0), (self.max[axis], 1.0)] {
                let distance = (point[axis] - face).abs();
                if distance < best {
                    best = distance;
                    normal = Vec3f::zeros();
                    normal[axis] = sign;
                }
            }
        }
        normal
    }
}
