use arrayvec::ArrayVec;
use nalgebra::Vector3;

use crate::utils::safe_sqrt;

pub type Fp = f32;
pub type Vec3f = Vector3<Fp>;
pub type Color = Vec3f;

/// Hits closer than this are treated as the surface the ray starts on.
pub const MIN_HIT_DISTANCE: Fp = 0.01;
pub const MAX_RAY_DISTANCE: Fp = 20000.0;

pub const DEFAULT_REFRACTIVE_INDEX: Fp = 1.0;

#[derive(Clone, Debug)]
pub struct Ray {
    pub origin: Vec3f,
    pub direction: Vec3f,
}

impl Ray {
    pub fn new(origin: Vec3f, direction: Vec3f) -> Ray {
        Ray {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn at(&self, t: Fp) -> Vec3f {
        self.origin + self.direction * t
    }
}

/// Both parametric distances where `ray` crosses the sphere surface, nearest first.
pub fn intersect_sphere_all_points(ray: &Ray, center: &Vec3f, radius: Fp) -> ArrayVec<Fp, 2> {
    let dist = center - ray.origin;
    let b = ray.direction.dot(&dist);
    let discr = b * b - dist.dot(&dist) + radius * radius;
    let mut result = ArrayVec::<Fp, 2>::new();
    if discr >= 0.0 {
        let root = discr.sqrt();
        result.push(b - root);
        result.push(b + root);
    }
    result
}

pub fn intersect_sphere(ray: &Ray, center: &Vec3f, radius: Fp, upper_bound: Fp) -> Option<Fp> {
    intersect_sphere_all_points(ray, center, radius)
        .into_iter()
        .find(|t| MIN_HIT_DISTANCE < *t && *t < upper_bound)
}

/// `dir - normal * view_projection * 2`, where `view_projection = dir . normal`.
pub fn get_reflection_ray(direction: &Vec3f, normal: &Vec3f, view_projection: Fp) -> Vec3f {
    direction - normal * view_projection * 2.0
}

#[derive(Clone, Debug)]
pub struct Refraction {
    pub direction: Vec3f,
    pub cos_theta_t: Fp,
}

/// Snell-Descartes transmission of `direction` through a surface whose `normal`
/// faces the incoming ray. `ratio` is old index over new index.
pub fn get_refraction_ray(
    direction: &Vec3f,
    normal: &Vec3f,
    view_projection: Fp,
    ratio: Fp,
) -> Refraction {
    let cos_theta_i = view_projection.abs();
    let cos_theta_t = if cos_theta_i >= 1.0 {
        // parallel to the normal, no bend
        1.0
    } else {
        let sin_theta_t = ratio * safe_sqrt(1.0 - cos_theta_i * cos_theta_i);
        if sin_theta_t * sin_theta_t >= 1.0 {
            0.0
        } else {
            safe_sqrt(1.0 - sin_theta_t * sin_theta_t)
        }
    };
    let transmitted = (direction + normal * cos_theta_i) * ratio - normal * cos_theta_t;
    Refraction {
        direction: transmitted.normalize(),
        cos_theta_t,
    }
}
