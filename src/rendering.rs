use crate::aabb::Aabb;
use crate::geometry::{
    get_reflection_ray, get_refraction_ray, intersect_sphere, Color, Fp, Ray, Vec3f,
    DEFAULT_REFRACTIVE_INDEX, MAX_RAY_DISTANCE,
};
use crate::layout::{GpuBox, GpuLight, GpuMaterial, GpuSphere};
use crate::texture::texture_color;

pub const MAX_RAYS_CAST: u32 = 10;

/// Read-only scene arrays as the kernel sees them, trimmed to the real counts.
#[derive(Clone, Copy, Debug)]
pub struct KernelScene<'a> {
    pub materials: &'a [GpuMaterial],
    pub lights: &'a [GpuLight],
    pub spheres: &'a [GpuSphere],
    pub boxes: &'a [GpuBox],
    pub skybox_material: u32,
}

#[derive(Clone, Copy, Debug)]
enum HitObject {
    Sphere(usize),
    Box(usize),
}

pub struct Intersection<'a> {
    pub position: Vec3f,
    /// Faces against the incoming ray.
    pub normal: Vec3f,
    /// `direction . normal`, never positive.
    pub view_projection: Fp,
    pub material: &'a GpuMaterial,
    pub inside_object: bool,
}

#[derive(Clone, Debug)]
pub struct TraceResult {
    pub color: Color,
    /// Number of surfaces the path met.
    pub bounces: u32,
    pub coef: Fp,
    /// Direction of the last ray cast.
    pub direction: Vec3f,
}

fn object_intersection(scene: &KernelScene, ray: &Ray, upper_bound: Fp) -> Option<(Fp, HitObject)> {
    let mut nearest = None;
    let mut t_best = upper_bound;
    for (index, sphere) in scene.spheres.iter().enumerate() {
        if let Some(t) = intersect_sphere(ray, &sphere.center(), sphere.radius, t_best) {
            t_best = t;
            nearest = Some((t, HitObject::Sphere(index)));
        }
    }
    for (index, aabb) in scene.boxes.iter().enumerate() {
        if let Some(t) = Aabb::new(aabb.p1(), aabb.p2()).intersect(ray, t_best) {
            t_best = t;
            nearest = Some((t, HitObject::Box(index)));
        }
    }
    nearest
}

fn calculate_intersection_response<'a>(
    scene: &KernelScene<'a>,
    ray: &Ray,
    t: Fp,
    object: HitObject,
) -> Intersection<'a> {
    let position = ray.at(t);
    let (outward, material_id) = match object {
        HitObject::Sphere(index) => {
            let sphere = &scene.spheres[index];
            ((position - sphere.center()).normalize(), sphere.material_id)
        }
        HitObject::Box(index) => {
            let aabb = &scene.boxes[index];
            (
                Aabb::new(aabb.p1(), aabb.p2()).normal_at(&position),
                aabb.material_id,
            )
        }
    };
    let mut normal = outward;
    let mut view_projection = ray.direction.dot(&normal);
    let inside_object = view_projection > 0.0;
    if inside_object {
        normal = -normal;
        view_projection = -view_projection;
    }
    Intersection {
        position,
        normal,
        view_projection,
        material: &scene.materials[material_id as usize],
        inside_object,
    }
}

fn is_in_shadow(scene: &KernelScene, light_ray: &Ray, light_distance: Fp) -> bool {
    object_intersection(scene, light_ray, light_distance).is_some()
}

/// Diffuse plus Blinn-Phong specular from every unoccluded light.
pub fn apply_lighting(scene: &KernelScene, view_ray: &Ray, intersect: &Intersection) -> Color {
    let mut output = Color::zeros();
    let material = intersect.material;
    for light in scene.lights {
        let dist = light.position() - intersect.position;
        if intersect.normal.dot(&dist) <= 0.0 {
            continue;
        }
        let t = dist.norm();
        if t <= 0.0 {
            continue;
        }
        let light_ray = Ray {
            origin: intersect.position,
            direction: dist / t,
        };
        if is_in_shadow(scene, &light_ray, t) {
            continue;
        }

        let lambert = light_ray.direction.dot(&intersect.normal);
        output += texture_color(material, &intersect.position).component_mul(&light.intensity()) * lambert;

        let blinn_dir = light_ray.direction - view_ray.direction;
        let temp = blinn_dir.norm();
        if temp != 0.0 {
            let blinn_term = Fp::max((blinn_dir / temp).dot(&intersect.normal), 0.0).powf(material.power);
            output += material.specular().component_mul(&light.intensity()) * blinn_term;
        }
    }
    output
}

pub fn trace_path(scene: &KernelScene, mut view_ray: Ray) -> TraceResult {
    let mut output = Color::zeros();
    let mut current_refractive_index = DEFAULT_REFRACTIVE_INDEX;
    let mut coef: Fp = 1.0;
    let mut bounces = 0;

    while bounces < MAX_RAYS_CAST {
        let Some((t, object)) = object_intersection(scene, &view_ray, MAX_RAY_DISTANCE) else {
            break;
        };
        bounces += 1;
        let intersect = calculate_intersection_response(scene, &view_ray, t, object);

        if !intersect.inside_object {
            output += apply_lighting(scene, &view_ray, &intersect) * coef;
        }

        let material = intersect.material;
        if material.reflection != 0.0 {
            view_ray = Ray {
                origin: intersect.position,
                direction: get_reflection_ray(
                    &view_ray.direction,
                    &intersect.normal,
                    intersect.view_projection,
                ),
            };
            coef *= material.reflection;
        } else if material.refraction != 0.0 {
            let old_refractive_index = current_refractive_index;
            current_refractive_index = if intersect.inside_object {
                DEFAULT_REFRACTIVE_INDEX
            } else {
                material.density
            };
            let refraction = get_refraction_ray(
                &view_ray.direction,
                &intersect.normal,
                intersect.view_projection,
                old_refractive_index / current_refractive_index,
            );
            view_ray = Ray {
                origin: intersect.position,
                direction: refraction.direction,
            };
            coef *= material.refraction;
        } else {
            // fully absorbing: no secondary ray, no sky
            return TraceResult {
                color: output,
                bounces,
                coef,
                direction: view_ray.direction,
            };
        }
    }

    if coef > 0.0 {
        output += scene.materials[scene.skybox_material as usize].diffuse() * coef;
    }
    TraceResult {
        color: output,
        bounces,
        coef,
        direction: view_ray.direction,
    }
}

pub fn trace_ray(scene: &KernelScene, view_ray: Ray) -> Color {
    trace_path(scene, view_ray).color
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::SceneBuffers;
    use crate::scene::{AxisBox, Light, Material, Scene, Sphere};

    fn kernel_scene<'a>(buffers: &'a SceneBuffers, scene: &Scene) -> KernelScene<'a> {
        KernelScene {
            materials: &buffers.materials[..scene.materials.len()],
            lights: &buffers.lights[..scene.lights.len()],
            spheres: &buffers.spheres[..scene.spheres.len()],
            boxes: &buffers.boxes[..scene.boxes.len()],
            skybox_material: scene.skybox_material_id,
        }
    }

    fn sky_and(material: Material) -> Vec<Material> {
        vec![
            Material {
                diffuse: Color::new(0.2, 0.4, 0.8),
                ..Default::default()
            },
            material,
        ]
    }

    #[test]
    fn miss_returns_skybox_colour() {
        let scene = Scene {
            materials: sky_and(Material::default()),
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.3, 0.1, 1.0));
        let result = trace_path(&kernel_scene(&buffers, &scene), ray);
        assert_eq!(result.color, Color::new(0.2, 0.4, 0.8));
        assert_eq!(result.bounces, 0);
        assert_eq!(result.coef, 1.0);
    }

    #[test]
    fn nested_mirrors_stop_after_max_bounces() {
        let mirror = Material {
            reflection: 0.5,
            ..Default::default()
        };
        let scene = Scene {
            materials: sky_and(mirror),
            spheres: vec![
                Sphere {
                    center: Vec3f::zeros(),
                    radius: 5.0,
                    material_id: 1,
                },
                Sphere {
                    center: Vec3f::zeros(),
                    radius: 10.0,
                    material_id: 1,
                },
            ],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.0, 0.0, 1.0));
        let result = trace_path(&kernel_scene(&buffers, &scene), ray);
        assert_eq!(result.bounces, MAX_RAYS_CAST);
        assert!(result.coef > 0.0);
        assert!((result.coef - 0.5f32.powi(MAX_RAYS_CAST as i32)).abs() < 1e-9);
        // no lights: only the attenuated sky survives
        let expected = Color::new(0.2, 0.4, 0.8) * result.coef;
        assert!((result.color - expected).norm() < 1e-9);
    }

    #[test]
    fn absorbing_surface_gets_no_sky() {
        let scene = Scene {
            materials: sky_and(Material {
                diffuse: Color::new(1.0, 0.0, 0.0),
                ..Default::default()
            }),
            boxes: vec![AxisBox {
                p1: Vec3f::new(-1.0, -1.0, 4.0),
                p2: Vec3f::new(1.0, 1.0, 5.0),
                material_id: 1,
            }],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.0, 0.0, 1.0));
        let result = trace_path(&kernel_scene(&buffers, &scene), ray);
        assert_eq!(result.bounces, 1);
        assert_eq!(result.color, Color::zeros());
    }

    #[test]
    fn lit_face_gets_lambert_and_specular() {
        let scene = Scene {
            materials: sky_and(Material {
                diffuse: Color::new(1.0, 0.0, 0.0),
                specular: Color::new(0.0, 1.0, 0.0),
                power: 10.0,
                ..Default::default()
            }),
            lights: vec![Light {
                position: Vec3f::new(0.0, 0.0, 0.0),
                intensity: Color::new(1.0, 1.0, 1.0),
            }],
            boxes: vec![AxisBox {
                p1: Vec3f::new(-1.0, -1.0, 4.0),
                p2: Vec3f::new(1.0, 1.0, 5.0),
                material_id: 1,
            }],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.0, 0.0, 1.0));
        let color = trace_ray(&kernel_scene(&buffers, &scene), ray);
        // head-on: lambert = 1 and the half vector is the normal
        assert!((color - Color::new(1.0, 1.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn occluded_light_contributes_nothing() {
        let scene = Scene {
            materials: sky_and(Material {
                diffuse: Color::new(1.0, 0.0, 0.0),
                ..Default::default()
            }),
            lights: vec![Light {
                position: Vec3f::new(0.0, 0.0, -10.0),
                intensity: Color::new(1.0, 1.0, 1.0),
            }],
            spheres: vec![Sphere {
                center: Vec3f::new(0.0, 0.0, -5.0),
                radius: 1.0,
                material_id: 1,
            }],
            boxes: vec![AxisBox {
                p1: Vec3f::new(-1.0, -1.0, 4.0),
                p2: Vec3f::new(1.0, 1.0, 5.0),
                material_id: 1,
            }],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        // travels away from the light and hits the box; the sphere blocks the shadow ray
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.0, 0.0, 1.0));
        assert_eq!(trace_ray(&kernel_scene(&buffers, &scene), ray), Color::zeros());
    }

    #[test]
    fn glass_sphere_passes_head_on_ray_straight_through() {
        let glass = Material {
            refraction: 1.0,
            density: 1.5,
            ..Default::default()
        };
        let scene = Scene {
            materials: sky_and(glass),
            spheres: vec![Sphere {
                center: Vec3f::new(0.0, 0.0, 5.0),
                radius: 1.0,
                material_id: 1,
            }],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.0, 0.0, 1.0));
        let result = trace_path(&kernel_scene(&buffers, &scene), ray);
        // enters and leaves, then reaches the sky undimmed
        assert_eq!(result.bounces, 2);
        assert!((result.color - Color::new(0.2, 0.4, 0.8)).norm() < 1e-5);
    }

    #[test]
    fn reflection_wins_over_refraction() {
        let both = Material {
            reflection: 0.5,
            refraction: 0.9,
            density: 1.5,
            ..Default::default()
        };
        let scene = Scene {
            materials: sky_and(both),
            spheres: vec![Sphere {
                center: Vec3f::new(0.0, 0.0, 5.0),
                radius: 1.0,
                material_id: 1,
            }],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let ray = Ray::new(Vec3f::zeros(), Vec3f::new(0.0, 0.0, 1.0));
        let result = trace_path(&kernel_scene(&buffers, &scene), ray);
        assert_eq!(result.bounces, 1);
        assert_eq!(result.coef, 0.5);
        assert!((result.direction - Vec3f::new(0.0, 0.0, -1.0)).norm() < 1e-5);
        assert!((result.color - Color::new(0.1, 0.2, 0.4)).norm() < 1e-5);
    }

    #[test]
    fn oblique_ray_leaves_glass_slab_parallel_to_entry() {
        let glass = Material {
            refraction: 1.0,
            density: 1.5,
            ..Default::default()
        };
        let scene = Scene {
            materials: sky_and(glass),
            boxes: vec![AxisBox {
                p1: Vec3f::new(-10.0, -10.0, 4.0),
                p2: Vec3f::new(10.0, 10.0, 5.0),
                material_id: 1,
            }],
            ..Default::default()
        };
        let buffers = SceneBuffers::from_scene(&scene);
        let entry = Vec3f::new(0.3, 0.0, 1.0).normalize();
        let result = trace_path(&kernel_scene(&buffers, &scene), Ray::new(Vec3f::zeros(), entry));
        // back in air after the second face, so the index ratio undoes the first bend
        assert_eq!(result.bounces, 2);
        assert!((result.direction - entry).norm() < 1e-4);
        assert!((result.color - Color::new(0.2, 0.4, 0.8)).norm() < 1e-5);
    }
}
