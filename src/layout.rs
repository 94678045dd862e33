//! Binary layout shared by the host marshaling code and the device kernel.
//!
//! Every struct here is `#[repr(C)]` with explicit padding so that vector
//! fields start on 16-byte boundaries. Field order is part of the contract.

use bytemuck::{Pod, Zeroable};

use crate::geometry::{Color, Vec3f};
use crate::scene::{AxisBox, Light, Material, MaterialKind, Scene, Sphere};

pub const MATERIAL_KIND_FLAT: u32 = 0;
pub const MATERIAL_KIND_CHECKERBOARD: u32 = 1;
pub const MATERIAL_KIND_CIRCLES: u32 = 2;
pub const MATERIAL_KIND_WOOD: u32 = 3;

fn vec4(v: &Vec3f) -> [f32; 4] {
    [v.x, v.y, v.z, 0.0]
}

fn vec3(v: &[f32; 4]) -> Vec3f {
    Vec3f::new(v[0], v[1], v[2])
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub kind: u32,
    pub _pad0: [u32; 3],
    pub diffuse: [f32; 4],
    pub diffuse2: [f32; 4],
    pub offset: [f32; 4],
    pub size: f32,
    pub _pad1: [u32; 3],
    pub specular: [f32; 4],
    pub power: f32,
    pub reflection: f32,
    pub refraction: f32,
    pub density: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: [f32; 4],
    pub intensity: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSphere {
    pub center: [f32; 4],
    pub radius: f32,
    pub material_id: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuBox {
    pub p1: [f32; 4],
    pub p2: [f32; 4],
    pub material_id: u32,
    pub _pad: [u32; 3],
}

/// Per-block dispatch parameters, passed by value as the first kernel argument.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct JobParams {
    pub aa_level: u32,
    pub test_mode: u32,
    pub block_size: u32,
    pub total_width: u32,
    pub total_height: u32,
    pub block_index: u32,
    pub blocks_wide: u32,
    pub blocks_high: u32,
    pub camera_position: [f32; 4],
    pub camera_rotation: f32,
    pub camera_fov: f32,
    pub exposure: f32,
    pub skybox_material: u32,
    pub num_materials: u32,
    pub num_lights: u32,
    pub num_spheres: u32,
    pub num_boxes: u32,
}

const _: () = assert!(std::mem::size_of::<GpuMaterial>() == 112);
const _: () = assert!(std::mem::size_of::<GpuLight>() == 32);
const _: () = assert!(std::mem::size_of::<GpuSphere>() == 32);
const _: () = assert!(std::mem::size_of::<GpuBox>() == 48);
const _: () = assert!(std::mem::size_of::<JobParams>() == 80);

impl From<&Material> for GpuMaterial {
    fn from(material: &Material) -> Self {
        GpuMaterial {
            kind: match material.kind {
                MaterialKind::Flat => MATERIAL_KIND_FLAT,
                MaterialKind::Checkerboard => MATERIAL_KIND_CHECKERBOARD,
                MaterialKind::Circles => MATERIAL_KIND_CIRCLES,
                MaterialKind::Wood => MATERIAL_KIND_WOOD,
            },
            diffuse: vec4(&material.diffuse),
            diffuse2: vec4(&material.diffuse2),
            offset: vec4(&material.offset),
            size: material.size,
            specular: vec4(&material.specular),
            power: material.power,
            reflection: material.reflection,
            refraction: material.refraction,
            density: material.density,
            ..Default::default()
        }
    }
}

impl GpuMaterial {
    /// Unknown tags fall back to flat shading.
    pub fn kind(&self) -> MaterialKind {
        match self.kind {
            MATERIAL_KIND_CHECKERBOARD => MaterialKind::Checkerboard,
            MATERIAL_KIND_CIRCLES => MaterialKind::Circles,
            MATERIAL_KIND_WOOD => MaterialKind::Wood,
            _ => MaterialKind::Flat,
        }
    }

    pub fn diffuse(&self) -> Color {
        vec3(&self.diffuse)
    }

    pub fn diffuse2(&self) -> Color {
        vec3(&self.diffuse2)
    }

    pub fn offset(&self) -> Vec3f {
        vec3(&self.offset)
    }

    pub fn specular(&self) -> Color {
        vec3(&self.specular)
    }
}

impl From<&Light> for GpuLight {
    fn from(light: &Light) -> Self {
        GpuLight {
            position: vec4(&light.position),
            intensity: vec4(&light.intensity),
        }
    }
}

impl GpuLight {
    pub fn position(&self) -> Vec3f {
        vec3(&self.position)
    }

    pub fn intensity(&self) -> Color {
        vec3(&self.intensity)
    }
}

impl From<&Sphere> for GpuSphere {
    fn from(sphere: &Sphere) -> Self {
        GpuSphere {
            center: vec4(&sphere.center),
            radius: sphere.radius,
            material_id: sphere.material_id,
            _pad: [0; 2],
        }
    }
}

impl GpuSphere {
    pub fn center(&self) -> Vec3f {
        vec3(&self.center)
    }
}

impl From<&AxisBox> for GpuBox {
    fn from(aabb: &AxisBox) -> Self {
        GpuBox {
            p1: vec4(&aabb.p1),
            p2: vec4(&aabb.p2),
            material_id: aabb.material_id,
            _pad: [0; 3],
        }
    }
}

impl GpuBox {
    pub fn p1(&self) -> Vec3f {
        vec3(&self.p1)
    }

    pub fn p2(&self) -> Vec3f {
        vec3(&self.p2)
    }
}

impl JobParams {
    pub fn camera_position(&self) -> Vec3f {
        vec3(&self.camera_position)
    }

    pub fn total_blocks(&self) -> u32 {
        self.blocks_wide * self.blocks_high
    }

    /// Pixel coordinates of the top-left cell of the current block.
    pub fn block_origin(&self) -> (u32, u32) {
        (
            (self.block_index % self.blocks_wide) * self.block_size,
            (self.block_index / self.blocks_wide) * self.block_size,
        )
    }
}

/// Host copies of the four read-only scene arrays in wire layout.
///
/// Arrays are never empty: a scene without spheres (or boxes, or lights)
/// still gets one zeroed element, and the real counts travel in [`JobParams`].
#[derive(Clone, Debug)]
pub struct SceneBuffers {
    pub materials: Vec<GpuMaterial>,
    pub lights: Vec<GpuLight>,
    pub spheres: Vec<GpuSphere>,
    pub boxes: Vec<GpuBox>,
}

fn at_least_one<T: Pod>(mut items: Vec<T>) -> Vec<T> {
    if items.is_empty() {
        items.push(T::zeroed());
    }
    items
}

impl SceneBuffers {
    pub fn from_scene(scene: &Scene) -> SceneBuffers {
        SceneBuffers {
            materials: at_least_one(scene.materials.iter().map(GpuMaterial::from).collect()),
            lights: at_least_one(scene.lights.iter().map(GpuLight::from).collect()),
            spheres: at_least_one(scene.spheres.iter().map(GpuSphere::from).collect()),
            boxes: at_least_one(scene.boxes.iter().map(GpuBox::from).collect()),
        }
    }
}

pub fn log_layout_sizes() {
    log::debug!("sizeof(GpuMaterial): {}", std::mem::size_of::<GpuMaterial>());
    log::debug!("sizeof(GpuLight):    {}", std::mem::size_of::<GpuLight>());
    log::debug!("sizeof(GpuSphere):   {}", std::mem::size_of::<GpuSphere>());
    log::debug!("sizeof(GpuBox):      {}", std::mem::size_of::<GpuBox>());
    log::debug!("sizeof(JobParams):   {}", std::mem::size_of::<JobParams>());
}
