use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::geometry::{Color, Fp, Vec3f};

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to read scene file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Invalid scene: {0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialKind {
    Flat,
    Checkerboard,
    Circles,
    Wood,
}

#[derive(Clone, Debug)]
pub struct Material {
    pub kind: MaterialKind,
    pub diffuse: Color,
    pub diffuse2: Color,
    pub offset: Vec3f,
    pub size: Fp,
    pub specular: Color,
    pub power: Fp,
    pub reflection: Fp,
    pub refraction: Fp,
    pub density: Fp,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            kind: MaterialKind::Flat,
            diffuse: Color::zeros(),
            diffuse2: Color::zeros(),
            offset: Vec3f::zeros(),
            size: 1.0,
            specular: Color::zeros(),
            power: 60.0,
            reflection: 0.0,
            refraction: 0.0,
            density: 1.0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Light {
    pub position: Vec3f,
    pub intensity: Color,
}

#[derive(Clone, Debug)]
pub struct Sphere {
    pub center: Vec3f,
    pub radius: Fp,
    pub material_id: u32,
}

/// Axis-aligned box spanning `p1..=p2`.
#[derive(Clone, Debug)]
pub struct AxisBox {
    pub p1: Vec3f,
    pub p2: Vec3f,
    pub material_id: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3f,
    /// Yaw around the vertical axis, radians.
    pub rotation: Fp,
    /// Horizontal field of view, degrees.
    pub field_of_view: Fp,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            position: Vec3f::zeros(),
            rotation: 0.0,
            field_of_view: 45.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Scene {
    pub camera: Camera,
    pub exposure: Fp,
    pub skybox_material_id: u32,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
    pub spheres: Vec<Sphere>,
    pub boxes: Vec<AxisBox>,
}

impl Default for Scene {
    fn default() -> Self {
        Scene {
            camera: Camera::default(),
            exposure: -1.0,
            skybox_material_id: 0,
            materials: vec![],
            lights: vec![],
            spheres: vec![],
            boxes: vec![],
        }
    }
}

impl Scene {
    pub fn skybox(&self) -> Option<&Material> {
        self.materials.get(self.skybox_material_id as usize)
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        let material_count = self.materials.len();
        if material_count == 0 {
            return Err(SceneError::Invalid("scene defines no materials".into()));
        }
        let check_id = |what: String, id: u32| {
            if id as usize >= material_count {
                Err(SceneError::Invalid(format!(
                    "{what} references material {id} but only {material_count} are defined"
                )))
            } else {
                Ok(())
            }
        };
        check_id("skybox".into(), self.skybox_material_id)?;
        for (index, sphere) in self.spheres.iter().enumerate() {
            check_id(format!("sphere {index}"), sphere.material_id)?;
        }
        for (index, aabb) in self.boxes.iter().enumerate() {
            check_id(format!("box {index}"), aabb.material_id)?;
        }
        for (index, material) in self.materials.iter().enumerate() {
            if material.kind != MaterialKind::Flat && material.size <= 0.0 {
                return Err(SceneError::Invalid(format!(
                    "material {index} has non-positive texture size {}",
                    material.size
                )));
            }
        }
        Ok(())
    }
}

pub fn load_scene(path: &Path) -> Result<Scene, SceneError> {
    let file_string = fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let file_lines = file_string.split('\n').map(|x| x.trim());
    parse_file_content(file_lines)
}

enum Section {
    None,
    Material(Material),
    Light(Light),
}

fn flush_section(section: Section, scene: &mut Scene) {
    match section {
        Section::None => {}
        Section::Material(material) => scene.materials.push(material),
        Section::Light(light) => scene.lights.push(light),
    }
}

pub fn parse_file_content<'a>(content: impl Iterator<Item = &'a str>) -> Result<Scene, SceneError> {
    let mut result = Scene::default();
    let mut section = Section::None;

    for (line_index, line) in content.enumerate() {
        let line_number = line_index + 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let parse_error = |message: String| SceneError::Parse {
            line: line_number,
            message,
        };

        let get_fp = |index: usize| -> Result<Fp, SceneError> {
            let token = tokens
                .get(index)
                .ok_or_else(|| parse_error(format!("{} expects more arguments", tokens[0])))?;
            token
                .parse::<Fp>()
                .map_err(|_| parse_error(format!("'{token}' is not a number")))
        };
        let get_id = |index: usize| -> Result<u32, SceneError> {
            let token = tokens
                .get(index)
                .ok_or_else(|| parse_error(format!("{} expects more arguments", tokens[0])))?;
            token
                .parse::<u32>()
                .map_err(|_| parse_error(format!("'{token}' is not a material id")))
        };
        let get_vector =
            |first: usize| -> Result<Vec3f, SceneError> {
                Ok(Vec3f::new(get_fp(first)?, get_fp(first + 1)?, get_fp(first + 2)?))
            };
        let outside = |section_name: &str| {
            parse_error(format!("{} outside of {section_name}", tokens[0]))
        };

        match tokens[0] {
            "CAMERA_POSITION" => result.camera.position = get_vector(1)?,
            "CAMERA_ROTATION" => result.camera.rotation = get_fp(1)?.to_radians(),
            "CAMERA_FOV" => result.camera.field_of_view = get_fp(1)?,
            "EXPOSURE" => result.exposure = get_fp(1)?,
            "SKYBOX_MATERIAL" => result.skybox_material_id = get_id(1)?,
            "NEW_MATERIAL" => {
                flush_section(std::mem::replace(&mut section, Section::Material(Material::default())), &mut result);
            }
            "NEW_LIGHT" => {
                flush_section(std::mem::replace(&mut section, Section::Light(Light::default())), &mut result);
            }
            "TYPE" | "DIFFUSE" | "DIFFUSE2" | "OFFSET" | "SIZE" | "SPECULAR" | "POWER"
            | "REFLECTION" | "REFRACTION" | "DENSITY" => {
                let Section::Material(material) = &mut section else {
                    return Err(outside("NEW_MATERIAL"));
                };
                match tokens[0] {
                    "TYPE" => {
                        material.kind = match tokens.get(1).copied() {
                            Some("FLAT") | Some("GOURAUD") => MaterialKind::Flat,
                            Some("CHECKERBOARD") => MaterialKind::Checkerboard,
                            Some("CIRCLES") => MaterialKind::Circles,
                            Some("WOOD") => MaterialKind::Wood,
                            other => {
                                return Err(parse_error(format!(
                                    "unknown material type {}",
                                    other.unwrap_or("<missing>")
                                )))
                            }
                        }
                    }
                    "DIFFUSE" => material.diffuse = get_vector(1)?,
                    "DIFFUSE2" => material.diffuse2 = get_vector(1)?,
                    "OFFSET" => material.offset = get_vector(1)?,
                    "SIZE" => material.size = get_fp(1)?,
                    "SPECULAR" => material.specular = get_vector(1)?,
                    "POWER" => material.power = get_fp(1)?,
                    "REFLECTION" => material.reflection = get_fp(1)?,
                    "REFRACTION" => material.refraction = get_fp(1)?,
                    _ => material.density = get_fp(1)?,
                }
            }
            "POSITION" | "INTENSITY" => {
                let Section::Light(light) = &mut section else {
                    return Err(outside("NEW_LIGHT"));
                };
                if tokens[0] == "POSITION" {
                    light.position = get_vector(1)?;
                } else {
                    light.intensity = get_vector(1)?;
                }
            }
            "SPHERE" => {
                let radius = get_fp(4)?;
                if radius <= 0.0 {
                    return Err(parse_error(format!("sphere radius must be positive, got {radius}")));
                }
                result.spheres.push(Sphere {
                    center: get_vector(1)?,
                    radius,
                    material_id: get_id(5)?,
                });
            }
            "BOX" => {
                let p1 = get_vector(1)?;
                let p2 = get_vector(4)?;
                if p1.x > p2.x || p1.y > p2.y || p1.z > p2.z {
                    return Err(parse_error("box corners must satisfy p1 <= p2".into()));
                }
                result.boxes.push(AxisBox {
                    p1,
                    p2,
                    material_id: get_id(7)?,
                });
            }
            unknown => {
                log::warn!("line {line_number}: ignoring unknown directive {unknown}");
            }
        }
    }
    flush_section(section, &mut result);
    result.validate()?;
    Ok(result)
}

fn log_truncated<T>(title: &str, items: &[T], describe: impl Fn(usize, &T) -> String) {
    log::debug!("--- {} ({}):", title, items.len());
    let len = items.len();
    for (index, item) in items.iter().enumerate() {
        if len > 10 && index >= 3 && index < len - 3 {
            if index == 3 {
                log::debug!(" ... ");
            }
            continue;
        }
        log::debug!("{}", describe(index, item));
    }
}

pub fn log_scene_info(scene: &Scene) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let camera = &scene.camera;
    log::debug!(
        "camera pos: {:.1} {:.1} {:.1}, rot: {:.1}, fov: {:.1}, exposure: {:.1}, sky: {}",
        camera.position.x,
        camera.position.y,
        camera.position.z,
        camera.rotation,
        camera.field_of_view,
        scene.exposure,
        scene.skybox_material_id
    );
    if let Some(sky) = scene.skybox() {
        log::debug!("sky colour: {:.2} {:.2} {:.2}", sky.diffuse.x, sky.diffuse.y, sky.diffuse.z);
    }
    log_truncated("Spheres", &scene.spheres, |i, s| {
        format!(
            "Sphere {i}: {:.1} {:.1} {:.1}, {:.1} -- {}",
            s.center.x, s.center.y, s.center.z, s.radius, s.material_id
        )
    });
    log_truncated("Boxes", &scene.boxes, |i, b| {
        format!(
            "Box {i}: {:.1} {:.1} {:.1}, {:.1} {:.1} {:.1} -- {}",
            b.p1.x, b.p1.y, b.p1.z, b.p2.x, b.p2.y, b.p2.z, b.material_id
        )
    });
    log_truncated("Lights", &scene.lights, |i, l| {
        format!(
            "Light {i}: {:.1} {:.1} {:.1} -- {:.1} {:.1} {:.1}",
            l.position.x, l.position.y, l.position.z, l.intensity.x, l.intensity.y, l.intensity.z
        )
    });
    log_truncated("Materials", &scene.materials, |i, m| {
        format!(
            "Material {i}: {:?} {:.1} {:.1} {:.1} ... {:.1} {:.1} {:.1}",
            m.kind, m.diffuse.x, m.diffuse.y, m.diffuse.z, m.reflection, m.refraction, m.density
        )
    });
}
