//! Device-side entry point: one invocation per pixel of the current block.

use crate::geometry::{Color, Fp, Ray, Vec3f};
use crate::layout::JobParams;
use crate::rendering::{trace_ray, KernelScene};
use crate::utils::{convert_to_pixel, DEFAULT_EXPOSURE};

/// Angle between neighbouring primary rays, from the horizontal field of view.
pub fn dir_step_size(width: u32, field_of_view: Fp) -> Fp {
    1.0 / (0.5 * width as Fp / (0.5 * field_of_view).to_radians().tan())
}

pub fn primary_ray(job: &JobParams, fragment_x: Fp, fragment_y: Fp, dir_step: Fp) -> Ray {
    let dir = Vec3f::new(fragment_x * dir_step, fragment_y * dir_step, 1.0);
    let (sin, cos) = job.camera_rotation.sin_cos();
    let rotated = Vec3f::new(dir.x * cos - dir.z * sin, dir.y, dir.x * sin + dir.z * cos);
    Ray::new(job.camera_position(), rotated)
}

/// Centred coordinates: `(0, 0)` is the middle of the frame.
fn centred(job: &JobParams, px: u32, py: u32) -> (i32, i32) {
    (
        px as i32 - (job.total_width / 2) as i32,
        py as i32 - (job.total_height / 2) as i32,
    )
}

/// Box-filtered average over an `aa x aa` grid of sub-samples.
pub fn sample_pixel(job: &JobParams, scene: &KernelScene, px: u32, py: u32) -> Color {
    let (x, y) = centred(job, px, py);
    let aa_level = job.aa_level.max(1);
    let sample_step = 1.0 / aa_level as Fp;
    let sample_ratio = 1.0 / (aa_level as Fp).powi(2);
    let dir_step = dir_step_size(job.total_width, job.camera_fov);

    let mut output = Color::zeros();
    // sub-sample centres (x + (i + 0.5) / aa), not the pixel corner grid
    for sx in 0..aa_level {
        for sy in 0..aa_level {
            let fragment_x = x as Fp + (sx as Fp + 0.5) * sample_step;
            let fragment_y = y as Fp + (sy as Fp + 0.5) * sample_step;
            let view_ray = primary_ray(job, fragment_x, fragment_y, dir_step);
            output += trace_ray(scene, view_ray) * sample_ratio;
        }
    }
    output
}

/// Gradient that depends only on pixel coordinates.
pub fn test_pattern(job: &JobParams, px: u32, py: u32) -> Color {
    let (x, y) = centred(job, px, py);
    let half_w = (job.total_width / 2) as i32;
    let half_h = (job.total_height / 2) as i32;
    Color::new(
        ((x + half_w) % 256) as Fp / 256.0,
        0.0,
        ((y + half_h) % 256) as Fp / 256.0,
    )
}

pub fn shade_pixel(job: &JobParams, scene: &KernelScene, px: u32, py: u32) -> u32 {
    if job.test_mode != 0 {
        convert_to_pixel(&test_pattern(job, px, py), DEFAULT_EXPOSURE)
    } else {
        convert_to_pixel(&sample_pixel(job, scene, px, py), job.exposure)
    }
}

/// Frame pixel for work item `(gx, gy)`; `None` when the block overhangs the frame.
pub fn global_to_pixel(job: &JobParams, gx: u32, gy: u32) -> Option<(u32, u32)> {
    let (origin_x, origin_y) = job.block_origin();
    let (px, py) = (origin_x + gx, origin_y + gy);
    if px < job.total_width && py < job.total_height {
        Some((px, py))
    } else {
        None
    }
}
