use crate::geometry::{Color, Fp};

pub const DEFAULT_EXPOSURE: Fp = -1.0;

pub fn safe_sqrt(x: Fp) -> Fp {
    Fp::max(0.0, x).sqrt()
}

fn exposed_channel(value: Fp, exposure: Fp) -> u32 {
    let mapped = (1.0 - (value * exposure).exp()).clamp(0.0, 1.0);
    (mapped * 255.0) as u32
}

/// Exposure tone map and pack into `0x00RRGGBB`.
pub fn convert_to_pixel(color: &Color, exposure: Fp) -> u32 {
    (exposed_channel(color.x, exposure) << 16)
        | (exposed_channel(color.y, exposure) << 8)
        | exposed_channel(color.z, exposure)
}

pub fn unpack_pixel(pixel: u32) -> [u8; 3] {
    [(pixel >> 16) as u8, (pixel >> 8) as u8, pixel as u8]
}
