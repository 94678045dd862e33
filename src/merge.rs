use image::{Rgb, RgbImage};

use crate::utils::unpack_pixel;

/// Packed `0x00RRGGBB` pixels, row-major, row 0 at the bottom of the image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> FrameBuffer {
        FrameBuffer {
            width,
            height,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Top-down RGB image, as image encoders expect.
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb(unpack_pixel(self.pixel(x, self.height - 1 - y)))
        })
    }
}

/// Copies the non-zero cells of the block at `offset`/`size` from
/// `block_result` into `frame`. `block_result` has the frame's stride.
///
/// Zero cells are skipped, so a pixel whose packed colour is pure black keeps
/// whatever the frame held before. Returns the number of cells written.
pub fn merge_block(
    frame: &mut FrameBuffer,
    block_result: &[u32],
    offset: (u32, u32),
    size: (u32, u32),
) -> usize {
    let width = frame.width as usize;
    let x_end = offset.0.saturating_add(size.0).min(frame.width) as usize;
    let y_end = offset.1.saturating_add(size.1).min(frame.height) as usize;
    let mut written = 0;
    for y in offset.1 as usize..y_end {
        let row = y * width;
        for x in offset.0 as usize..x_end {
            let value = block_result[row + x];
            if value != 0 {
                frame.pixels[row + x] = value;
                written += 1;
            }
        }
    }
    written
}
