use indicatif::{ProgressBar, ProgressStyle};

use crate::device::{ComputeDevice, DeviceResult, DeviceSession};
use crate::geometry::Fp;
use crate::layout::JobParams;
use crate::merge::{merge_block, FrameBuffer};
use crate::scene::{Camera, Scene};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub index: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockGrid {
    pub width: u32,
    pub height: u32,
    pub block_size: u32,
    pub blocks_wide: u32,
    pub blocks_high: u32,
}

fn reference_block_count(pixels: u32, block_size: u32) -> u32 {
    let count = u64::from(pixels.saturating_sub(1)) / (u64::from(block_size) + 1) + 1;
    count as u32
}

impl BlockGrid {
    /// `(n - 1) / (b + 1) + 1` blocks per axis. This leaves gaps for some
    /// sizes (e.g. 130 pixels in blocks of 64); see [`BlockGrid::uncovered_pixels`].
    pub fn new(width: u32, height: u32, block_size: u32) -> BlockGrid {
        BlockGrid {
            width,
            height,
            block_size,
            blocks_wide: reference_block_count(width, block_size),
            blocks_high: reference_block_count(height, block_size),
        }
    }

    /// Ceil-division grid, always gap-free.
    pub fn covering(width: u32, height: u32, block_size: u32) -> BlockGrid {
        BlockGrid {
            width,
            height,
            block_size,
            blocks_wide: width.div_ceil(block_size).max(1),
            blocks_high: height.div_ceil(block_size).max(1),
        }
    }

    pub fn total_blocks(&self) -> u32 {
        self.blocks_wide * self.blocks_high
    }

    pub fn block(&self, index: u32) -> Block {
        let column = index % self.blocks_wide;
        let row = index / self.blocks_wide;
        let mut width = self.block_size;
        let mut height = self.block_size;
        let total = self.total_blocks();

        if index != 0 && column == self.blocks_wide - 1 && self.width % self.block_size != 0 {
            width = self.width % self.block_size;
        }
        if index != 0 && total - index <= self.blocks_wide && self.height % self.block_size != 0 {
            height = self.height % self.block_size;
        }
        let x = column * self.block_size;
        let y = row * self.block_size;
        Block {
            index,
            x,
            y,
            width: width.min(self.width.saturating_sub(x)),
            height: height.min(self.height.saturating_sub(y)),
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.total_blocks()).map(|index| self.block(index))
    }

    /// How many frame pixels no block reaches.
    pub fn uncovered_pixels(&self) -> u64 {
        let width = self.width as usize;
        let mut covered = vec![false; width * self.height as usize];
        for block in self.blocks() {
            let x_end = (block.x + block.width).min(self.width);
            let y_end = (block.y + block.height).min(self.height);
            for y in block.y.min(self.height)..y_end {
                for x in block.x.min(self.width)..x_end {
                    covered[y as usize * width + x as usize] = true;
                }
            }
        }
        covered.iter().filter(|c| !**c).count() as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    pub aa_level: u32,
    pub test_mode: bool,
    pub block_size: u32,
    pub show_progress: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            aa_level: 1,
            test_mode: false,
            block_size: 512,
            show_progress: false,
        }
    }
}

/// Everything one block dispatch needs, copied out of the scene.
#[derive(Clone, Debug, PartialEq)]
pub struct JobDescriptor {
    pub aa_level: u32,
    pub test_mode: bool,
    pub block: Block,
    pub block_size: u32,
    pub blocks_wide: u32,
    pub blocks_high: u32,
    pub total_width: u32,
    pub total_height: u32,
    pub camera: Camera,
    pub exposure: Fp,
    pub skybox_material_id: u32,
    pub num_materials: u32,
    pub num_lights: u32,
    pub num_spheres: u32,
    pub num_boxes: u32,
}

impl JobDescriptor {
    pub fn new(settings: &RenderSettings, grid: &BlockGrid, block: Block, scene: &Scene) -> JobDescriptor {
        JobDescriptor {
            aa_level: settings.aa_level,
            test_mode: settings.test_mode,
            block,
            block_size: grid.block_size,
            blocks_wide: grid.blocks_wide,
            blocks_high: grid.blocks_high,
            total_width: grid.width,
            total_height: grid.height,
            camera: scene.camera,
            exposure: scene.exposure,
            skybox_material_id: scene.skybox_material_id,
            num_materials: scene.materials.len() as u32,
            num_lights: scene.lights.len() as u32,
            num_spheres: scene.spheres.len() as u32,
            num_boxes: scene.boxes.len() as u32,
        }
    }

    pub fn work_size(&self) -> (u32, u32) {
        (self.block.width, self.block.height)
    }

    pub fn to_params(&self) -> JobParams {
        let position = self.camera.position;
        JobParams {
            aa_level: self.aa_level,
            test_mode: self.test_mode as u32,
            block_size: self.block_size,
            total_width: self.total_width,
            total_height: self.total_height,
            block_index: self.block.index,
            blocks_wide: self.blocks_wide,
            blocks_high: self.blocks_high,
            camera_position: [position.x, position.y, position.z, 0.0],
            camera_rotation: self.camera.rotation,
            camera_fov: self.camera.field_of_view,
            exposure: self.exposure,
            skybox_material: self.skybox_material_id,
            num_materials: self.num_materials,
            num_lights: self.num_lights,
            num_spheres: self.num_spheres,
            num_boxes: self.num_boxes,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub blocks: u32,
    pub pixels_written: u64,
    pub samples: u64,
}

pub struct TileScheduler {
    grid: BlockGrid,
    settings: RenderSettings,
}

impl TileScheduler {
    pub fn new(width: u32, height: u32, settings: RenderSettings) -> TileScheduler {
        let mut grid = BlockGrid::new(width, height, settings.block_size);
        let uncovered = grid.uncovered_pixels();
        if uncovered > 0 {
            log::warn!(
                "{}x{} grid of {}px blocks leaves {} pixels unrendered, using a covering grid",
                grid.blocks_wide,
                grid.blocks_high,
                settings.block_size,
                uncovered
            );
            grid = BlockGrid::covering(width, height, settings.block_size);
        }
        TileScheduler { grid, settings }
    }

    pub fn grid(&self) -> &BlockGrid {
        &self.grid
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.grid.total_blocks() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} blocks")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }

    /// Renders every block in order, one synchronous dispatch at a time,
    /// merging each result into `frame` before the next block starts.
    pub fn render<D: ComputeDevice>(
        &self,
        scene: &Scene,
        session: &mut DeviceSession<D>,
        frame: &mut FrameBuffer,
    ) -> DeviceResult<RenderStats> {
        let mut stats = RenderStats::default();
        let samples_per_pixel = if self.settings.test_mode {
            1
        } else {
            u64::from(self.settings.aa_level).pow(2)
        };
        let bar = self.progress_bar();
        for block in self.grid.blocks() {
            let job = JobDescriptor::new(&self.settings, &self.grid, block, scene);
            log::debug!(
                "block {}/{} at {},{} size {}x{}",
                block.index + 1,
                self.grid.total_blocks(),
                block.x,
                block.y,
                block.width,
                block.height
            );
            let result = session.execute(&job)?;
            let written = merge_block(frame, result, (block.x, block.y), job.work_size());
            stats.blocks += 1;
            stats.pixels_written += written as u64;
            stats.samples += u64::from(block.width) * u64::from(block.height) * samples_per_pixel;
            bar.inc(1);
        }
        bar.finish_and_clear();
        Ok(stats)
    }
}
