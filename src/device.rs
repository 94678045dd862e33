use bytemuck::Pod;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

use crate::kernel::{global_to_pixel, shade_pixel};
use crate::layout::{GpuBox, GpuLight, GpuMaterial, GpuSphere, JobParams, SceneBuffers};
use crate::rendering::KernelScene;
use crate::tiles::JobDescriptor;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Compute device unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to allocate {label} buffer ({bytes} bytes)")]
    BufferAllocation { label: &'static str, bytes: usize },
    #[error("Kernel build failed:\n{log}")]
    Build { log: String },
    #[error("Kernel dispatch failed: {0}")]
    Dispatch(String),
    #[error("Failed to read back output buffer: {0}")]
    ReadBack(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;

const WORD_BYTES: usize = 16;

/// Device-resident copy of a read-only buffer, stored as 16-byte words.
#[derive(Debug)]
pub struct DeviceBuffer {
    label: &'static str,
    words: Vec<[u32; 4]>,
}

impl DeviceBuffer {
    pub fn upload<T: Pod>(label: &'static str, items: &[T]) -> DeviceResult<DeviceBuffer> {
        let bytes: &[u8] = bytemuck::cast_slice(items);
        let word_count = bytes.len().div_ceil(WORD_BYTES);
        let mut words = Vec::new();
        words
            .try_reserve_exact(word_count)
            .map_err(|_| DeviceError::BufferAllocation {
                label,
                bytes: word_count * WORD_BYTES,
            })?;
        for chunk in bytes.chunks(WORD_BYTES) {
            let mut word = [0u8; WORD_BYTES];
            word[..chunk.len()].copy_from_slice(chunk);
            words.push(bytemuck::cast(word));
        }
        Ok(DeviceBuffer { label, words })
    }

    pub fn byte_len(&self) -> usize {
        self.words.len() * WORD_BYTES
    }

    /// The first `count` elements, reinterpreted in the kernel's layout.
    pub fn view<T: Pod>(&self, count: u32) -> Result<&[T], String> {
        let all: &[T] = bytemuck::try_cast_slice(&self.words).map_err(|error| {
            format!(
                "{}: {} bytes do not form an array of {}-byte elements ({error})",
                self.label,
                self.byte_len(),
                std::mem::size_of::<T>()
            )
        })?;
        all.get(..count as usize).ok_or_else(|| {
            format!(
                "{}: {} elements bound but the buffer holds {}",
                self.label,
                count,
                all.len()
            )
        })
    }
}

#[derive(Debug)]
pub struct SceneDeviceBuffers {
    pub materials: DeviceBuffer,
    pub lights: DeviceBuffer,
    pub spheres: DeviceBuffer,
    pub boxes: DeviceBuffer,
}

impl SceneDeviceBuffers {
    pub fn upload(buffers: &SceneBuffers) -> DeviceResult<SceneDeviceBuffers> {
        Ok(SceneDeviceBuffers {
            materials: DeviceBuffer::upload("materials", &buffers.materials)?,
            lights: DeviceBuffer::upload("lights", &buffers.lights)?,
            spheres: DeviceBuffer::upload("spheres", &buffers.spheres)?,
            boxes: DeviceBuffer::upload("boxes", &buffers.boxes)?,
        })
    }
}

/// Job parameters plus the scene arrays, bound in kernel argument order.
#[derive(Clone, Copy, Debug)]
pub struct KernelBindings<'a> {
    pub job: JobParams,
    pub scene: KernelScene<'a>,
}

/// Links the uploaded buffers against the kernel's expected layout.
/// Every mismatch is collected into the build log.
pub fn build_bindings<'a>(
    job: &JobParams,
    buffers: &'a SceneDeviceBuffers,
) -> DeviceResult<KernelBindings<'a>> {
    let materials = buffers.materials.view::<GpuMaterial>(job.num_materials);
    let lights = buffers.lights.view::<GpuLight>(job.num_lights);
    let spheres = buffers.spheres.view::<GpuSphere>(job.num_spheres);
    let boxes = buffers.boxes.view::<GpuBox>(job.num_boxes);

    let mut log: Vec<String> = [
        materials.as_ref().err(),
        lights.as_ref().err(),
        spheres.as_ref().err(),
        boxes.as_ref().err(),
    ]
    .into_iter()
    .flatten()
    .cloned()
    .collect();

    match (materials, lights, spheres, boxes) {
        (Ok(materials), Ok(lights), Ok(spheres), Ok(boxes)) => {
            let material_count = materials.len() as u32;
            if material_count == 0 {
                log.push("materials: at least one material must be bound".into());
            }
            if job.skybox_material >= material_count {
                log.push(format!("skybox material {} out of range", job.skybox_material));
            }
            for (index, sphere) in spheres.iter().enumerate() {
                if sphere.material_id >= material_count {
                    log.push(format!("spheres[{index}]: material {} out of range", sphere.material_id));
                }
            }
            for (index, aabb) in boxes.iter().enumerate() {
                if aabb.material_id >= material_count {
                    log.push(format!("boxes[{index}]: material {} out of range", aabb.material_id));
                }
            }
            if !log.is_empty() {
                return Err(DeviceError::Build { log: log.join("\n") });
            }
            Ok(KernelBindings {
                job: *job,
                scene: KernelScene {
                    materials,
                    lights,
                    spheres,
                    boxes,
                    skybox_material: job.skybox_material,
                },
            })
        }
        _ => Err(DeviceError::Build { log: log.join("\n") }),
    }
}

pub trait ComputeDevice {
    fn name(&self) -> String;

    /// Runs the kernel once per work item of `work_size`, writing into the
    /// frame-sized `output`, and returns once every item has finished.
    fn dispatch(
        &self,
        bindings: &KernelBindings,
        work_size: (u32, u32),
        output: &mut [u32],
    ) -> DeviceResult<()>;
}

/// Runs the kernel on a dedicated rayon pool.
pub struct CpuDevice {
    pool: ThreadPool,
}

impl CpuDevice {
    /// `threads == 0` lets rayon pick one worker per core.
    pub fn new(threads: usize) -> DeviceResult<CpuDevice> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("kernel-{index}"))
            .build()
            .map_err(|error| DeviceError::Unavailable(error.to_string()))?;
        Ok(CpuDevice { pool })
    }
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> String {
        format!("cpu ({} workers)", self.pool.current_num_threads())
    }

    fn dispatch(
        &self,
        bindings: &KernelBindings,
        work_size: (u32, u32),
        output: &mut [u32],
    ) -> DeviceResult<()> {
        let job = &bindings.job;
        let expected = job.total_width as usize * job.total_height as usize;
        if output.len() != expected {
            return Err(DeviceError::Dispatch(format!(
                "output buffer holds {} cells, kernel expects {}",
                output.len(),
                expected
            )));
        }
        let (work_w, work_h) = (work_size.0 as usize, work_size.1 as usize);
        let width = job.total_width as usize;
        let results: Vec<(usize, u32)> = self.pool.install(|| {
            (0..work_w * work_h)
                .into_par_iter()
                .filter_map(|item| {
                    let (gx, gy) = ((item % work_w) as u32, (item / work_w) as u32);
                    let (px, py) = global_to_pixel(job, gx, gy)?;
                    let value = shade_pixel(job, &bindings.scene, px, py);
                    Some((py as usize * width + px as usize, value))
                })
                .collect()
        });
        for (index, value) in results {
            output[index] = value;
        }
        Ok(())
    }
}

/// Device state that lives for one render: scene buffers are uploaded once,
/// and each block binds fresh job parameters and a cleared output buffer.
pub struct DeviceSession<D: ComputeDevice> {
    device: D,
    scene: SceneDeviceBuffers,
    output: Vec<u32>,
    width: u32,
    height: u32,
    dispatches: u64,
}

impl<D: ComputeDevice> DeviceSession<D> {
    pub fn open(device: D, buffers: &SceneBuffers, width: u32, height: u32) -> DeviceResult<Self> {
        let scene = SceneDeviceBuffers::upload(buffers)?;
        let cells = width as usize * height as usize;
        let mut output = Vec::new();
        output
            .try_reserve_exact(cells)
            .map_err(|_| DeviceError::BufferAllocation {
                label: "output",
                bytes: cells * std::mem::size_of::<u32>(),
            })?;
        output.resize(cells, 0);
        log::debug!(
            "opened session on {}: {} bytes of scene data, {}x{} output",
            device.name(),
            scene.materials.byte_len()
                + scene.lights.byte_len()
                + scene.spheres.byte_len()
                + scene.boxes.byte_len(),
            width,
            height
        );
        Ok(DeviceSession {
            device,
            scene,
            output,
            width,
            height,
            dispatches: 0,
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    fn check_job(&self, job: &JobParams, work_size: (u32, u32)) -> DeviceResult<()> {
        if job.total_width != self.width || job.total_height != self.height {
            return Err(DeviceError::Dispatch(format!(
                "job targets {}x{} but the session was opened for {}x{}",
                job.total_width, job.total_height, self.width, self.height
            )));
        }
        if job.aa_level == 0 {
            return Err(DeviceError::Dispatch("anti-aliasing level must be at least 1".into()));
        }
        if job.block_index >= job.total_blocks() {
            return Err(DeviceError::Dispatch(format!(
                "block {} out of range for a {}x{} grid",
                job.block_index, job.blocks_wide, job.blocks_high
            )));
        }
        if work_size.0 == 0 || work_size.1 == 0 {
            return Err(DeviceError::Dispatch("empty work size".into()));
        }
        Ok(())
    }

    /// Runs one block synchronously and returns the frame-sized result, in
    /// which only the block's cells are non-zero.
    pub fn execute(&mut self, job: &JobDescriptor) -> DeviceResult<&[u32]> {
        let params = job.to_params();
        let work_size = job.work_size();
        self.check_job(&params, work_size)?;
        self.output.fill(0);
        let bindings = build_bindings(&params, &self.scene)?;
        self.device.dispatch(&bindings, work_size, &mut self.output)?;
        self.dispatches += 1;
        self.read_back()
    }

    fn read_back(&self) -> DeviceResult<&[u32]> {
        let cells = self.width as usize * self.height as usize;
        if self.output.len() != cells {
            return Err(DeviceError::ReadBack(format!(
                "output buffer shrank to {} cells, expected {}",
                self.output.len(),
                cells
            )));
        }
        Ok(&self.output)
    }
}

impl<D: ComputeDevice> Drop for DeviceSession<D> {
    fn drop(&mut self) {
        log::debug!(
            "releasing session on {} after {} dispatches",
            self.device.name(),
            self.dispatches
        );
    }
}
