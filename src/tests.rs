use std::cell::RefCell;
use std::path::Path;

use crate::device::{ComputeDevice, CpuDevice, DeviceError, DeviceResult, DeviceSession, KernelBindings};
use crate::geometry::Color;
use crate::layout::SceneBuffers;
use crate::merge::FrameBuffer;
use crate::scene::{load_scene, parse_file_content, Scene};
use crate::tiles::{RenderSettings, RenderStats, TileScheduler};
use crate::utils::{convert_to_pixel, unpack_pixel, DEFAULT_EXPOSURE};

const SINGLE_SPHERE: &str = "
# red ball in front of a blue sky
CAMERA_POSITION 0 0 -5
CAMERA_FOV 45
SKYBOX_MATERIAL 1

NEW_MATERIAL
DIFFUSE 1 0 0

NEW_MATERIAL
DIFFUSE 0.2 0.4 0.6

NEW_LIGHT
POSITION 0 5 -5
INTENSITY 1 1 1

SPHERE 0 0 0 1 0
";

fn single_sphere() -> Scene {
    parse_file_content(SINGLE_SPHERE.lines().map(str::trim)).unwrap()
}

fn settings(block_size: u32) -> RenderSettings {
    RenderSettings {
        block_size,
        ..Default::default()
    }
}

fn render_with<D: ComputeDevice>(
    device: D,
    scene: &Scene,
    settings: RenderSettings,
    frame: &mut FrameBuffer,
) -> DeviceResult<RenderStats> {
    let scheduler = TileScheduler::new(frame.width(), frame.height(), settings);
    let buffers = SceneBuffers::from_scene(scene);
    let mut session = DeviceSession::open(device, &buffers, frame.width(), frame.height())?;
    scheduler.render(scene, &mut session, frame)
}

fn render(scene: &Scene, width: u32, height: u32, settings: RenderSettings) -> FrameBuffer {
    let mut frame = FrameBuffer::new(width, height);
    render_with(CpuDevice::new(2).unwrap(), scene, settings, &mut frame).unwrap();
    frame
}

/// Runs on the CPU, remembering every block it was handed and optionally
/// failing at one of them.
struct ScriptedDevice {
    inner: CpuDevice,
    fail_at: Option<u32>,
    seen: RefCell<Vec<u32>>,
}

impl ScriptedDevice {
    fn new(fail_at: Option<u32>) -> ScriptedDevice {
        ScriptedDevice {
            inner: CpuDevice::new(1).unwrap(),
            fail_at,
            seen: RefCell::new(vec![]),
        }
    }
}

impl ComputeDevice for ScriptedDevice {
    fn name(&self) -> String {
        "scripted".into()
    }

    fn dispatch(&self, bindings: &KernelBindings, work_size: (u32, u32), output: &mut [u32]) -> DeviceResult<()> {
        let block = bindings.job.block_index;
        self.seen.borrow_mut().push(block);
        if self.fail_at == Some(block) {
            return Err(DeviceError::Dispatch(format!("lost device at block {block}")));
        }
        self.inner.dispatch(bindings, work_size, output)
    }
}

#[test]
fn single_sphere_fills_centre_and_leaves_corners_to_sky() {
    let scene = single_sphere();
    let frame = render(&scene, 4, 4, settings(2));
    let sky = convert_to_pixel(&Color::new(0.2, 0.4, 0.6), scene.exposure);

    for (x, y) in [(0, 0), (3, 0), (0, 3), (3, 3)] {
        assert_eq!(frame.pixel(x, y), sky, "corner {x},{y}");
    }
    for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2)] {
        let [r, g, b] = unpack_pixel(frame.pixel(x, y));
        assert!(r > 0 && r > g && r > b, "centre {x},{y} is {r} {g} {b}");
    }
}

#[test]
fn block_size_does_not_change_the_image() {
    let scene = single_sphere();
    let reference = render(&scene, 9, 7, settings(512));
    for block_size in [1, 2, 3, 4, 8] {
        assert_eq!(render(&scene, 9, 7, settings(block_size)), reference, "block size {block_size}");
    }
}

#[test]
fn blocks_larger_than_the_frame_render_like_fitting_blocks() {
    let scene = single_sphere();
    let reference = render(&scene, 4, 4, settings(4));
    for block_size in [65536, u32::MAX] {
        let frame = render(&scene, 4, 4, settings(block_size));
        assert_eq!(frame, reference, "block size {block_size}");
    }
}

#[test]
fn rendering_is_deterministic_across_thread_counts() {
    let scene = single_sphere();
    let aa = RenderSettings {
        aa_level: 3,
        block_size: 8,
        ..Default::default()
    };
    let mut one = FrameBuffer::new(20, 12);
    let mut four = FrameBuffer::new(20, 12);
    render_with(CpuDevice::new(1).unwrap(), &scene, aa, &mut one).unwrap();
    render_with(CpuDevice::new(4).unwrap(), &scene, aa, &mut four).unwrap();
    assert_eq!(one.pixels(), four.pixels());
}

#[test]
fn test_mode_ignores_the_scene() {
    let test_mode = RenderSettings {
        test_mode: true,
        block_size: 64,
        ..Default::default()
    };
    let expected = convert_to_pixel(&Color::new(0.5, 0.0, 0.5), DEFAULT_EXPOSURE);
    let with_sphere = render(&single_sphere(), 256, 256, test_mode);
    let mut empty = single_sphere();
    empty.spheres.clear();
    empty.lights.clear();
    let without_sphere = render(&empty, 256, 256, test_mode);

    assert_eq!(with_sphere.pixel(128, 128), expected);
    assert_eq!(with_sphere, without_sphere);
}

#[test]
fn black_results_keep_the_previous_run() {
    let lit = single_sphere();
    let mut frame = FrameBuffer::new(4, 4);
    render_with(CpuDevice::new(1).unwrap(), &lit, settings(4), &mut frame).unwrap();
    let lit_centre = frame.pixel(1, 1);

    let mut dark = single_sphere();
    dark.materials[0].diffuse = Color::zeros();
    let stats = render_with(CpuDevice::new(1).unwrap(), &dark, settings(4), &mut frame).unwrap();

    assert_eq!(frame.pixel(1, 1), lit_centre);
    assert_eq!(stats.pixels_written, 12);
}

#[test]
fn scene_without_geometry_is_all_sky() {
    let mut scene = single_sphere();
    scene.spheres.clear();
    let frame = render(&scene, 5, 3, settings(2));
    let sky = convert_to_pixel(&scene.skybox().unwrap().diffuse, scene.exposure);
    assert_eq!(frame.height(), 3);
    assert!(frame.pixels().iter().all(|pixel| *pixel == sky));
}

#[test]
fn blocks_are_dispatched_in_order() {
    let scene = single_sphere();
    let device = ScriptedDevice::new(None);
    let buffers = SceneBuffers::from_scene(&scene);
    let scheduler = TileScheduler::new(10, 10, settings(4));
    let mut session = DeviceSession::open(device, &buffers, 10, 10).unwrap();
    let mut frame = FrameBuffer::new(10, 10);

    let stats = scheduler.render(&scene, &mut session, &mut frame).unwrap();

    assert_eq!(stats.blocks, 9);
    assert_eq!(stats.samples, 100);
    assert_eq!(*session.device().seen.borrow(), (0..9).collect::<Vec<_>>());
}

#[test]
fn device_failure_stops_at_the_failing_block() {
    let scene = single_sphere();
    let buffers = SceneBuffers::from_scene(&scene);
    let scheduler = TileScheduler::new(10, 10, settings(4));
    let mut session = DeviceSession::open(ScriptedDevice::new(Some(2)), &buffers, 10, 10).unwrap();
    let mut frame = FrameBuffer::new(10, 10);

    let result = scheduler.render(&scene, &mut session, &mut frame);

    assert!(matches!(result, Err(DeviceError::Dispatch(_))));
    assert_eq!(*session.device().seen.borrow(), vec![0, 1, 2]);
    // block 2 covers x 8..10 of the first row of blocks
    assert_eq!(frame.pixel(9, 0), 0);
}

#[test]
fn bundled_scene_loads_and_renders() {
    let scene = load_scene(&Path::new(env!("CARGO_MANIFEST_DIR")).join("Scenes/cornell.txt")).unwrap();
    assert_eq!(scene.materials.len(), 8);
    assert_eq!(scene.lights.len(), 2);
    assert_eq!(scene.spheres.len(), 2);
    assert_eq!(scene.boxes.len(), 6);
    let frame = render(&scene, 24, 24, settings(16));
    assert!(frame.pixels().iter().any(|pixel| *pixel != 0));
}
