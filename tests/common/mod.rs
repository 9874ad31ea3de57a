//! Common utilities for recorder integration tests.
//!
//! Most tests render through the software backend and capture frames in
//! memory, so no display or ffmpeg install is needed. Tests parameterized
//! over [`Backend`] also run on the GPU when one is present.

#![allow(dead_code)]

use std::sync::Arc;

use image::RgbImage;
use parking_lot::RwLock;

use mosaic_recorder::scene::SimpleScene;
use mosaic_recorder::{
    CameraSettings, CameraSubframe, MemoryCapture, Recorder, RecorderConfig, RenderContext,
    SceneHandle, SoftwareBackend,
};

pub const RED: [f32; 3] = [1.0, 0.0, 0.0];
pub const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
pub const BLUE: [f32; 3] = [0.0, 0.0, 1.0];

/// Route `log` output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Context over a small software surface
pub fn software_context() -> RenderContext {
    init_logging();
    RenderContext::new(SoftwareBackend::new(64, 64))
}

/// Backends the parameterized tests run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// CPU rasterizer, always available
    Software,
    /// wgpu on the default adapter
    Wgpu,
}

impl Backend {
    /// Context over a `width`x`height` surface, `None` when the backend is
    /// compiled out or has no device
    pub fn context(self, width: u32, height: u32) -> Option<RenderContext> {
        init_logging();
        match self {
            Backend::Software => Some(RenderContext::new(SoftwareBackend::new(width, height))),
            #[cfg(feature = "wgpu-backend")]
            Backend::Wgpu => match mosaic_recorder::WgpuBackend::new(width, height) {
                Ok(backend) => Some(RenderContext::new(backend)),
                Err(e) => {
                    log::warn!("wgpu backend unavailable: {}", e);
                    None
                }
            },
            #[cfg(not(feature = "wgpu-backend"))]
            Backend::Wgpu => None,
        }
    }
}

/// Scene kept both as a concrete type and as a recorder handle
pub struct TestScene {
    pub scene: Arc<RwLock<SimpleScene>>,
    pub handle: SceneHandle,
}

impl TestScene {
    pub fn new() -> Self {
        let scene = Arc::new(RwLock::new(SimpleScene::default()));
        let handle: SceneHandle = scene.clone();
        Self { scene, handle }
    }
}

/// Subframe that only clears its cell to `color`
pub fn solid_subframe(width: u32, height: u32, color: [f32; 3]) -> CameraSubframe {
    CameraSubframe::new(CameraSettings::orthogonal(width, height).unwrap())
        .with_drawables(Vec::new())
        .with_clear_color(color)
        .unwrap()
}

/// Recorder writing into a fresh [`MemoryCapture`]
pub fn memory_recorder(
    rows: usize,
    cols: usize,
    config: RecorderConfig,
    scene: &TestScene,
    ctx: &mut RenderContext,
) -> (Recorder, MemoryCapture) {
    let capture = MemoryCapture::new();
    let recorder = Recorder::new(config, rows, cols, scene.handle.clone(), ctx)
        .unwrap()
        .with_sink_factory(capture.clone());
    (recorder, capture)
}

/// Expected color at a top-down image position
#[derive(Debug, Clone, Copy)]
pub struct ExpectedPixel {
    pub x: u32,
    pub y: u32,
    pub rgb: [u8; 3],
}

impl ExpectedPixel {
    pub const fn new(x: u32, y: u32, rgb: [u8; 3]) -> Self {
        Self { x, y, rgb }
    }
}

pub fn verify_pixel(image: &RgbImage, expected: &ExpectedPixel) {
    let actual = image.get_pixel(expected.x, expected.y).0;
    assert_eq!(
        actual, expected.rgb,
        "pixel ({}, {}) is {:?}, expected {:?}",
        expected.x, expected.y, actual, expected.rgb
    );
}
