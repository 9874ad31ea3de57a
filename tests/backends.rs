//! Behavior every backend must share.
//!
//! Each test runs once per [`Backend`]; backends without a device are
//! skipped.

mod common;

use common::*;
use glam::{Vec2, Vec3};
use rstest::rstest;

use mosaic_recorder::backend::{
    Capability, ClearFlags, FilterMode, PixelFormat, PrimitiveTopology, Rect, TextureDescriptor,
    TextureFormat,
};
use mosaic_recorder::framebuffer::OffscreenTarget;
use mosaic_recorder::{RecorderConfig, RenderContext};

const SIZE: u32 = 64;

fn context_or_skip(backend: Backend) -> Option<RenderContext> {
    let ctx = backend.context(SIZE, SIZE);
    if ctx.is_none() {
        eprintln!("Backend {:?} not available, skipping", backend);
    }
    ctx
}

fn quad(x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> [Vec3; 4] {
    [
        Vec3::new(x0, y0, z),
        Vec3::new(x1, y0, z),
        Vec3::new(x1, y1, z),
        Vec3::new(x0, y1, z),
    ]
}

fn pixel(ctx: &mut RenderContext, x: i32, y: i32) -> [u8; 3] {
    let rgb = ctx
        .read_pixels(Rect::new(x, y, 1, 1), PixelFormat::Rgb8)
        .unwrap();
    [rgb[0], rgb[1], rgb[2]]
}

// ============================================================================
// Clears and readback
// ============================================================================

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_clear_and_read_back(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };

    ctx.clear_color(1.0, 0.0, 0.0, 1.0);
    ctx.clear(ClearFlags::ALL).unwrap();

    let rgba = ctx
        .read_pixels(Rect::new(0, 0, 3, 2), PixelFormat::Rgba8)
        .unwrap();
    assert_eq!(rgba.len(), 3 * 2 * 4);
    assert!(rgba.chunks_exact(4).all(|p| p == [255, 0, 0, 255]));

    let bgr = ctx
        .read_pixels(Rect::new(10, 10, 1, 1), PixelFormat::Bgr8)
        .unwrap();
    assert_eq!(bgr, vec![0, 0, 255]);
}

/// Rows come back bottom-up
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_scissored_clear_rows_bottom_up(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };

    ctx.clear_color(0.0, 0.0, 0.0, 1.0);
    ctx.clear(ClearFlags::ALL).unwrap();
    ctx.enable(Capability::ScissorTest);
    ctx.scissor(Rect::new(0, 0, SIZE, SIZE / 2));
    ctx.clear_color(0.0, 1.0, 0.0, 1.0);
    ctx.clear(ClearFlags::COLOR).unwrap();
    ctx.disable(Capability::ScissorTest);

    let column = ctx
        .read_pixels(Rect::new(5, 0, 1, SIZE), PixelFormat::Rgb8)
        .unwrap();
    assert_eq!(&column[..3], &[0, 255, 0]);
    assert_eq!(&column[column.len() - 3..], &[0, 0, 0]);
    assert_eq!(pixel(&mut ctx, 40, 31), [0, 255, 0]);
    assert_eq!(pixel(&mut ctx, 40, 32), [0, 0, 0]);
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_read_outside_target_fails(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };
    assert!(ctx
        .read_pixels(Rect::new(SIZE as i32 - 2, 0, 4, 1), PixelFormat::Rgb8)
        .is_err());
}

// ============================================================================
// Draws
// ============================================================================

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_viewport_places_draw(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };

    ctx.clear_color(0.0, 0.0, 0.0, 1.0);
    ctx.clear(ClearFlags::ALL).unwrap();
    ctx.viewport(Rect::new(SIZE as i32 / 2, 0, SIZE / 2, SIZE));
    ctx.color3(0.0, 0.0, 1.0);
    ctx.draw(PrimitiveTopology::QuadList, &quad(-1.0, -1.0, 1.0, 1.0, 0.0))
        .unwrap();

    assert_eq!(pixel(&mut ctx, 16, 32), [0, 0, 0]);
    assert_eq!(pixel(&mut ctx, 48, 32), [0, 0, 255]);
}

/// Offscreen Rgba32Float color with a Depth32Float buffer, nearest wins
#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_depth_test_on_offscreen_target(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };

    let target = OffscreenTarget::new(&mut ctx, 32, 32).unwrap();
    target.bind(&mut ctx).unwrap();
    ctx.viewport(Rect::new(0, 0, 32, 32));
    ctx.clear_color(0.0, 0.0, 0.0, 1.0);
    ctx.clear(ClearFlags::ALL).unwrap();

    ctx.enable(Capability::DepthTest);
    ctx.color3(0.0, 1.0, 0.0);
    ctx.draw(PrimitiveTopology::QuadList, &quad(-1.0, -1.0, 1.0, 1.0, -0.5))
        .unwrap();
    ctx.color3(1.0, 0.0, 0.0);
    ctx.draw(PrimitiveTopology::QuadList, &quad(-1.0, -1.0, 0.0, 1.0, 0.5))
        .unwrap();
    assert_eq!(pixel(&mut ctx, 8, 16), [0, 255, 0]);

    // Without the test the later draw wins
    ctx.disable(Capability::DepthTest);
    ctx.draw(PrimitiveTopology::QuadList, &quad(-1.0, -1.0, 0.0, 1.0, 0.5))
        .unwrap();
    assert_eq!(pixel(&mut ctx, 8, 16), [255, 0, 0]);
    assert_eq!(pixel(&mut ctx, 24, 16), [0, 255, 0]);

    let raw = ctx
        .read_pixels(Rect::new(24, 16, 1, 1), PixelFormat::Rgba32Float)
        .unwrap();
    let texel: [f32; 4] = bytemuck::pod_read_unaligned(&raw);
    assert_eq!(texel, [0.0, 1.0, 0.0, 1.0]);
}

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_textured_quad(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };

    let texture = ctx
        .create_texture(&TextureDescriptor {
            label: Some("red-green".to_string()),
            width: 2,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
        })
        .unwrap();
    ctx.write_texture(texture, &[255, 0, 0, 255, 0, 255, 0, 255])
        .unwrap();

    ctx.clear(ClearFlags::ALL).unwrap();
    ctx.bind_texture(Some(texture)).unwrap();
    ctx.enable(Capability::Texture2D);
    ctx.color3(1.0, 1.0, 1.0);
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    ctx.draw_vertices(
        PrimitiveTopology::QuadList,
        &quad(-1.0, -1.0, 1.0, 1.0, 0.0),
        None,
        Some(&uvs),
    )
    .unwrap();

    assert_eq!(pixel(&mut ctx, 10, 32), [255, 0, 0]);
    assert_eq!(pixel(&mut ctx, 54, 32), [0, 255, 0]);
}

// ============================================================================
// Recorder
// ============================================================================

#[rstest]
#[case::software(Backend::Software)]
#[case::wgpu(Backend::Wgpu)]
fn test_recorder_side_by_side(#[case] backend: Backend) {
    let Some(mut ctx) = context_or_skip(backend) else {
        return;
    };
    let scene = TestScene::new();
    let (mut recorder, capture) =
        memory_recorder(1, 2, RecorderConfig::default(), &scene, &mut ctx);
    recorder
        .set_subframe(0, 0, solid_subframe(32, 24, RED))
        .unwrap();
    recorder
        .set_subframe(0, 1, solid_subframe(40, 24, BLUE))
        .unwrap();

    let frame = recorder.render(&mut ctx).unwrap();

    assert_eq!(frame.dimensions(), (72, 24));
    verify_pixel(&frame, &ExpectedPixel::new(10, 12, [255, 0, 0]));
    verify_pixel(&frame, &ExpectedPixel::new(60, 12, [0, 0, 255]));
    assert_eq!(capture.last_frame().as_ref(), Some(&frame));
    recorder.close().unwrap();
}

/// Repeated draws with the same state reuse one pipeline
#[cfg(feature = "wgpu-backend")]
#[test]
fn test_wgpu_pipeline_cache() {
    init_logging();
    let Ok(mut backend) = mosaic_recorder::WgpuBackend::new(16, 16) else {
        eprintln!("Backend {:?} not available, skipping", Backend::Wgpu);
        return;
    };
    use mosaic_recorder::backend::{ClipVertex, GraphicsBackend};

    let vertex = |x: f32, y: f32| {
        ClipVertex::new(glam::Vec4::new(x, y, 0.0, 1.0), glam::Vec4::ONE, Vec2::ZERO)
    };
    let triangle = [vertex(-1.0, -1.0), vertex(1.0, -1.0), vertex(0.0, 1.0)];
    backend
        .draw(PrimitiveTopology::TriangleList, &triangle)
        .unwrap();
    let built = backend.pipeline_count();
    backend
        .draw(PrimitiveTopology::TriangleList, &triangle)
        .unwrap();
    assert_eq!(backend.pipeline_count(), built);

    backend
        .draw(PrimitiveTopology::LineLoop, &triangle)
        .unwrap();
    assert_eq!(backend.pipeline_count(), built + 1);
    let rgb = backend
        .read_pixels(Rect::new(8, 4, 1, 1), PixelFormat::Rgb8)
        .unwrap();
    assert_eq!(rgb, vec![255, 255, 255]);
}
