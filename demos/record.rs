//! Record the built-in scene as a 2x2 mosaic.
//!
//! Cells, from the bottom row up:
//! - top-down orthogonal map | chase camera behind the actor
//! - on-board bot camera     | info panel with live telemetry
//!
//! ```bash
//! cargo run --example record -- --frames 150 --output recordings/demo.mp4
//! cargo run --example record -- --format png --output recordings/frames
//! cargo run --example record -- --backend wgpu --road-texture assets/asphalt.png
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use glam::Vec3;
use parking_lot::RwLock;

use mosaic_recorder::drawable::TextOverlay;
use mosaic_recorder::backend::BackendResult;
use mosaic_recorder::info::{BotAngle, BotPosition, BotSpeed, IsInLane, StepCount};
use mosaic_recorder::resources::TextureData;
use mosaic_recorder::scene::{FirstPersonCamera, Scene, SimpleScene, ROAD_TILE_SIZE};
use mosaic_recorder::{
    BotViewSubframe, CameraSettings, CameraSubframe, OutputFormat, ProjectionKind, Recorder,
    RecorderConfig, RecorderError, RenderContext, SceneHandle, SoftwareBackend, ViewProviders,
    WgpuBackend,
};

const CELL_WIDTH: u32 = 320;
const CELL_HEIGHT: u32 = 240;

/// Output kind selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliFormat {
    /// Video file through ffmpeg
    #[default]
    Video,
    /// Numbered PNG files
    Png,
}

/// Rendering backend selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliBackend {
    /// CPU rasterizer
    #[default]
    Software,
    /// GPU through wgpu
    Wgpu,
}

impl CliBackend {
    fn context(self) -> BackendResult<RenderContext> {
        match self {
            CliBackend::Software => Ok(RenderContext::new(SoftwareBackend::new(
                CELL_WIDTH,
                CELL_HEIGHT,
            ))),
            CliBackend::Wgpu => Ok(RenderContext::new(WgpuBackend::new(CELL_WIDTH, CELL_HEIGHT)?)),
        }
    }
}

/// Mosaic recorder demo
#[derive(Parser, Debug)]
#[command(name = "record", about = "Record the built-in scene as a 2x2 mosaic", version)]
struct Args {
    /// Video file, or directory for --format png
    #[arg(long, default_value = "recordings/recording.mp4")]
    output: PathBuf,

    /// Number of frames to record
    #[arg(long, default_value = "90")]
    frames: u32,

    /// Playback frame rate
    #[arg(long, default_value = "15")]
    fps: u32,

    #[arg(long, default_value = "video", value_enum)]
    format: CliFormat,

    /// Video codec passed to ffmpeg
    #[arg(long, default_value = "libx264")]
    codec: String,

    /// Ring road size in tiles
    #[arg(long, default_value = "6")]
    tiles: usize,

    /// Draw lane curves on road tiles
    #[arg(long)]
    curves: bool,

    #[arg(long, default_value = "software", value_enum)]
    backend: CliBackend,

    /// Image drawn on road tiles instead of the checkerboard
    #[arg(long)]
    road_texture: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let road = match args.road_texture.as_deref().map(TextureData::from_file) {
        Some(Ok(data)) => Some(data),
        Some(Err(e)) => {
            log::error!("Cannot load road texture: {}", e);
            std::process::exit(1);
        }
        None => None,
    };
    if let Err(e) = run(&args, road) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args, road: Option<TextureData>) -> Result<(), RecorderError> {
    let mut ctx = args.backend.context()?;
    log::info!("Rendering with the {} backend", ctx.backend_name());

    let mut scene = SimpleScene::new(args.tiles, args.tiles).with_curves(args.curves);
    if let Some(road) = road {
        scene = scene.with_road_texture(road);
    }
    scene.load_textures(&mut ctx)?;
    scene.set_first_person_camera(FirstPersonCamera {
        resolution: (CELL_WIDTH, CELL_HEIGHT),
        ..Default::default()
    });
    let scene = Arc::new(RwLock::new(scene));
    let handle: SceneHandle = scene.clone();

    let config = RecorderConfig {
        output: args.output.clone(),
        fps: args.fps,
        format: match args.format {
            CliFormat::Video => OutputFormat::Ffmpeg {
                codec: args.codec.clone(),
            },
            CliFormat::Png => OutputFormat::PngSequence,
        },
        ..Default::default()
    };
    let mut recorder = Recorder::new(config, 2, 2, handle.clone(), &mut ctx)?;

    recorder.set_subframe(0, 0, top_down_view(args.tiles)?)?;
    recorder.set_subframe(0, 1, chase_view()?)?;
    recorder.set_subframe(1, 0, BotViewSubframe::new(CELL_WIDTH, CELL_HEIGHT)?)?;
    recorder.set_subframe(1, 1, info_panel(&handle)?)?;

    let dt = 1.0 / args.fps as f32;
    for frame in 0..args.frames {
        recorder.render(&mut ctx)?;
        scene.write().step(dt);
        if (frame + 1) % args.fps == 0 {
            log::info!("Recorded {}/{} frames", frame + 1, args.frames);
        }
    }
    recorder.close()
}

/// Orthogonal map looking straight down on the whole ring
fn top_down_view(tiles: usize) -> Result<CameraSubframe, RecorderError> {
    let extent = tiles as f32 * ROAD_TILE_SIZE;
    let centre = Vec3::new(extent / 2.0, 0.0, extent / 2.0);
    let scale = CELL_HEIGHT as f32 / (extent * 1.1);

    let camera = CameraSettings::new(CELL_WIDTH, CELL_HEIGHT, ProjectionKind::Orthogonal, scale)?
        .with_view(ViewProviders::new(
            move |_: &dyn Scene| centre + Vec3::Y * 5.0,
            |_: &dyn Scene| Vec3::NEG_Y,
            |_: &dyn Scene| Vec3::NEG_Z,
        ));
    Ok(CameraSubframe::new(camera))
}

/// Perspective camera trailing the actor
fn chase_view() -> Result<CameraSubframe, RecorderError> {
    let camera = CameraSettings::perspective(CELL_WIDTH, CELL_HEIGHT)?.with_view(ViewProviders::new(
        |scene: &dyn Scene| {
            scene.actor_position() - scene.actor_direction() * 0.6 + Vec3::Y * 0.35
        },
        |scene: &dyn Scene| scene.actor_direction() - Vec3::Y * 0.4,
        |_: &dyn Scene| Vec3::Y,
    ));
    Ok(CameraSubframe::new(camera))
}

/// Black panel listing the actor's telemetry
fn info_panel(scene: &SceneHandle) -> Result<CameraSubframe, RecorderError> {
    let line = |row: u32| CELL_HEIGHT as f32 - 24.0 * (row + 1) as f32;
    let bound = || Some(scene.clone());

    Ok(CameraSubframe::info_panel(CELL_WIDTH, CELL_HEIGHT, Vec::new())?
        .with_overlay(TextOverlay::new(BotPosition::new(bound()), 8.0, line(0)))
        .with_overlay(TextOverlay::new(BotAngle::new(bound()), 8.0, line(1)))
        .with_overlay(TextOverlay::new(BotSpeed::new(bound()), 8.0, line(2)))
        .with_overlay(TextOverlay::new(StepCount::new(bound()), 8.0, line(3)))
        .with_overlay(TextOverlay::new(IsInLane::new(bound()), 8.0, line(4))))
}
