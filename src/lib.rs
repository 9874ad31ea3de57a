//! Mosaic Recorder - compositing video recorder for a 3D simulation
//!
//! Renders several camera views of one scene into a single offscreen canvas
//! laid out as a grid, reads the canvas back and appends it to a video or an
//! image sequence.
//!
//! # Features
//! - Grid compositor with per-column/per-row sizing
//! - Perspective and orthogonal cameras, optionally following the simulation
//! - First-person bot view with mounting offset and position noise
//! - Pixel-space text overlays fed by info providers
//! - ffmpeg, PNG sequence and in-memory outputs
//! - Software rasterizer backend (`software` feature)
//! - Headless GPU backend on wgpu (`wgpu-backend` feature)

pub mod backend;
pub mod camera;
pub mod context;
pub mod drawable;
pub mod error;
pub mod framebuffer;
pub mod info;
pub mod output;
pub mod recorder;
pub mod resources;
pub mod scene;
pub mod subframe;

use std::path::PathBuf;

pub use camera::{CameraSettings, ProjectionKind, ViewProviders};
pub use context::RenderContext;
pub use error::{ConfigError, RecorderError, RecorderResult, RenderError};
pub use output::{FrameSink, MemoryCapture, OutputFormat, SinkFactory};
pub use recorder::{GridLayout, Recorder, RecorderState};
pub use scene::{scene_handle, Scene, SceneHandle};
pub use subframe::{BotViewSubframe, CameraSubframe, Subframe};

#[cfg(feature = "software")]
pub use backend::software::SoftwareBackend;

#[cfg(feature = "wgpu-backend")]
pub use backend::wgpu_backend::WgpuBackend;

/// Configuration for a recording
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderConfig {
    /// Video file, or directory for [`OutputFormat::PngSequence`]
    pub output: PathBuf,
    /// Playback frame rate
    pub fps: u32,
    /// How frames are written
    pub format: OutputFormat,
    /// Canvas color behind and between cells
    pub background: [f32; 3],
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("recordings/recording.mp4"),
            fps: 15,
            format: OutputFormat::default(),
            background: [0.0, 0.0, 0.0],
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 {
            return Err(ConfigError::InvalidFrameRate(self.fps));
        }
        subframe::validate_clear_color(self.background)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.fps, 15);
        assert_eq!(
            config.format,
            OutputFormat::Ffmpeg {
                codec: "libx264".to_string()
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = RecorderConfig {
            fps: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidFrameRate(0)));

        let config = RecorderConfig {
            background: [0.0, 2.0, 0.0],
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ClearColorOutOfRange(2.0))
        );
    }
}
