//! Frame output
//!
//! The recorder hands every finished mosaic to a [`FrameSink`]. Sinks are
//! opened lazily by a [`SinkFactory`] once the canvas size is known.

mod ffmpeg;
mod memory;
mod png;

pub use ffmpeg::*;
pub use memory::*;
pub use png::*;

use std::path::PathBuf;

use image::RgbImage;
use thiserror::Error;

/// Output error type
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("ffmpeg not found, please install ffmpeg")]
    FfmpegNotFound,
    #[error("ffmpeg error: {0}")]
    FfmpegFailed(String),
    #[error("Frame is {actual:?} but the sink was opened for {expected:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Sink already finished")]
    Finished,
}

/// Parameters a sink is opened with
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl SinkConfig {
    pub(crate) fn check_frame(&self, frame: &RgbImage) -> Result<(), SinkError> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(SinkError::FrameSizeMismatch {
                expected: (self.width, self.height),
                actual: frame.dimensions(),
            });
        }
        Ok(())
    }
}

/// Append-frame writer
pub trait FrameSink {
    /// Append one top-down RGB frame
    fn append(&mut self, frame: &RgbImage) -> Result<(), SinkError>;

    /// Flush and release the output. Further appends fail.
    fn finish(&mut self) -> Result<(), SinkError>;

    fn frames_written(&self) -> u64;
}

/// Opens sinks at session start
pub trait SinkFactory {
    fn open(&self, config: &SinkConfig) -> Result<Box<dyn FrameSink>, SinkError>;
}

impl<F> SinkFactory for F
where
    F: Fn(&SinkConfig) -> Result<Box<dyn FrameSink>, SinkError>,
{
    fn open(&self, config: &SinkConfig) -> Result<Box<dyn FrameSink>, SinkError> {
        self(config)
    }
}

/// Built-in output kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// Video file encoded by an external `ffmpeg` process
    Ffmpeg { codec: String },
    /// Numbered PNG files in a directory
    PngSequence,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Ffmpeg {
            codec: "libx264".to_string(),
        }
    }
}

impl SinkFactory for OutputFormat {
    fn open(&self, config: &SinkConfig) -> Result<Box<dyn FrameSink>, SinkError> {
        match self {
            OutputFormat::Ffmpeg { codec } => Ok(Box::new(FfmpegSink::spawn(config.clone(), codec)?)),
            OutputFormat::PngSequence => Ok(Box::new(PngSequenceSink::create(config.clone())?)),
        }
    }
}
