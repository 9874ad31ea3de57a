//! Video output through an external ffmpeg process.
//!
//! Frames are piped as raw rgb24 to ffmpeg's stdin; ffmpeg encodes them into
//! the container given by the output path's extension.

use std::io::Write;
use std::process::{Child, Command, Stdio};

use image::RgbImage;

use super::{FrameSink, SinkConfig, SinkError};

/// Sink encoding frames with `ffmpeg`
pub struct FfmpegSink {
    config: SinkConfig,
    child: Option<Child>,
    frames: u64,
}

impl FfmpegSink {
    /// Start ffmpeg writing to `config.path`, creating parent directories
    pub fn spawn(config: SinkConfig, codec: &str) -> Result<Self, SinkError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let size = format!("{}x{}", config.width, config.height);
        let fps = config.fps.to_string();
        let child = Command::new("ffmpeg")
            .args(["-y", "-loglevel", "error"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", size.as_str(), "-r", fps.as_str(), "-i", "-"])
            // yuv420p needs even dimensions
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", codec, "-pix_fmt", "yuv420p"])
            .arg(&config.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => SinkError::FfmpegNotFound,
                _ => SinkError::Io(e),
            })?;

        log::debug!(
            "FfmpegSink: encoding {} at {} fps with {} to {}",
            size,
            config.fps,
            codec,
            config.path.display()
        );
        Ok(Self {
            config,
            child: Some(child),
            frames: 0,
        })
    }
}

impl FrameSink for FfmpegSink {
    fn append(&mut self, frame: &RgbImage) -> Result<(), SinkError> {
        self.config.check_frame(frame)?;
        let stdin = self
            .child
            .as_mut()
            .and_then(|child| child.stdin.as_mut())
            .ok_or(SinkError::Finished)?;
        stdin.write_all(frame.as_raw())?;
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        drop(child.stdin.take());
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SinkError::FfmpegFailed(stderr.trim().to_string()));
        }
        log::debug!(
            "FfmpegSink: wrote {} frames to {}",
            self.frames,
            self.config.path.display()
        );
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            log::warn!(
                "FfmpegSink: dropped without finish, closing {}",
                self.config.path.display()
            );
            if let Err(e) = self.finish() {
                log::warn!("FfmpegSink: {}", e);
            }
        }
    }
}
