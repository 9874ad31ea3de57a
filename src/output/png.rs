//! PNG sequence output

use std::path::PathBuf;

use image::RgbImage;

use super::{FrameSink, SinkConfig, SinkError};

/// Writes `frame_00001.png`, `frame_00002.png`, ... into a directory
pub struct PngSequenceSink {
    config: SinkConfig,
    frames: u64,
    finished: bool,
}

impl PngSequenceSink {
    /// `config.path` names the output directory; it is created if missing
    pub fn create(config: SinkConfig) -> Result<Self, SinkError> {
        std::fs::create_dir_all(&config.path)?;
        Ok(Self {
            config,
            frames: 0,
            finished: false,
        })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.config.path.join(format!("frame_{:05}.png", index))
    }
}

impl FrameSink for PngSequenceSink {
    fn append(&mut self, frame: &RgbImage) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Finished);
        }
        self.config.check_frame(frame)?;
        let path = self.frame_path(self.frames + 1);
        frame.save(&path)?;
        self.frames += 1;
        log::trace!("PngSequenceSink: wrote {}", path.display());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_numbered_frames() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            path: dir.path().join("frames"),
            width: 4,
            height: 2,
            fps: 15,
        };
        let mut sink = PngSequenceSink::create(config).unwrap();
        let frame = RgbImage::from_pixel(4, 2, image::Rgb([255, 0, 0]));
        sink.append(&frame).unwrap();
        sink.append(&frame).unwrap();
        sink.finish().unwrap();

        assert_eq!(sink.frames_written(), 2);
        let first = image::open(dir.path().join("frames/frame_00001.png"))
            .unwrap()
            .to_rgb8();
        assert_eq!(first.get_pixel(3, 1), &image::Rgb([255, 0, 0]));
        assert!(dir.path().join("frames/frame_00002.png").exists());
        assert!(matches!(sink.append(&frame), Err(SinkError::Finished)));
    }

    #[test]
    fn test_rejects_wrong_size() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            path: dir.path().to_path_buf(),
            width: 4,
            height: 2,
            fps: 15,
        };
        let mut sink = PngSequenceSink::create(config).unwrap();
        let frame = RgbImage::new(2, 2);
        assert!(matches!(
            sink.append(&frame),
            Err(SinkError::FrameSizeMismatch {
                expected: (4, 2),
                actual: (2, 2)
            })
        ));
    }
}
