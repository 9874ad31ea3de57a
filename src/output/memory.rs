//! In-memory capture, for tests and tools that post-process frames

use std::sync::Arc;

use image::RgbImage;
use parking_lot::Mutex;

use super::{FrameSink, SinkConfig, SinkError, SinkFactory};

#[derive(Default)]
struct Captured {
    frames: Vec<RgbImage>,
    sessions: Vec<SinkConfig>,
    finished: usize,
}

/// Sink factory keeping every frame in memory. Clones share storage, so a
/// clone kept by the caller observes what the recorder wrote.
#[derive(Clone, Default)]
pub struct MemoryCapture {
    inner: Arc<Mutex<Captured>>,
}

impl MemoryCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<RgbImage> {
        self.inner.lock().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn last_frame(&self) -> Option<RgbImage> {
        self.inner.lock().frames.last().cloned()
    }

    /// Configs of every opened sink, in order
    pub fn sessions(&self) -> Vec<SinkConfig> {
        self.inner.lock().sessions.clone()
    }

    /// Number of sinks that were finished
    pub fn finished_sessions(&self) -> usize {
        self.inner.lock().finished
    }
}

impl SinkFactory for MemoryCapture {
    fn open(&self, config: &SinkConfig) -> Result<Box<dyn FrameSink>, SinkError> {
        self.inner.lock().sessions.push(config.clone());
        Ok(Box::new(InMemorySink {
            capture: self.clone(),
            config: config.clone(),
            frames: 0,
            finished: false,
        }))
    }
}

/// Sink opened by [`MemoryCapture`]
pub struct InMemorySink {
    capture: MemoryCapture,
    config: SinkConfig,
    frames: u64,
    finished: bool,
}

impl FrameSink for InMemorySink {
    fn append(&mut self, frame: &RgbImage) -> Result<(), SinkError> {
        if self.finished {
            return Err(SinkError::Finished);
        }
        self.config.check_frame(frame)?;
        self.capture.inner.lock().frames.push(frame.clone());
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if !self.finished {
            self.finished = true;
            self.capture.inner.lock().finished += 1;
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }
}
