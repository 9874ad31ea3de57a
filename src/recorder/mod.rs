//! Mosaic recorder
//!
//! The recorder owns a grid of subframes. Each [`Recorder::render`] draws
//! every subframe into its cell of one offscreen canvas, reads the canvas
//! back and appends it to the output. The first render fixes the layout and
//! opens the output; [`Recorder::close`] finishes it.

mod layout;

pub use layout::*;

use image::RgbImage;

use crate::backend::{Capability, ClearFlags, PixelFormat, Rect};
use crate::context::RenderContext;
use crate::error::{ConfigError, RecorderError, RecorderResult};
use crate::framebuffer::OffscreenTarget;
use crate::output::{FrameSink, SinkConfig, SinkFactory};
use crate::scene::SceneHandle;
use crate::subframe::Subframe;
use crate::RecorderConfig;

/// Recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    /// Subframes may be assigned, nothing is open yet
    Unconfigured,
    /// Layout fixed and output open
    Ready,
    /// Output finished
    Closed,
}

/// Open recording session
struct Session {
    layout: GridLayout,
    sink: Box<dyn FrameSink>,
}

enum SessionState {
    Unconfigured,
    Ready(Session),
    Closed,
}

pub struct Recorder {
    config: RecorderConfig,
    rows: usize,
    cols: usize,
    cells: Vec<Option<Box<dyn Subframe>>>,
    scene: SceneHandle,
    sink_factory: Box<dyn SinkFactory>,
    target: Option<OffscreenTarget>,
    state: SessionState,
}

impl Recorder {
    /// Create a recorder for a `rows` x `cols` grid. The output is opened
    /// through `config.format` unless replaced with
    /// [`with_sink_factory`](Self::with_sink_factory).
    pub fn new(
        config: RecorderConfig,
        rows: usize,
        cols: usize,
        scene: SceneHandle,
        ctx: &mut RenderContext,
    ) -> RecorderResult<Self> {
        config.validate()?;
        if rows == 0 || cols == 0 {
            return Err(ConfigError::EmptyGrid { rows, cols }.into());
        }
        ctx.make_current()?;

        let sink_factory = Box::new(config.format.clone());
        log::debug!(
            "Recorder: {}x{} grid on {} backend",
            rows,
            cols,
            ctx.backend_name()
        );
        Ok(Self {
            config,
            rows,
            cols,
            cells: (0..rows * cols).map(|_| None).collect(),
            scene,
            sink_factory,
            target: None,
            state: SessionState::Unconfigured,
        })
    }

    pub fn with_sink_factory(mut self, factory: impl SinkFactory + 'static) -> Self {
        self.sink_factory = Box::new(factory);
        self
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// `(rows, cols)`
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn scene(&self) -> &SceneHandle {
        &self.scene
    }

    pub fn state(&self) -> RecorderState {
        match self.state {
            SessionState::Unconfigured => RecorderState::Unconfigured,
            SessionState::Ready(_) => RecorderState::Ready,
            SessionState::Closed => RecorderState::Closed,
        }
    }

    /// Place `subframe` at `(row, col)`, replacing any previous one.
    /// Only allowed while no session is open.
    pub fn set_subframe(
        &mut self,
        row: usize,
        col: usize,
        subframe: impl Subframe + 'static,
    ) -> RecorderResult<()> {
        let index = self.cell_index(row, col)?;
        if matches!(self.state, SessionState::Ready(_)) {
            return Err(RecorderError::SessionActive);
        }
        self.cells[index] = Some(Box::new(subframe));
        Ok(())
    }

    /// Remove the subframe at `(row, col)`
    pub fn clear_subframe(&mut self, row: usize, col: usize) -> RecorderResult<()> {
        let index = self.cell_index(row, col)?;
        if matches!(self.state, SessionState::Ready(_)) {
            return Err(RecorderError::SessionActive);
        }
        self.cells[index] = None;
        Ok(())
    }

    pub fn has_subframe(&self, row: usize, col: usize) -> bool {
        self.cell_index(row, col)
            .is_ok_and(|index| self.cells[index].is_some())
    }

    /// Layout of the session if one is open, otherwise of the current cells
    pub fn layout(&self) -> GridLayout {
        match &self.state {
            SessionState::Ready(session) => session.layout.clone(),
            _ => self.compute_layout(),
        }
    }

    pub fn target(&self) -> Option<&OffscreenTarget> {
        self.target.as_ref()
    }

    /// Frames appended in the open session
    pub fn frames_written(&self) -> u64 {
        match &self.state {
            SessionState::Ready(session) => session.sink.frames_written(),
            _ => 0,
        }
    }

    /// Render one mosaic frame, append it to the output and return it
    /// top-down. Opens a session first if none is open.
    pub fn render(&mut self, ctx: &mut RenderContext) -> RecorderResult<RgbImage> {
        let mut session = match std::mem::replace(&mut self.state, SessionState::Unconfigured) {
            SessionState::Ready(session) => session,
            previous => match self.begin_session(ctx) {
                Ok(session) => session,
                Err(e) => {
                    self.state = previous;
                    return Err(e);
                }
            },
        };

        let result = self.render_frame(ctx, &mut session);
        self.state = SessionState::Ready(session);
        result
    }

    /// Finish the output of the open session. Does nothing when no session
    /// is open.
    pub fn close(&mut self) -> RecorderResult<()> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Ready(mut session) => {
                let frames = session.sink.frames_written();
                session.sink.finish()?;
                log::info!(
                    "Recorder: closed {} after {} frames",
                    self.config.output.display(),
                    frames
                );
                Ok(())
            }
            previous => {
                self.state = previous;
                Ok(())
            }
        }
    }

    fn cell_index(&self, row: usize, col: usize) -> RecorderResult<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(RecorderError::CellOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    fn compute_layout(&self) -> GridLayout {
        GridLayout::from_cells(self.rows, self.cols, |row, col| {
            self.cells[row * self.cols + col]
                .as_ref()
                .map(|subframe| (subframe.width(), subframe.height()))
        })
    }

    fn begin_session(&mut self, ctx: &mut RenderContext) -> RecorderResult<Session> {
        let layout = self.compute_layout();
        if layout.is_empty() {
            return Err(RecorderError::EmptyCanvas);
        }
        let (width, height) = layout.checked_size().ok_or_else(|| {
            let (width, height) = layout.exact_size();
            RecorderError::CanvasTooLarge { width, height }
        })?;

        match &self.target {
            Some(target) if target.size() != (width, height) => {
                return Err(RecorderError::CanvasMismatch {
                    expected: target.size(),
                    actual: (width, height),
                });
            }
            Some(_) => {}
            None => self.target = Some(OffscreenTarget::new(ctx, width, height)?),
        }

        let sink = self.sink_factory.open(&SinkConfig {
            path: self.config.output.clone(),
            width,
            height,
            fps: self.config.fps,
        })?;

        log::info!(
            "Recorder: recording {}x{} at {} fps to {}",
            width,
            height,
            self.config.fps,
            self.config.output.display()
        );
        Ok(Session { layout, sink })
    }

    fn render_frame(
        &mut self,
        ctx: &mut RenderContext,
        session: &mut Session,
    ) -> RecorderResult<RgbImage> {
        let Some(target) = self.target.as_ref() else {
            return Err(RecorderError::EmptyCanvas);
        };
        let (width, height) = target.size();
        target.bind(ctx)?;

        let pixels = self.draw_canvas(ctx, &session.layout).and_then(|()| {
            ctx.read_pixels(Rect::new(0, 0, width, height), PixelFormat::Rgb8)
                .map_err(RecorderError::from)
        });
        ctx.bind_framebuffer(None)?;
        let pixels = pixels?;

        let expected = width as usize * height as usize * 3;
        let actual = pixels.len();
        let mut image = RgbImage::from_raw(width, height, pixels)
            .filter(|_| actual == expected)
            .ok_or(RecorderError::Readback { expected, actual })?;
        // GL rows start at the bottom
        image::imageops::flip_vertical_in_place(&mut image);

        session.sink.append(&image)?;
        log::trace!(
            "Recorder: frame {} appended",
            session.sink.frames_written()
        );
        Ok(image)
    }

    /// Clear the whole canvas, then draw each cell row-major under its own
    /// viewport and scissor. Scissoring is switched off again on return.
    fn draw_canvas(&mut self, ctx: &mut RenderContext, layout: &GridLayout) -> RecorderResult<()> {
        let [r, g, b] = self.config.background;
        ctx.disable(Capability::ScissorTest);
        ctx.clear_color(r, g, b, 1.0);
        ctx.clear(ClearFlags::COLOR | ClearFlags::DEPTH)?;

        ctx.enable(Capability::ScissorTest);
        let scene = self.scene.read();
        let cols = self.cols;
        let result = self
            .cells
            .iter_mut()
            .enumerate()
            .try_for_each(|(index, cell)| {
                let Some(subframe) = cell else {
                    return Ok(());
                };
                let rect = layout.cell_rect(
                    index / cols,
                    index % cols,
                    subframe.width(),
                    subframe.height(),
                );
                ctx.viewport(rect);
                ctx.scissor(rect);
                subframe.draw(&*scene, ctx)
            });
        ctx.disable(Capability::ScissorTest);
        result.map_err(RecorderError::from)
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Ready(_)) {
            log::warn!("Recorder: dropped with an open session, closing");
            if let Err(e) = self.close() {
                log::warn!("Recorder: {}", e);
            }
        }
    }
}
