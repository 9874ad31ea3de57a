//! Error types

use thiserror::Error;

use crate::backend::{BackendError, FramebufferStatus};
use crate::info::InfoError;
use crate::output::SinkError;

/// Invalid construction parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid projection '{0}', expected 'perspective' or 'orthogonal'")]
    InvalidProjection(String),
    #[error("Scale must be positive and finite, got {0}")]
    NonPositiveScale(f32),
    #[error("Size must be non-zero, got {width}x{height}")]
    ZeroSize { width: u32, height: u32 },
    #[error("Clear color component {0} is outside [0, 1]")]
    ClearColorOutOfRange(f32),
    #[error("Frame rate must be positive, got {0}")]
    InvalidFrameRate(u32),
    #[error("Grid needs at least one row and one column, got {rows}x{cols}")]
    EmptyGrid { rows: usize, cols: usize },
}

/// Failure while drawing a subframe
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Info provider error: {0}")]
    Info(#[from] InfoError),
    #[error("Offscreen target is not complete: {0:?}")]
    IncompleteFramebuffer(FramebufferStatus),
}

/// Recorder error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Cell ({row}, {col}) is outside the {rows}x{cols} grid")]
    CellOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
    #[error("Subframes cannot change while a recording session is active")]
    SessionActive,
    #[error("No subframes assigned, the canvas would be 0x0")]
    EmptyCanvas,
    #[error("Canvas of {width}x{height} exceeds the largest drawable size")]
    CanvasTooLarge { width: u64, height: u64 },
    #[error("Canvas is {actual:?} but the offscreen target was built for {expected:?}")]
    CanvasMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("Readback returned {actual} bytes, expected {expected}")]
    Readback { expected: usize, actual: usize },
    #[error("Failed to render frame: {0}")]
    Render(#[from] RenderError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Output error: {0}")]
    Sink(#[from] SinkError),
}

pub type RecorderResult<T> = Result<T, RecorderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConfigError::InvalidProjection("fisheye".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid projection 'fisheye', expected 'perspective' or 'orthogonal'"
        );

        let err = RecorderError::CellOutOfBounds {
            row: 2,
            col: 0,
            rows: 2,
            cols: 1,
        };
        assert_eq!(err.to_string(), "Cell (2, 0) is outside the 2x1 grid");
    }

    #[test]
    fn test_render_error_wraps_backend() {
        let err: RenderError = BackendError::ContextLost.into();
        assert!(matches!(err, RenderError::Backend(BackendError::ContextLost)));
        let err: RecorderError = err.into();
        assert_eq!(err.to_string(), "Failed to render frame: Backend error: Context lost");
    }
}
