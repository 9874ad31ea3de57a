//! Subframes
//!
//! A subframe is one camera view of the mosaic. It owns its clear color,
//! its content drawables and the overlays drawn on top in pixel space.

mod bot_view;
mod camera_view;

pub use bot_view::*;
pub use camera_view::*;

use crate::backend::Capability;
use crate::context::{MatrixMode, RenderContext};
use crate::drawable::Drawable;
use crate::error::{ConfigError, RenderError};
use crate::scene::Scene;

/// Independently rendered view placed into one cell of the mosaic
pub trait Subframe {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Render into the caller's viewport. The caller binds the target and
    /// sets viewport and scissor to the cell rectangle.
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError>;
}

/// Check that every component lies in `[0, 1]`
pub fn validate_clear_color(color: [f32; 3]) -> Result<[f32; 3], ConfigError> {
    match color.iter().find(|c| !(0.0..=1.0).contains(*c)) {
        Some(&bad) => Err(ConfigError::ClearColorOutOfRange(bad)),
        None => Ok(color),
    }
}

/// Overlay pass: depth test off, pixel-space ortho of `width`×`height`,
/// identity model-view. Depth testing is re-enabled afterwards, also when
/// an overlay fails.
pub(crate) fn draw_overlays(
    overlays: &mut [Box<dyn Drawable>],
    width: u32,
    height: u32,
    scene: &dyn Scene,
    ctx: &mut RenderContext,
) -> Result<(), RenderError> {
    ctx.disable(Capability::DepthTest);
    let mut result = Ok(());
    if !overlays.is_empty() {
        ctx.matrix_mode(MatrixMode::Projection);
        ctx.load_identity();
        ctx.ortho(0.0, width as f32, 0.0, height as f32, -1.0, 1.0);
        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.load_identity();
        result = overlays
            .iter_mut()
            .try_for_each(|overlay| overlay.draw(scene, ctx));
    }
    ctx.enable(Capability::DepthTest);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_color_range() {
        assert_eq!(validate_clear_color([0.0, 0.5, 1.0]), Ok([0.0, 0.5, 1.0]));
        assert_eq!(
            validate_clear_color([0.0, 1.5, 1.0]),
            Err(ConfigError::ClearColorOutOfRange(1.5))
        );
        assert!(validate_clear_color([f32::NAN, 0.0, 0.0]).is_err());
    }
}
