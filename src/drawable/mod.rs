//! Drawables
//!
//! A [`Drawable`] renders part of the scene with whatever target, viewport
//! and projection the caller has set up. It may change the model-view
//! matrix, the current color and texturing state, but never the bound
//! target, the viewport or the projection.

mod objects;
mod text;
mod tiles;

pub use objects::*;
pub use text::*;
pub use tiles::*;

use crate::context::RenderContext;
use crate::error::RenderError;
use crate::scene::Scene;

/// Unit of rendering logic invoked against the scene
pub trait Drawable {
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError>;
}

impl<F> Drawable for F
where
    F: FnMut(&dyn Scene, &mut RenderContext) -> Result<(), RenderError>,
{
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        self(scene, ctx)
    }
}

/// Tile grid, scene objects and primary actor, in that order
pub fn default_drawables() -> Vec<Box<dyn Drawable>> {
    vec![
        Box::new(TileGrid::default()),
        Box::new(ObjectSet::default()),
        Box::new(PrimaryActor::default()),
    ]
}
