//! Scene objects, the primary actor and the origin marker

use glam::Vec3;

use super::Drawable;
use crate::backend::PrimitiveTopology;
use crate::context::{MatrixMode, RenderContext};
use crate::error::RenderError;
use crate::scene::Scene;

/// Height of the actor bounding quad above the ground
const BBOX_HEIGHT: f32 = 0.01;

/// Renders every dynamic scene object
#[derive(Debug, Clone, Default)]
pub struct ObjectSet {
    pub draw_bbox: bool,
}

impl ObjectSet {
    pub fn new(draw_bbox: bool) -> Self {
        Self { draw_bbox }
    }
}

impl Drawable for ObjectSet {
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        for object in scene.objects() {
            object.render(ctx, self.draw_bbox)?;
        }
        Ok(())
    }
}

/// Renders the actor mesh, optionally with its footprint outline
#[derive(Debug, Clone, Default)]
pub struct PrimaryActor {
    pub draw_bbox: bool,
}

impl PrimaryActor {
    pub fn new(draw_bbox: bool) -> Self {
        Self { draw_bbox }
    }
}

impl Drawable for PrimaryActor {
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let position = scene.actor_position();
        let degrees = scene.actor_angle().to_degrees();

        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.with_pushed_matrix(|ctx| {
            ctx.translate(position);
            ctx.rotate(degrees, Vec3::Y);
            scene.render_actor_mesh(ctx)
        })?;

        if self.draw_bbox {
            let outline = scene
                .actor_corners()
                .map(|corner| Vec3::new(corner.x, BBOX_HEIGHT, corner.y));
            ctx.color3(1.0, 0.0, 0.0);
            ctx.draw(PrimitiveTopology::LineLoop, &outline)?;
        }
        Ok(())
    }
}

/// Single point at the world origin
#[derive(Debug, Clone)]
pub struct OriginMarker {
    pub color: [f32; 3],
}

impl Default for OriginMarker {
    fn default() -> Self {
        Self {
            color: [1.0, 0.0, 0.0],
        }
    }
}

impl Drawable for OriginMarker {
    fn draw(&mut self, _scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let [r, g, b] = self.color;
        ctx.color3(r, g, b);
        ctx.draw(PrimitiveTopology::PointList, &[Vec3::ZERO])?;
        Ok(())
    }
}
