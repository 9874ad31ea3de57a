//! Tile grid with optional lane curve overlay

use std::f32::consts::FRAC_PI_2;

use glam::Vec3;

use super::Drawable;
use crate::backend::{Capability, PrimitiveTopology};
use crate::context::{MatrixMode, RenderContext};
use crate::error::RenderError;
use crate::scene::{bezier_point, direction_vector, Scene, Tile};

const HIGHLIGHT_COLOR: [f32; 3] = [1.0, 0.0, 0.0];
const CANDIDATE_COLOR: [f32; 3] = [0.0, 0.0, 1.0];

/// Draws every non-empty tile of the scene grid
#[derive(Debug, Clone)]
pub struct TileGrid {
    /// Points per drawn bezier curve
    pub curve_samples: usize,
}

impl Default for TileGrid {
    fn default() -> Self {
        Self { curve_samples: 20 }
    }
}

/// Index of the curve whose heading best matches `facing`
pub fn select_curve(curves: &[[Vec3; 4]], facing: Vec3) -> Option<usize> {
    curves
        .iter()
        .map(|c| (c[3] - c[0]).normalize_or_zero().dot(facing))
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}

impl TileGrid {
    fn draw_tile_curves(&self, tile: &Tile, ctx: &mut RenderContext) -> Result<(), RenderError> {
        ctx.disable(Capability::Texture2D);
        let facing = direction_vector(tile.angle as f32 * FRAC_PI_2);
        let best = select_curve(&tile.curves, facing);
        let samples = self.curve_samples.max(2);

        for (index, curve) in tile.curves.iter().enumerate() {
            let [r, g, b] = if Some(index) == best {
                HIGHLIGHT_COLOR
            } else {
                CANDIDATE_COLOR
            };
            ctx.color3(r, g, b);
            let points: Vec<Vec3> = (0..samples)
                .map(|k| bezier_point(curve, k as f32 / (samples - 1) as f32))
                .collect();
            ctx.draw(PrimitiveTopology::LineStrip, &points)?;
        }
        Ok(())
    }
}

impl Drawable for TileGrid {
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let (grid_w, grid_h) = scene.grid_size();
        let size = scene.road_tile_size();
        ctx.matrix_mode(MatrixMode::ModelView);

        for j in 0..grid_h {
            for i in 0..grid_w {
                let Some(tile) = scene.tile(i, j) else {
                    continue;
                };

                let [r, g, b] = tile.color;
                ctx.color3(r, g, b);
                ctx.with_pushed_matrix(|ctx| -> Result<(), RenderError> {
                    ctx.translate(Vec3::new((i as f32 + 0.5) * size, 0.0, (j as f32 + 0.5) * size));
                    ctx.rotate(tile.angle as f32 * 90.0, Vec3::Y);
                    match tile.texture {
                        Some(texture) => {
                            ctx.bind_texture(Some(texture))?;
                            ctx.enable(Capability::Texture2D);
                        }
                        None => ctx.disable(Capability::Texture2D),
                    }
                    scene.draw_road_tile(ctx)?;
                    Ok(())
                })?;

                if scene.draw_curves() && tile.drivable {
                    self.draw_tile_curves(tile, ctx)?;
                }
            }
        }

        ctx.disable(Capability::Texture2D);
        ctx.bind_texture(None)?;
        Ok(())
    }
}
