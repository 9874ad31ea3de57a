//! Generic camera subframe

use super::{draw_overlays, validate_clear_color, Subframe};
use crate::backend::{Capability, ClearFlags};
use crate::camera::CameraSettings;
use crate::context::RenderContext;
use crate::drawable::{default_drawables, Drawable};
use crate::error::{ConfigError, RenderError};
use crate::scene::Scene;

/// Sky blue
pub const DEFAULT_CLEAR_COLOR: [f32; 3] = [0.45, 0.82, 1.0];

/// Subframe driven by a [`CameraSettings`]; its size is the camera size
pub struct CameraSubframe {
    camera: CameraSettings,
    drawables: Vec<Box<dyn Drawable>>,
    overlays: Vec<Box<dyn Drawable>>,
    clear_color: [f32; 3],
}

impl CameraSubframe {
    /// Subframe drawing the tile grid, scene objects and actor
    pub fn new(camera: CameraSettings) -> Self {
        Self {
            camera,
            drawables: default_drawables(),
            overlays: Vec::new(),
            clear_color: DEFAULT_CLEAR_COLOR,
        }
    }

    /// Black orthogonal panel with identity view, drawing only `drawables`
    pub fn info_panel(
        width: u32,
        height: u32,
        drawables: Vec<Box<dyn Drawable>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            camera: CameraSettings::orthogonal(width, height)?,
            drawables,
            overlays: Vec::new(),
            clear_color: [0.0; 3],
        })
    }

    pub fn with_drawables(mut self, drawables: Vec<Box<dyn Drawable>>) -> Self {
        self.drawables = drawables;
        self
    }

    pub fn with_overlays(mut self, overlays: Vec<Box<dyn Drawable>>) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_overlay(mut self, overlay: impl Drawable + 'static) -> Self {
        self.overlays.push(Box::new(overlay));
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 3]) -> Result<Self, ConfigError> {
        self.clear_color = validate_clear_color(color)?;
        Ok(self)
    }

    pub fn clear_color(&self) -> [f32; 3] {
        self.clear_color
    }

    pub fn camera(&self) -> &CameraSettings {
        &self.camera
    }

    /// Mutable camera access, e.g. to rebind view providers
    pub fn camera_mut(&mut self) -> &mut CameraSettings {
        &mut self.camera
    }
}

impl Subframe for CameraSubframe {
    fn width(&self) -> u32 {
        self.camera.width()
    }

    fn height(&self) -> u32 {
        self.camera.height()
    }

    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        self.camera.apply(ctx, scene, false);
        ctx.enable(Capability::DepthTest);
        let [r, g, b] = self.clear_color;
        ctx.clear_color(r, g, b, 1.0);
        ctx.clear(ClearFlags::COLOR | ClearFlags::DEPTH)?;

        for drawable in &mut self.drawables {
            drawable.draw(scene, ctx)?;
        }

        let (width, height) = (self.width(), self.height());
        draw_overlays(&mut self.overlays, width, height, scene, ctx)
    }
}
