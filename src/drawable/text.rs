//! Info overlay text

use super::Drawable;
use crate::context::RenderContext;
use crate::error::RenderError;
use crate::info::Info;
use crate::scene::{Label, LabelStyle, Scene};

/// Draws one info provider's text at a fixed pixel position.
///
/// The label is created on the first draw and only its text changes after
/// that.
pub struct TextOverlay {
    info: Box<dyn Info>,
    x: f32,
    y: f32,
    style: LabelStyle,
    label: Option<Box<dyn Label>>,
}

impl TextOverlay {
    pub fn new(info: impl Info + 'static, x: f32, y: f32) -> Self {
        Self {
            info: Box::new(info),
            x,
            y,
            style: LabelStyle::default(),
            label: None,
        }
    }

    pub fn with_style(mut self, style: LabelStyle) -> Self {
        self.style = style;
        self
    }

    /// Text shown by the last draw
    pub fn current_text(&self) -> Option<&str> {
        self.label.as_ref().map(|label| label.text())
    }
}

impl Drawable for TextOverlay {
    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let text = self.info.text_in(scene)?;
        match self.label.as_mut() {
            Some(label) => label.set_text(&text),
            None => self.label = Some(scene.create_label(&text, self.x, self.y, &self.style)),
        }
        if let Some(label) = self.label.as_mut() {
            label.draw(ctx)?;
        }
        Ok(())
    }
}
