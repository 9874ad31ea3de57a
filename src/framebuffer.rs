//! Offscreen render target

use crate::backend::*;
use crate::context::RenderContext;
use crate::error::RenderError;

/// Color + depth render target of fixed size
#[derive(Debug)]
pub struct OffscreenTarget {
    width: u32,
    height: u32,
    framebuffer: FramebufferHandle,
    color: TextureHandle,
    depth: RenderbufferHandle,
}

impl OffscreenTarget {
    /// Allocate the attachments, check completeness and leave the default
    /// target bound.
    pub fn new(ctx: &mut RenderContext, width: u32, height: u32) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(BackendError::FramebufferCreationFailed(format!(
                "offscreen target needs a non-zero size, got {}x{}",
                width, height
            ))
            .into());
        }
        ctx.make_current()?;

        let framebuffer = ctx.create_framebuffer(Some("offscreen"))?;
        let color = ctx.create_texture(&TextureDescriptor {
            label: Some("offscreen color".to_string()),
            width,
            height,
            format: TextureFormat::Rgba32Float,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
        })?;
        let depth = ctx.create_renderbuffer(&RenderbufferDescriptor {
            label: Some("offscreen depth".to_string()),
            width,
            height,
            format: TextureFormat::Depth32Float,
        })?;
        ctx.attach_texture(framebuffer, Attachment::Color0, color)?;
        ctx.attach_renderbuffer(framebuffer, Attachment::Depth, depth)?;

        let status = ctx.framebuffer_status(framebuffer);
        ctx.bind_framebuffer(None)?;
        if status != FramebufferStatus::Complete {
            return Err(RenderError::IncompleteFramebuffer(status));
        }

        log::debug!("OffscreenTarget: created {}x{} target", width, height);
        Ok(Self {
            width,
            height,
            framebuffer,
            color,
            depth,
        })
    }

    /// Make this the active render destination covering the whole target
    pub fn bind(&self, ctx: &mut RenderContext) -> Result<(), RenderError> {
        ctx.make_current()?;
        ctx.bind_framebuffer(Some(self.framebuffer))?;
        ctx.viewport(Rect::new(0, 0, self.width, self.height));
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.framebuffer
    }

    pub fn color_texture(&self) -> TextureHandle {
        self.color
    }

    pub fn depth_buffer(&self) -> RenderbufferHandle {
        self.depth
    }
}

#[cfg(all(test, feature = "software"))]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    #[test]
    fn test_new_leaves_default_bound() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(16, 16));
        let target = OffscreenTarget::new(&mut ctx, 64, 32).unwrap();
        assert_eq!(target.size(), (64, 32));
        assert_eq!(ctx.bound_framebuffer(), None);
        assert_eq!(ctx.framebuffer_status(target.framebuffer()), FramebufferStatus::Complete);
    }

    #[test]
    fn test_bind_sets_full_viewport() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(16, 16));
        let target = OffscreenTarget::new(&mut ctx, 64, 32).unwrap();
        ctx.viewport(Rect::new(3, 3, 5, 5));
        target.bind(&mut ctx).unwrap();
        assert_eq!(ctx.bound_framebuffer(), Some(target.framebuffer()));
        assert_eq!(ctx.current_viewport(), Rect::new(0, 0, 64, 32));

        // Reads now come from the target, not the 16x16 surface
        assert!(ctx
            .read_pixels(Rect::new(0, 0, 64, 32), PixelFormat::Rgb8)
            .is_ok());
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(16, 16));
        assert!(matches!(
            OffscreenTarget::new(&mut ctx, 0, 32),
            Err(RenderError::Backend(BackendError::FramebufferCreationFailed(_)))
        ));
    }
}
