//! CPU software backend.
//!
//! Renders into plain memory. Useful for headless recording and for tests,
//! where no display or GPU driver is available. Color storage is RGBA float,
//! depth is one `f32` per pixel, and rows are stored bottom-up like GL.

mod raster;

use std::collections::HashMap;

use glam::Vec4;

use crate::backend::traits::*;
use crate::backend::types::*;

use raster::{RasterState, RasterTarget, Sampler};

struct SoftTexture {
    desc: TextureDescriptor,
    texels: Vec<Vec4>,
}

struct SoftRenderbuffer {
    desc: RenderbufferDescriptor,
    depth: Vec<f32>,
}

#[derive(Default)]
struct SoftFramebuffer {
    label: Option<String>,
    color: Option<TextureHandle>,
    depth: Option<RenderbufferHandle>,
}

/// Software rasterizer backend.
pub struct SoftwareBackend {
    surface_width: u32,
    surface_height: u32,
    surface_color: Vec<Vec4>,
    surface_depth: Vec<f32>,

    textures: HashMap<u64, SoftTexture>,
    renderbuffers: HashMap<u64, SoftRenderbuffer>,
    framebuffers: HashMap<u64, SoftFramebuffer>,
    next_id: u64,

    bound_framebuffer: Option<FramebufferHandle>,
    bound_texture: Option<TextureHandle>,
    viewport: Rect,
    scissor: Rect,
    depth_test: bool,
    scissor_test: bool,
    texture_2d: bool,
    current: bool,
}

impl SoftwareBackend {
    /// Create a backend whose default surface has the given size.
    pub fn new(width: u32, height: u32) -> Self {
        let pixels = width as usize * height as usize;
        log::debug!("SoftwareBackend: default surface {}x{}", width, height);
        Self {
            surface_width: width,
            surface_height: height,
            surface_color: vec![Vec4::ZERO; pixels],
            surface_depth: vec![1.0; pixels],
            textures: HashMap::new(),
            renderbuffers: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            bound_framebuffer: None,
            bound_texture: None,
            viewport: Rect::new(0, 0, width, height),
            scissor: Rect::new(0, 0, width, height),
            depth_test: false,
            scissor_test: false,
            texture_2d: false,
            current: false,
        }
    }

    /// Whether [`GraphicsBackend::make_current`] has been called.
    pub fn is_current(&self) -> bool {
        self.current
    }

    /// Number of live framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Resolve the bound target into mutable color and depth storage.
    fn target(&mut self) -> BackendResult<RasterTarget<'_>> {
        let Some(handle) = self.bound_framebuffer else {
            return Ok(RasterTarget {
                width: self.surface_width,
                height: self.surface_height,
                color: Some(self.surface_color.as_mut_slice()),
                depth: Some(self.surface_depth.as_mut_slice()),
            });
        };

        let status = self.framebuffer_status(handle);
        if status != FramebufferStatus::Complete {
            return Err(BackendError::IncompleteFramebuffer {
                id: handle.0,
                status,
            });
        }
        let framebuffer = self
            .framebuffers
            .get(&handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: handle.0,
            })?;
        let (color_handle, depth_handle) = (framebuffer.color, framebuffer.depth);

        let mut width = 0;
        let mut height = 0;
        let color = match color_handle {
            Some(h) => {
                let texture = self.textures.get_mut(&h.0).ok_or(BackendError::InvalidHandle {
                    kind: "texture",
                    id: h.0,
                })?;
                width = texture.desc.width;
                height = texture.desc.height;
                Some(texture.texels.as_mut_slice())
            }
            None => None,
        };
        let depth = match depth_handle {
            Some(h) => {
                let renderbuffer =
                    self.renderbuffers
                        .get_mut(&h.0)
                        .ok_or(BackendError::InvalidHandle {
                            kind: "renderbuffer",
                            id: h.0,
                        })?;
                width = renderbuffer.desc.width;
                height = renderbuffer.desc.height;
                Some(renderbuffer.depth.as_mut_slice())
            }
            None => None,
        };

        Ok(RasterTarget {
            width,
            height,
            color,
            depth,
        })
    }

    /// Texture sampled by the next draw. A texture that is also the color
    /// attachment being drawn into is not sampled.
    fn sampled_texture(&self) -> Option<u64> {
        let id = self.bound_texture.filter(|_| self.texture_2d)?.0;
        let feedback = self
            .bound_framebuffer
            .and_then(|fb| self.framebuffers.get(&fb.0))
            .and_then(|fb| fb.color)
            .is_some_and(|color| color.0 == id);
        if feedback {
            log::trace!("SoftwareBackend: texture {} is the draw target, not sampling", id);
            return None;
        }
        self.textures.contains_key(&id).then_some(id)
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "Software"
    }

    fn make_current(&mut self) -> BackendResult<()> {
        self.current = true;
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.surface_width, self.surface_height)
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has zero size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        if desc.format.is_depth() {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} uses depth format {:?}, use a renderbuffer",
                desc.label, desc.format
            )));
        }
        let id = self.allocate_id();
        log::trace!(
            "SoftwareBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let texels = vec![Vec4::ZERO; desc.width as usize * desc.height as usize];
        self.textures.insert(
            id,
            SoftTexture {
                desc: desc.clone(),
                texels,
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        let entry = self
            .textures
            .get_mut(&texture.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            })?;
        let expected = entry.texels.len() * 4;
        if data.len() != expected {
            return Err(BackendError::UploadSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        for (texel, rgba) in entry.texels.iter_mut().zip(data.chunks_exact(4)) {
            *texel = Vec4::new(
                rgba[0] as f32 / 255.0,
                rgba[1] as f32 / 255.0,
                rgba[2] as f32 / 255.0,
                rgba[3] as f32 / 255.0,
            );
        }
        log::trace!("SoftwareBackend: uploaded {} bytes to texture {}", data.len(), texture.0);
        Ok(())
    }

    fn create_renderbuffer(
        &mut self,
        desc: &RenderbufferDescriptor,
    ) -> BackendResult<RenderbufferHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::RenderbufferCreationFailed(format!(
                "{:?} has zero size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }
        let id = self.allocate_id();
        log::trace!(
            "SoftwareBackend: creating renderbuffer {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        self.renderbuffers.insert(
            id,
            SoftRenderbuffer {
                desc: desc.clone(),
                depth: vec![1.0; desc.width as usize * desc.height as usize],
            },
        );
        Ok(RenderbufferHandle(id))
    }

    fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle> {
        let id = self.allocate_id();
        log::trace!("SoftwareBackend: creating framebuffer {:?}", label);
        self.framebuffers.insert(
            id,
            SoftFramebuffer {
                label: label.map(str::to_owned),
                ..Default::default()
            },
        );
        Ok(FramebufferHandle(id))
    }

    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
    ) -> BackendResult<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::InvalidHandle {
                kind: "texture",
                id: texture.0,
            });
        }
        let entry = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        match attachment {
            Attachment::Color0 => entry.color = Some(texture),
            Attachment::Depth => {
                return Err(BackendError::FramebufferCreationFailed(format!(
                    "{:?}: depth attachments must be renderbuffers",
                    entry.label
                )))
            }
        }
        Ok(())
    }

    fn attach_renderbuffer(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        if !self.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        let entry = self
            .framebuffers
            .get_mut(&framebuffer.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "framebuffer",
                id: framebuffer.0,
            })?;
        match attachment {
            Attachment::Depth => entry.depth = Some(renderbuffer),
            Attachment::Color0 => {
                return Err(BackendError::FramebufferCreationFailed(format!(
                    "{:?}: color attachments must be textures",
                    entry.label
                )))
            }
        }
        Ok(())
    }

    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(entry) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Undefined;
        };
        let color = entry.color.and_then(|h| self.textures.get(&h.0));
        let depth = entry.depth.and_then(|h| self.renderbuffers.get(&h.0));
        match (color, depth) {
            (None, None) => FramebufferStatus::MissingAttachment,
            (Some(c), _) if c.desc.format.is_depth() => FramebufferStatus::IncompleteAttachment,
            (_, Some(d)) if !d.desc.format.is_depth() => FramebufferStatus::IncompleteAttachment,
            (Some(c), Some(d)) if c.desc.width != d.desc.width || c.desc.height != d.desc.height => {
                FramebufferStatus::IncompleteDimensions
            }
            _ => FramebufferStatus::Complete,
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()> {
        if let Some(handle) = framebuffer {
            if !self.framebuffers.contains_key(&handle.0) {
                return Err(BackendError::InvalidHandle {
                    kind: "framebuffer",
                    id: handle.0,
                });
            }
        }
        self.bound_framebuffer = framebuffer;
        Ok(())
    }

    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> BackendResult<()> {
        if let Some(handle) = texture {
            if !self.textures.contains_key(&handle.0) {
                return Err(BackendError::InvalidHandle {
                    kind: "texture",
                    id: handle.0,
                });
            }
        }
        self.bound_texture = texture;
        Ok(())
    }

    fn set_viewport(&mut self, rect: Rect) {
        self.viewport = rect;
    }

    fn set_scissor(&mut self, rect: Rect) {
        self.scissor = rect;
    }

    fn set_capability(&mut self, capability: Capability, enabled: bool) {
        match capability {
            Capability::DepthTest => self.depth_test = enabled,
            Capability::ScissorTest => self.scissor_test = enabled,
            Capability::Texture2D => self.texture_2d = enabled,
            Capability::Multisample => {
                log::trace!("SoftwareBackend: multisampling is not supported, ignoring");
            }
        }
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32) -> BackendResult<()> {
        let scissor = self.scissor_test.then_some(self.scissor);
        let target = self.target()?;
        let (width, height) = (target.width as i64, target.height as i64);

        let (x0, y0, x1, y1) = match scissor {
            Some(r) => (
                (r.x as i64).max(0),
                (r.y as i64).max(0),
                r.right().min(width),
                r.top().min(height),
            ),
            None => (0, 0, width, height),
        };
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }

        let fill = Vec4::from_array(color);
        let RasterTarget {
            color: mut color_buffer,
            depth: mut depth_buffer,
            ..
        } = target;
        for y in y0..y1 {
            let row = (y * width) as usize;
            let span = row + x0 as usize..row + x1 as usize;
            if flags.contains(ClearFlags::COLOR) {
                if let Some(buffer) = color_buffer.as_deref_mut() {
                    buffer[span.clone()].fill(fill);
                }
            }
            if flags.contains(ClearFlags::DEPTH) {
                if let Some(buffer) = depth_buffer.as_deref_mut() {
                    buffer[span].fill(depth);
                }
            }
        }
        Ok(())
    }

    fn draw(&mut self, topology: PrimitiveTopology, vertices: &[ClipVertex]) -> BackendResult<()> {
        // Move the sampled texels out for the draw so the target can be
        // borrowed mutably alongside them
        let sampled = self.sampled_texture();
        let texture = sampled
            .and_then(|id| self.textures.get_mut(&id))
            .map(|t| (t.desc.width, t.desc.height, std::mem::take(&mut t.texels)));
        let sampler = texture
            .as_ref()
            .map(|(width, height, texels)| Sampler::new(*width, *height, texels));

        let state = RasterState {
            viewport: self.viewport,
            scissor: self.scissor_test.then_some(self.scissor),
            depth_test: self.depth_test,
            sampler: sampler.as_ref(),
        };
        let result = self
            .target()
            .map(|mut target| raster::rasterize(&mut target, &state, topology, vertices));

        if let (Some(id), Some((_, _, texels))) = (sampled, texture) {
            if let Some(entry) = self.textures.get_mut(&id) {
                entry.texels = texels;
            }
        }
        result
    }

    fn read_pixels(&mut self, rect: Rect, format: PixelFormat) -> BackendResult<Vec<u8>> {
        let target = self.target()?;
        let out_of_bounds = rect.x < 0
            || rect.y < 0
            || rect.right() > target.width as i64
            || rect.top() > target.height as i64;
        if out_of_bounds {
            return Err(BackendError::ReadOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        }
        let width = target.width as usize;
        let Some(color) = target.color else {
            return Err(BackendError::NoColorAttachment);
        };

        let mut out =
            Vec::with_capacity(rect.width as usize * rect.height as usize * format.bytes_per_pixel());
        for y in rect.y as usize..rect.top() as usize {
            let row = &color[y * width + rect.x as usize..y * width + rect.right() as usize];
            for texel in row {
                format.encode(*texel, &mut out);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn offscreen(backend: &mut SoftwareBackend, width: u32, height: u32) -> FramebufferHandle {
        let fb = backend.create_framebuffer(Some("test")).unwrap();
        let color = backend
            .create_texture(&TextureDescriptor {
                width,
                height,
                format: TextureFormat::Rgba32Float,
                ..Default::default()
            })
            .unwrap();
        let depth = backend
            .create_renderbuffer(&RenderbufferDescriptor {
                label: None,
                width,
                height,
                format: TextureFormat::Depth32Float,
            })
            .unwrap();
        backend.attach_texture(fb, Attachment::Color0, color).unwrap();
        backend.attach_renderbuffer(fb, Attachment::Depth, depth).unwrap();
        fb
    }

    #[test]
    fn test_empty_framebuffer_is_incomplete() {
        let mut backend = SoftwareBackend::new(4, 4);
        let fb = backend.create_framebuffer(None).unwrap();
        assert_eq!(backend.framebuffer_status(fb), FramebufferStatus::MissingAttachment);
        assert_eq!(
            backend.framebuffer_status(FramebufferHandle(999)),
            FramebufferStatus::Undefined
        );
    }

    #[test]
    fn test_mismatched_attachments_are_incomplete() {
        let mut backend = SoftwareBackend::new(4, 4);
        let fb = backend.create_framebuffer(None).unwrap();
        let color = backend
            .create_texture(&TextureDescriptor {
                width: 4,
                height: 4,
                ..Default::default()
            })
            .unwrap();
        let depth = backend
            .create_renderbuffer(&RenderbufferDescriptor {
                label: None,
                width: 8,
                height: 4,
                format: TextureFormat::Depth32Float,
            })
            .unwrap();
        backend.attach_texture(fb, Attachment::Color0, color).unwrap();
        backend.attach_renderbuffer(fb, Attachment::Depth, depth).unwrap();
        assert_eq!(backend.framebuffer_status(fb), FramebufferStatus::IncompleteDimensions);

        backend.bind_framebuffer(Some(fb)).unwrap();
        assert!(matches!(
            backend.clear(ClearFlags::ALL, [0.0; 4], 1.0),
            Err(BackendError::IncompleteFramebuffer { .. })
        ));
    }

    #[test]
    fn test_scissored_clear_only_touches_rect() {
        let mut backend = SoftwareBackend::new(4, 2);
        let fb = offscreen(&mut backend, 4, 2);
        backend.bind_framebuffer(Some(fb)).unwrap();
        backend.clear(ClearFlags::ALL, [0.0, 0.0, 0.0, 1.0], 1.0).unwrap();

        backend.set_scissor(Rect::new(2, 0, 2, 2));
        backend.set_capability(Capability::ScissorTest, true);
        backend.clear(ClearFlags::COLOR, [1.0, 0.0, 0.0, 1.0], 1.0).unwrap();

        let pixels = backend.read_pixels(Rect::new(0, 0, 4, 1), PixelFormat::Rgb8).unwrap();
        assert_eq!(pixels, vec![0, 0, 0, 0, 0, 0, 255, 0, 0, 255, 0, 0]);
    }

    #[test]
    fn test_read_pixels_formats() {
        let mut backend = SoftwareBackend::new(1, 1);
        backend.clear(ClearFlags::COLOR, [1.0, 0.5, 0.0, 1.0], 1.0).unwrap();
        let rect = Rect::new(0, 0, 1, 1);
        assert_eq!(backend.read_pixels(rect, PixelFormat::Rgb8).unwrap(), vec![255, 128, 0]);
        assert_eq!(backend.read_pixels(rect, PixelFormat::Bgr8).unwrap(), vec![0, 128, 255]);
        assert_eq!(
            backend.read_pixels(rect, PixelFormat::Rgba8).unwrap(),
            vec![255, 128, 0, 255]
        );
        assert_eq!(backend.read_pixels(rect, PixelFormat::Rgba32Float).unwrap().len(), 16);
    }

    #[test]
    fn test_read_out_of_bounds() {
        let mut backend = SoftwareBackend::new(2, 2);
        assert!(matches!(
            backend.read_pixels(Rect::new(1, 1, 2, 2), PixelFormat::Rgb8),
            Err(BackendError::ReadOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_textured_draw_modulates_color() {
        let mut backend = SoftwareBackend::new(2, 2);
        let texture = backend
            .create_texture(&TextureDescriptor {
                width: 1,
                height: 1,
                ..Default::default()
            })
            .unwrap();
        backend.write_texture(texture, &[0, 255, 0, 255]).unwrap();
        assert!(matches!(
            backend.write_texture(texture, &[0, 0]),
            Err(BackendError::UploadSizeMismatch { expected: 4, actual: 2 })
        ));

        backend.bind_texture(Some(texture)).unwrap();
        backend.set_capability(Capability::Texture2D, true);
        let white = Vec4::ONE;
        let quad: Vec<ClipVertex> = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .iter()
            .map(|&(x, y)| ClipVertex::new(Vec4::new(x, y, 0.0, 1.0), white, Vec2::ZERO))
            .collect();
        backend.draw(PrimitiveTopology::QuadList, &quad).unwrap();
        let pixels = backend.read_pixels(Rect::new(0, 0, 1, 1), PixelFormat::Rgb8).unwrap();
        assert_eq!(pixels, vec![0, 255, 0]);

        // The texture is still intact for the next draw
        backend.clear(ClearFlags::COLOR, [0.0, 0.0, 0.0, 1.0], 1.0).unwrap();
        backend.draw(PrimitiveTopology::QuadList, &quad).unwrap();
        let pixels = backend.read_pixels(Rect::new(1, 1, 1, 1), PixelFormat::Rgb8).unwrap();
        assert_eq!(pixels, vec![0, 255, 0]);
    }

    #[test]
    fn test_draw_target_is_not_sampled() {
        let mut backend = SoftwareBackend::new(2, 2);
        let fb = offscreen(&mut backend, 2, 2);
        backend.bind_framebuffer(Some(fb)).unwrap();
        backend.clear(ClearFlags::ALL, [1.0, 0.0, 0.0, 1.0], 1.0).unwrap();

        // The color attachment created by `offscreen` is the first texture
        let color = TextureHandle(fb.0 + 1);
        backend.bind_texture(Some(color)).unwrap();
        backend.set_capability(Capability::Texture2D, true);
        let blue = Vec4::new(0.0, 0.0, 1.0, 1.0);
        let quad: Vec<ClipVertex> = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .iter()
            .map(|&(x, y)| ClipVertex::new(Vec4::new(x, y, 0.0, 1.0), blue, Vec2::ZERO))
            .collect();
        backend.draw(PrimitiveTopology::QuadList, &quad).unwrap();
        let pixels = backend.read_pixels(Rect::new(0, 0, 1, 1), PixelFormat::Rgb8).unwrap();
        assert_eq!(pixels, vec![0, 0, 255]);
    }
}
