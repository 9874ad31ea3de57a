//! wgpu GPU backend.
//!
//! Renders headless into wgpu textures on whatever adapter wgpu picks
//! (Vulkan, Metal, DX12 or GL). The [`GraphicsBackend`] boundary keeps GL
//! conventions: rects and readback rows count from the bottom, clip depth
//! spans `[-w, w]`. Every clear or draw records its own render pass into a
//! pending encoder, which is submitted before uploads and readbacks.

mod pipeline;

use std::collections::HashMap;
use std::sync::mpsc;

use glam::Vec4;
use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;

use pipeline::{DepthMode, PipelineCache, PipelineKey};

/// Texture or renderbuffer living on the device
struct GpuImage {
    format: TextureFormat,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: Option<wgpu::Sampler>,
}

impl GpuImage {
    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }
}

#[derive(Default)]
struct GpuFramebuffer {
    label: Option<String>,
    color: Option<TextureHandle>,
    depth: Option<RenderbufferHandle>,
}

#[derive(Default)]
struct Resources {
    textures: HashMap<u64, GpuImage>,
    renderbuffers: HashMap<u64, GpuImage>,
    framebuffers: HashMap<u64, GpuFramebuffer>,
}

/// Attachments of the bound framebuffer
struct BoundTarget<'a> {
    width: u32,
    height: u32,
    color: Option<&'a GpuImage>,
    depth: Option<&'a GpuImage>,
}

impl Resources {
    fn texture(&self, handle: TextureHandle) -> BackendResult<&GpuImage> {
        self.textures
            .get(&handle.0)
            .ok_or(BackendError::InvalidHandle {
                kind: "texture",
                id: handle.0,
            })
    }

    fn status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        let Some(entry) = self.framebuffers.get(&framebuffer.0) else {
            return FramebufferStatus::Undefined;
        };
        let color = entry.color.and_then(|h| self.textures.get(&h.0));
        let depth = entry.depth.and_then(|h| self.renderbuffers.get(&h.0));
        match (color, depth) {
            (None, None) => FramebufferStatus::MissingAttachment,
            (Some(c), _) if c.format.is_depth() => FramebufferStatus::IncompleteAttachment,
            (_, Some(d)) if !d.format.is_depth() => FramebufferStatus::IncompleteAttachment,
            (Some(c), Some(d)) if c.size() != d.size() => FramebufferStatus::IncompleteDimensions,
            _ => FramebufferStatus::Complete,
        }
    }

    fn target<'a>(
        &'a self,
        bound: Option<FramebufferHandle>,
        surface: &'a Surface,
    ) -> BackendResult<BoundTarget<'a>> {
        let Some(handle) = bound else {
            let (width, height) = surface.color.size();
            return Ok(BoundTarget {
                width,
                height,
                color: Some(&surface.color),
                depth: Some(&surface.depth),
            });
        };

        let status = self.status(handle);
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
        let color = framebuffer.color.and_then(|h| self.textures.get(&h.0));
        let depth = framebuffer.depth.and_then(|h| self.renderbuffers.get(&h.0));
        let (width, height) = color.or(depth).map(GpuImage::size).unwrap_or_default();
        Ok(BoundTarget {
            width,
            height,
            color,
            depth,
        })
    }
}

/// Stand-in for the window surface of a windowed context
struct Surface {
    color: GpuImage,
    depth: GpuImage,
}

/// Commands recorded since the last submit, with the per-draw resources
/// they reference
#[derive(Default)]
struct Pending {
    encoder: Option<wgpu::CommandEncoder>,
    buffers: Vec<wgpu::Buffer>,
    bind_groups: Vec<wgpu::BindGroup>,
}

/// Pixel rect in GL window coordinates, half open
#[derive(Debug, Clone, Copy)]
struct PixelBounds {
    x0: i64,
    y0: i64,
    x1: i64,
    y1: i64,
}

impl PixelBounds {
    fn new(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width as i64,
            y1: height as i64,
        }
    }

    fn intersect(mut self, rect: &Rect) -> Self {
        self.x0 = self.x0.max(rect.x as i64);
        self.y0 = self.y0.max(rect.y as i64);
        self.x1 = self.x1.min(rect.right());
        self.y1 = self.y1.min(rect.top());
        self
    }

    fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    /// wgpu scissor `(x, y, width, height)` with y counted from the top
    fn scissor(&self, target_height: u32) -> (u32, u32, u32, u32) {
        (
            self.x0 as u32,
            (target_height as i64 - self.y1) as u32,
            (self.x1 - self.x0) as u32,
            (self.y1 - self.y0) as u32,
        )
    }
}

enum Command<'v> {
    Clear {
        flags: ClearFlags,
        color: [f32; 4],
        depth: f32,
    },
    Draw {
        topology: PrimitiveTopology,
        vertices: &'v [ClipVertex],
    },
}

/// wgpu-based backend.
pub struct WgpuBackend {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: PipelineCache,
    pending: Pending,

    surface: Surface,
    resources: Resources,
    next_id: u64,

    bound_framebuffer: Option<FramebufferHandle>,
    bound_texture: Option<TextureHandle>,
    viewport: Rect,
    scissor: Rect,
    depth_test: bool,
    scissor_test: bool,
    texture_2d: bool,
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .field("surface", &self.surface.color.size())
            .finish()
    }
}

impl WgpuBackend {
    /// Open the default adapter and create a headless surface of the given
    /// size. Fails when no adapter or device is available.
    pub fn new(width: u32, height: u32) -> BackendResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or_else(|| BackendError::DeviceUnavailable("no compatible GPU adapter".to_string()))?;

        log::info!("wgpu adapter: {:?}", adapter.get_info());

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("mosaic-recorder device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| BackendError::DeviceUnavailable(format!("device creation failed: {e}")))?;

        check_size(&device, "surface", width, height)?;
        let surface = Surface {
            color: create_image(
                &device,
                Some("surface color"),
                width,
                height,
                TextureFormat::Rgba8Unorm,
                None,
            ),
            depth: create_image(
                &device,
                Some("surface depth"),
                width,
                height,
                TextureFormat::Depth32Float,
                None,
            ),
        };
        let pipelines = PipelineCache::new(&device);

        Ok(Self {
            adapter,
            device,
            queue,
            pipelines,
            pending: Pending::default(),
            surface,
            resources: Resources::default(),
            next_id: 1,
            bound_framebuffer: None,
            bound_texture: None,
            viewport: Rect::new(0, 0, width, height),
            scissor: Rect::new(0, 0, width, height),
            depth_test: false,
            scissor_test: false,
            texture_2d: false,
        })
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Number of distinct pipelines built so far
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Submit everything recorded so far
    fn flush(&mut self) {
        if let Some(encoder) = self.pending.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
            self.pending.buffers.clear();
            self.pending.bind_groups.clear();
        }
    }

    fn record(&mut self, command: Command) -> BackendResult<()> {
        let target = self.resources.target(self.bound_framebuffer, &self.surface)?;
        let (width, height) = (target.width, target.height);

        let mut bounds = PixelBounds::new(width, height);
        if self.scissor_test {
            bounds = bounds.intersect(&self.scissor);
        }

        let (key, vertices, texture) = match command {
            Command::Clear {
                flags,
                color,
                depth,
            } => {
                let write_color = flags.contains(ClearFlags::COLOR) && target.color.is_some();
                let write_depth = flags.contains(ClearFlags::DEPTH) && target.depth.is_some();
                if !write_color && !write_depth {
                    return Ok(());
                }
                let key = PipelineKey {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    color_format: target.color.map(|c| to_wgpu_format(c.format)),
                    has_depth: target.depth.is_some(),
                    depth: if write_depth {
                        DepthMode::Overwrite
                    } else {
                        DepthMode::Ignore
                    },
                    write_color,
                    textured: false,
                };
                (key, clear_quad(color, depth.clamp(0.0, 1.0)), None)
            }
            Command::Draw { topology, vertices } => {
                bounds = bounds.intersect(&self.viewport);
                let (topology, vertices) = expand_topology(topology, vertices);
                let vertices: Vec<ClipVertex> = vertices
                    .iter()
                    .map(|v| to_target_clip(v, &self.viewport, width, height))
                    .collect();
                let texture = sampled_texture(
                    &self.resources,
                    self.bound_texture.filter(|_| self.texture_2d),
                    &target,
                )?;
                let key = PipelineKey {
                    topology,
                    color_format: target.color.map(|c| to_wgpu_format(c.format)),
                    has_depth: target.depth.is_some(),
                    depth: if self.depth_test {
                        DepthMode::Less
                    } else {
                        DepthMode::Ignore
                    },
                    write_color: true,
                    textured: texture.is_some(),
                };
                (key, vertices, texture)
            }
        };
        if bounds.is_empty() || vertices.is_empty() {
            return Ok(());
        }

        let bind_group = texture.map(|(view, sampler)| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mosaic-texture-bind-group"),
                layout: self.pipelines.texture_layout(),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(sampler),
                    },
                ],
            })
        });
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mosaic-immediate-vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let pipeline = self.pipelines.get(&self.device, key);

        let device = &self.device;
        let encoder = self.pending.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mosaic-immediate-encoder"),
            })
        });
        {
            let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = target
                .color
                .map(|image| wgpu::RenderPassColorAttachment {
                    view: &image.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })
                .into_iter()
                .map(Some)
                .collect();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mosaic-immediate-pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: target.depth.map(|image| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view: &image.view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let (x, y, w, h) = bounds.scissor(height);
            pass.set_scissor_rect(x, y, w, h);
            pass.set_pipeline(pipeline);
            if let Some(bind_group) = &bind_group {
                pass.set_bind_group(0, bind_group, &[]);
            }
            pass.set_vertex_buffer(0, buffer.slice(..));
            pass.draw(0..vertices.len() as u32, 0..1);
        }

        self.pending.buffers.push(buffer);
        self.pending.bind_groups.extend(bind_group);
        Ok(())
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn make_current(&mut self) -> BackendResult<()> {
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface.color.size()
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.format.is_depth() {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} uses depth format {:?}, use a renderbuffer",
                desc.label, desc.format
            )));
        }
        check_size(&self.device, "texture", desc.width, desc.height)
            .map_err(|e| BackendError::TextureCreationFailed(format!("{:?}: {}", desc.label, e)))?;

        let id = self.allocate_id();
        log::trace!(
            "WgpuBackend: creating texture {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: desc.label.as_deref(),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: to_wgpu_filter(desc.mag_filter),
            min_filter: to_wgpu_filter(desc.min_filter),
            ..Default::default()
        });
        let image = create_image(
            &self.device,
            desc.label.as_deref(),
            desc.width,
            desc.height,
            desc.format,
            Some(sampler),
        );
        self.resources.textures.insert(id, image);
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        // Uploads go through the queue timeline, ahead of unsubmitted draws
        self.flush();
        let image = self.resources.texture(texture)?;
        let (width, height) = image.size();
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(BackendError::UploadSizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let floats: Vec<f32>;
        let bytes = match image.format {
            TextureFormat::Rgba32Float => {
                floats = data.iter().map(|&b| b as f32 / 255.0).collect();
                bytemuck::cast_slice(&floats)
            }
            _ => data,
        };
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &image.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * image.format.bytes_per_pixel()),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        log::trace!("WgpuBackend: uploaded {} bytes to texture {}", data.len(), texture.0);
        Ok(())
    }

    fn create_renderbuffer(
        &mut self,
        desc: &RenderbufferDescriptor,
    ) -> BackendResult<RenderbufferHandle> {
        check_size(&self.device, "renderbuffer", desc.width, desc.height).map_err(|e| {
            BackendError::RenderbufferCreationFailed(format!("{:?}: {}", desc.label, e))
        })?;
        if !desc.format.is_depth() {
            return Err(BackendError::RenderbufferCreationFailed(format!(
                "{:?} uses color format {:?}, use a texture",
                desc.label, desc.format
            )));
        }

        let id = self.allocate_id();
        log::trace!(
            "WgpuBackend: creating renderbuffer {:?} ({}x{}, {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let image = create_image(
            &self.device,
            desc.label.as_deref(),
            desc.width,
            desc.height,
            desc.format,
            None,
        );
        self.resources.renderbuffers.insert(id, image);
        Ok(RenderbufferHandle(id))
    }

    fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle> {
        let id = self.allocate_id();
        log::trace!("WgpuBackend: creating framebuffer {:?}", label);
        self.resources.framebuffers.insert(
            id,
            GpuFramebuffer {
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
        self.resources.texture(texture)?;
        let entry = self
            .resources
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
        if !self.resources.renderbuffers.contains_key(&renderbuffer.0) {
            return Err(BackendError::InvalidHandle {
                kind: "renderbuffer",
                id: renderbuffer.0,
            });
        }
        let entry = self
            .resources
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
        self.resources.status(framebuffer)
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()> {
        if let Some(handle) = framebuffer {
            if !self.resources.framebuffers.contains_key(&handle.0) {
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
            self.resources.texture(handle)?;
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
                log::trace!("WgpuBackend: targets are single-sampled, ignoring multisample");
            }
        }
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32) -> BackendResult<()> {
        self.record(Command::Clear {
            flags,
            color,
            depth,
        })
    }

    fn draw(&mut self, topology: PrimitiveTopology, vertices: &[ClipVertex]) -> BackendResult<()> {
        self.record(Command::Draw { topology, vertices })
    }

    fn read_pixels(&mut self, rect: Rect, format: PixelFormat) -> BackendResult<Vec<u8>> {
        self.flush();
        let target = self.resources.target(self.bound_framebuffer, &self.surface)?;
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
        let color = target.color.ok_or(BackendError::NoColorAttachment)?;
        if rect.width == 0 || rect.height == 0 {
            return Ok(Vec::new());
        }

        let texel_size = color.format.bytes_per_pixel();
        let unpadded_bytes_per_row = rect.width * texel_size;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mosaic-readback-buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(rect.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mosaic-readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &color.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x as u32,
                    y: (target.height as i64 - rect.top()) as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| BackendError::ReadbackFailed("map callback dropped".to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mapped = slice.get_mapped_range();
        let mut out = Vec::with_capacity(
            rect.width as usize * rect.height as usize * format.bytes_per_pixel(),
        );
        // Texture rows run top-down, the caller wants them bottom-up
        for row in mapped
            .chunks_exact(padded_bytes_per_row as usize)
            .rev()
        {
            for texel in row[..unpadded_bytes_per_row as usize].chunks_exact(texel_size as usize) {
                format.encode(decode_texel(texel, color.format), &mut out);
            }
        }
        drop(mapped);
        readback.unmap();
        Ok(out)
    }
}

/// View and sampler for the next draw. Only filterable textures are
/// sampled, and never the color attachment being drawn into.
fn sampled_texture<'a>(
    resources: &'a Resources,
    bound: Option<TextureHandle>,
    target: &BoundTarget,
) -> BackendResult<Option<(&'a wgpu::TextureView, &'a wgpu::Sampler)>> {
    let Some(handle) = bound else {
        return Ok(None);
    };
    let image = resources.texture(handle)?;
    if target.color.is_some_and(|color| std::ptr::eq(color, image)) {
        log::trace!("WgpuBackend: texture {} is the draw target, not sampling", handle.0);
        return Ok(None);
    }
    if image.format != TextureFormat::Rgba8Unorm {
        log::trace!(
            "WgpuBackend: texture {} ({:?}) is not filterable, not sampling",
            handle.0,
            image.format
        );
        return Ok(None);
    }
    Ok(image.sampler.as_ref().map(|sampler| (&image.view, sampler)))
}

fn check_size(device: &wgpu::Device, what: &str, width: u32, height: u32) -> BackendResult<()> {
    let max = device.limits().max_texture_dimension_2d;
    if width == 0 || height == 0 || width > max || height > max {
        return Err(BackendError::TextureCreationFailed(format!(
            "{} size {}x{} is outside 1..={}",
            what, width, height, max
        )));
    }
    Ok(())
}

fn create_image(
    device: &wgpu::Device,
    label: Option<&str>,
    width: u32,
    height: u32,
    format: TextureFormat,
    sampler: Option<wgpu::Sampler>,
) -> GpuImage {
    let usage = if format.is_depth() {
        wgpu::TextureUsages::RENDER_ATTACHMENT
    } else {
        wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_DST
            | wgpu::TextureUsages::COPY_SRC
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label,
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: to_wgpu_format(format),
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuImage {
        format,
        texture,
        view,
        sampler,
    }
}

fn to_wgpu_format(format: TextureFormat) -> wgpu::TextureFormat {
    match format {
        TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
    }
}

fn to_wgpu_filter(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn decode_texel(bytes: &[u8], format: TextureFormat) -> Vec4 {
    match format {
        TextureFormat::Rgba32Float => {
            Vec4::from_array(bytemuck::pod_read_unaligned::<[f32; 4]>(bytes))
        }
        _ => Vec4::new(
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
            bytes[3] as f32 / 255.0,
        ),
    }
}

/// Move a GL clip-space vertex into the clip space of the whole target.
///
/// The pass viewport always covers the target, so the GL viewport becomes
/// part of the vertex transform and may extend past the target. Depth is
/// remapped from `[-w, w]` to `[0, w]`.
fn to_target_clip(vertex: &ClipVertex, viewport: &Rect, width: u32, height: u32) -> ClipVertex {
    let p = vertex.position;
    let (w, h) = (width as f32, height as f32);
    let scale_x = viewport.width as f32 / w;
    let scale_y = viewport.height as f32 / h;
    let offset_x = (2.0 * viewport.x as f32 + viewport.width as f32) / w - 1.0;
    let offset_y = (2.0 * viewport.y as f32 + viewport.height as f32) / h - 1.0;
    ClipVertex {
        position: Vec4::new(
            p.x * scale_x + p.w * offset_x,
            p.y * scale_y + p.w * offset_y,
            (p.z + p.w) * 0.5,
            p.w,
        ),
        ..*vertex
    }
}

/// Two triangles covering the whole target at window depth `depth`
fn clear_quad(color: [f32; 4], depth: f32) -> Vec<ClipVertex> {
    let color = Vec4::from_array(color);
    [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
        .iter()
        .map(|&(x, y)| ClipVertex::new(Vec4::new(x, y, depth, 1.0), color, glam::Vec2::ZERO))
        .collect()
}

/// Rewrite topologies wgpu has no equivalent for
fn expand_topology(
    topology: PrimitiveTopology,
    vertices: &[ClipVertex],
) -> (wgpu::PrimitiveTopology, std::borrow::Cow<'_, [ClipVertex]>) {
    use std::borrow::Cow;
    match topology {
        PrimitiveTopology::PointList => (wgpu::PrimitiveTopology::PointList, Cow::Borrowed(vertices)),
        PrimitiveTopology::LineList => {
            let whole = vertices.len() - vertices.len() % 2;
            (wgpu::PrimitiveTopology::LineList, Cow::Borrowed(&vertices[..whole]))
        }
        PrimitiveTopology::LineStrip if vertices.len() >= 2 => {
            (wgpu::PrimitiveTopology::LineStrip, Cow::Borrowed(vertices))
        }
        PrimitiveTopology::LineStrip => (wgpu::PrimitiveTopology::LineStrip, Cow::Borrowed(&[])),
        PrimitiveTopology::LineLoop => {
            let lines = if vertices.len() >= 2 {
                (0..vertices.len())
                    .flat_map(|i| [vertices[i], vertices[(i + 1) % vertices.len()]])
                    .collect()
            } else {
                Vec::new()
            };
            (wgpu::PrimitiveTopology::LineList, Cow::Owned(lines))
        }
        PrimitiveTopology::TriangleList => {
            let whole = vertices.len() - vertices.len() % 3;
            (wgpu::PrimitiveTopology::TriangleList, Cow::Borrowed(&vertices[..whole]))
        }
        PrimitiveTopology::QuadList => {
            let triangles = vertices
                .chunks_exact(4)
                .flat_map(|q| [q[0], q[1], q[2], q[0], q[2], q[3]])
                .collect();
            (wgpu::PrimitiveTopology::TriangleList, Cow::Owned(triangles))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn vertex(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
        ClipVertex::new(Vec4::new(x, y, z, w), Vec4::ONE, Vec2::ZERO)
    }

    #[test]
    fn test_full_viewport_keeps_xy_and_remaps_depth() {
        let full = Rect::new(0, 0, 64, 32);
        let v = to_target_clip(&vertex(0.5, -0.25, -1.0, 1.0), &full, 64, 32);
        assert_eq!(v.position, Vec4::new(0.5, -0.25, 0.0, 1.0));
        let v = to_target_clip(&vertex(0.0, 0.0, 2.0, 2.0), &full, 64, 32);
        assert_eq!(v.position.z, 2.0);
    }

    #[test]
    fn test_sub_viewport_maps_into_its_rect() {
        // Right half of a 64x32 target
        let viewport = Rect::new(32, 0, 32, 32);
        let left = to_target_clip(&vertex(-1.0, -1.0, 0.0, 1.0), &viewport, 64, 32);
        let right = to_target_clip(&vertex(1.0, 1.0, 0.0, 1.0), &viewport, 64, 32);
        assert_eq!(left.position.truncate().truncate(), Vec2::new(0.0, -1.0));
        assert_eq!(right.position.truncate().truncate(), Vec2::new(1.0, 1.0));

        // Scaling by w leaves the projected position unchanged
        let far = to_target_clip(&vertex(-2.0, -2.0, 0.0, 2.0), &viewport, 64, 32);
        assert_eq!(far.position.x / far.position.w, 0.0);
    }

    #[test]
    fn test_expand_quads_and_loops() {
        let quad: Vec<ClipVertex> = (0..4).map(|i| vertex(i as f32, 0.0, 0.0, 1.0)).collect();
        let (topology, triangles) = expand_topology(PrimitiveTopology::QuadList, &quad);
        assert_eq!(topology, wgpu::PrimitiveTopology::TriangleList);
        let xs: Vec<f32> = triangles.iter().map(|v| v.position.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 0.0, 2.0, 3.0]);

        let (topology, lines) = expand_topology(PrimitiveTopology::LineLoop, &quad[..3]);
        assert_eq!(topology, wgpu::PrimitiveTopology::LineList);
        let xs: Vec<f32> = lines.iter().map(|v| v.position.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 1.0, 2.0, 2.0, 0.0]);

        let (_, partial) = expand_topology(PrimitiveTopology::TriangleList, &quad);
        assert_eq!(partial.len(), 3);
    }

    #[test]
    fn test_scissor_counts_from_top() {
        let bounds = PixelBounds::new(64, 32).intersect(&Rect::new(8, 4, 16, 8));
        assert_eq!(bounds.scissor(32), (8, 20, 16, 8));
    }

    #[test]
    fn test_padded_rows() {
        assert_eq!(align_to(4 * 3, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 256);
        assert_eq!(align_to(16 * 64, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 1024);
        assert_eq!(align_to(0, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT), 0);
    }

    #[test]
    fn test_decode_texel_formats() {
        let unorm = decode_texel(&[255, 0, 0, 255], TextureFormat::Rgba8Unorm);
        assert_eq!(unorm, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let float = decode_texel(
            bytemuck::bytes_of(&[0.25f32, 0.5, 0.75, 1.0]),
            TextureFormat::Rgba32Float,
        );
        assert_eq!(float, Vec4::new(0.25, 0.5, 0.75, 1.0));
    }
}
