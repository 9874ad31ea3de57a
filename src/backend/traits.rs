//! Core backend abstraction traits
//!
//! The trait mirrors the fixed-function subset of an immediate-mode graphics
//! context that the recorder relies on. Matrix state lives in
//! [`RenderContext`](crate::context::RenderContext); backends only ever see
//! clip-space vertices.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create renderbuffer: {0}")]
    RenderbufferCreationFailed(String),
    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreationFailed(String),
    #[error("Unknown {kind} handle {id}")]
    InvalidHandle { kind: &'static str, id: u64 },
    #[error("Texture upload of {actual} bytes does not match the expected {expected}")]
    UploadSizeMismatch { expected: usize, actual: usize },
    #[error("Readback of {width}x{height} at ({x}, {y}) exceeds the bound target")]
    ReadOutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    #[error("Bound framebuffer has no color attachment")]
    NoColorAttachment,
    #[error("Framebuffer {id} is not complete: {status:?}")]
    IncompleteFramebuffer { id: u64, status: FramebufferStatus },
    #[error("Context lost")]
    ContextLost,
    #[error("No usable graphics device: {0}")]
    DeviceUnavailable(String),
    #[error("Pixel readback failed: {0}")]
    ReadbackFailed(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a color texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a depth renderbuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderbufferHandle(pub(crate) u64);

/// Handle to a framebuffer (render target container)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferHandle(pub(crate) u64);

/// Main graphics backend trait
pub trait GraphicsBackend {
    /// Human readable backend name
    fn name(&self) -> &'static str;

    /// Make this backend's context current on the calling thread
    fn make_current(&mut self) -> BackendResult<()>;

    /// Size of the default (window) surface
    fn surface_size(&self) -> (u32, u32);

    // Resource creation

    /// Create a color texture
    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Upload tightly packed RGBA8 texels to a texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()>;

    /// Create a depth renderbuffer
    fn create_renderbuffer(
        &mut self,
        desc: &RenderbufferDescriptor,
    ) -> BackendResult<RenderbufferHandle>;

    /// Create an empty framebuffer
    fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle>;

    /// Attach a texture to a framebuffer
    fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
    ) -> BackendResult<()>;

    /// Attach a renderbuffer to a framebuffer
    fn attach_renderbuffer(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()>;

    /// Check whether a framebuffer can be rendered to
    fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus;

    // State

    /// Bind a framebuffer as the render destination, `None` for the default surface
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()>;

    /// Bind the texture sampled while `Capability::Texture2D` is enabled
    fn bind_texture(&mut self, texture: Option<TextureHandle>) -> BackendResult<()>;

    /// Set viewport
    fn set_viewport(&mut self, rect: Rect);

    /// Set scissor rect
    fn set_scissor(&mut self, rect: Rect);

    /// Enable or disable a capability
    fn set_capability(&mut self, capability: Capability, enabled: bool);

    // Commands

    /// Clear the selected buffers of the bound target, restricted to the
    /// scissor rect while scissor testing is enabled
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4], depth: f32) -> BackendResult<()>;

    /// Draw primitives given in clip space
    fn draw(&mut self, topology: PrimitiveTopology, vertices: &[ClipVertex]) -> BackendResult<()>;

    /// Read pixels from the bound target; rows are returned bottom-up
    fn read_pixels(&mut self, rect: Rect, format: PixelFormat) -> BackendResult<Vec<u8>>;
}
