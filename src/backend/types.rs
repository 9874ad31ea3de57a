//! Common types shared between backends

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba32Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Filter mode for texture sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            mag_filter: FilterMode::Linear,
            min_filter: FilterMode::Linear,
        }
    }
}

/// Renderbuffer descriptor (depth storage that is never sampled)
#[derive(Debug, Clone)]
pub struct RenderbufferDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Framebuffer attachment point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attachment {
    Color0,
    Depth,
}

/// Result of a framebuffer completeness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    /// No attachment at all
    MissingAttachment,
    /// An attachment has a format that cannot be used at its attachment point
    IncompleteAttachment,
    /// Attachments disagree on width/height
    IncompleteDimensions,
    /// The handle does not name a framebuffer
    Undefined,
}

/// Primitive topology for immediate draws
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    LineLoop,
    TriangleList,
    QuadList,
}

/// Integer rectangle in window coordinates, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn top(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x as i64 && x < self.right() && y >= self.y as i64 && y < self.top()
    }
}

/// Buffers affected by a clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearFlags(u32);

impl ClearFlags {
    pub const COLOR: Self = Self(1 << 0);
    pub const DEPTH: Self = Self(1 << 1);
    pub const ALL: Self = Self((1 << 0) | (1 << 1));

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ClearFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Toggleable fixed-function state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    DepthTest,
    ScissorTest,
    Texture2D,
    Multisample,
}

/// Channel layout for pixel readback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Bgr8,
    Rgba8,
    /// Raw RGBA floats, native endian
    Rgba32Float,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Rgba32Float => 16,
        }
    }

    /// Append one texel in this layout, clamping for the 8-bit formats
    pub fn encode(&self, texel: Vec4, out: &mut Vec<u8>) {
        let unorm = (texel.clamp(Vec4::ZERO, Vec4::ONE) * 255.0).round();
        let [r, g, b, a] = [unorm.x as u8, unorm.y as u8, unorm.z as u8, unorm.w as u8];
        match self {
            PixelFormat::Rgb8 => out.extend_from_slice(&[r, g, b]),
            PixelFormat::Bgr8 => out.extend_from_slice(&[b, g, r]),
            PixelFormat::Rgba8 => out.extend_from_slice(&[r, g, b, a]),
            PixelFormat::Rgba32Float => out.extend_from_slice(bytemuck::bytes_of(&texel)),
        }
    }
}

/// Vertex after the model-view-projection transform, as handed to a backend
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ClipVertex {
    pub position: Vec4,
    pub color: Vec4,
    pub uv: Vec2,
    pub _padding: Vec2,
}

impl ClipVertex {
    pub fn new(position: Vec4, color: Vec4, uv: Vec2) -> Self {
        Self {
            position,
            color,
            uv,
            _padding: Vec2::ZERO,
        }
    }

    /// Linear interpolation of every attribute (used by clipping)
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self::new(
            self.position.lerp(other.position, t),
            self.color.lerp(other.color, t),
            self.uv.lerp(other.uv, t),
        )
    }
}
