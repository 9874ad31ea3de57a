//! Resource management
//!
//! Vertex lists and textures the scene draws through the render context.

mod mesh;
mod texture;

pub use mesh::*;
pub use texture::*;
