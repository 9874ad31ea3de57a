//! Graphics backend abstraction
//!
//! The recorder never talks to a device directly. Everything goes through
//! [`GraphicsBackend`], wrapped by [`RenderContext`](crate::context::RenderContext)
//! which adds the matrix stacks and bookkeeping of an immediate-mode context.

mod traits;
mod types;

#[cfg(feature = "software")]
pub mod software;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use traits::*;
pub use types::*;
