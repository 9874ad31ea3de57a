//! Immediate-mode render context.
//!
//! [`RenderContext`] is threaded through every draw call. It owns the
//! backend and tracks the state an immediate-mode API keeps implicitly:
//! the projection and model-view matrix stacks, the current color, the
//! bound framebuffer, viewport, scissor and enabled capabilities. Vertices
//! submitted through the context are transformed by projection × model-view
//! and handed to the backend in clip space.

use std::collections::HashSet;

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::backend::*;

/// Which matrix stack the matrix operations affect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixMode {
    Projection,
    ModelView,
}

/// Explicit graphics state handle
pub struct RenderContext {
    backend: Box<dyn GraphicsBackend>,
    matrix_mode: MatrixMode,
    projection: Vec<Mat4>,
    modelview: Vec<Mat4>,
    color: Vec4,
    clear_color: [f32; 4],
    clear_depth: f32,
    viewport: Rect,
    scissor: Rect,
    bound_framebuffer: Option<FramebufferHandle>,
    bound_texture: Option<TextureHandle>,
    capabilities: HashSet<Capability>,
}

impl RenderContext {
    /// Wrap a backend. Viewport and scissor start at the surface size.
    pub fn new(backend: impl GraphicsBackend + 'static) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(mut backend: Box<dyn GraphicsBackend>) -> Self {
        let (width, height) = backend.surface_size();
        let full = Rect::new(0, 0, width, height);
        backend.set_viewport(full);
        backend.set_scissor(full);
        log::debug!(
            "RenderContext: using {} backend ({}x{} surface)",
            backend.name(),
            width,
            height
        );
        Self {
            backend,
            matrix_mode: MatrixMode::ModelView,
            projection: vec![Mat4::IDENTITY],
            modelview: vec![Mat4::IDENTITY],
            color: Vec4::ONE,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            clear_depth: 1.0,
            viewport: full,
            scissor: full,
            bound_framebuffer: None,
            bound_texture: None,
            capabilities: HashSet::new(),
        }
    }

    /// Name of the underlying backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Make the underlying context current on this thread
    pub fn make_current(&mut self) -> BackendResult<()> {
        self.backend.make_current()
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.backend.surface_size()
    }

    // Matrix state

    pub fn matrix_mode(&mut self, mode: MatrixMode) {
        self.matrix_mode = mode;
    }

    pub fn current_matrix_mode(&self) -> MatrixMode {
        self.matrix_mode
    }

    fn stack_mut(&mut self) -> &mut Vec<Mat4> {
        match self.matrix_mode {
            MatrixMode::Projection => &mut self.projection,
            MatrixMode::ModelView => &mut self.modelview,
        }
    }

    fn top_mut(&mut self) -> &mut Mat4 {
        let stack = self.stack_mut();
        let last = stack.len() - 1;
        &mut stack[last]
    }

    /// Replace the top of the current stack with the identity
    pub fn load_identity(&mut self) {
        *self.top_mut() = Mat4::IDENTITY;
    }

    /// Replace the top of the current stack
    pub fn load_matrix(&mut self, matrix: Mat4) {
        *self.top_mut() = matrix;
    }

    /// Post-multiply the top of the current stack
    pub fn mult_matrix(&mut self, matrix: Mat4) {
        let top = self.top_mut();
        *top *= matrix;
    }

    pub fn push_matrix(&mut self) {
        let stack = self.stack_mut();
        let top = stack[stack.len() - 1];
        stack.push(top);
    }

    /// Pop the current stack. Popping the last entry is ignored.
    pub fn pop_matrix(&mut self) {
        let mode = self.matrix_mode;
        let stack = self.stack_mut();
        if stack.len() > 1 {
            stack.pop();
        } else {
            log::warn!("RenderContext: {:?} matrix stack underflow, pop ignored", mode);
        }
    }

    /// Run `f` between a push and a pop of the current stack. The matrix
    /// mode active on entry is restored before popping.
    pub fn with_pushed_matrix<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let mode = self.matrix_mode;
        self.push_matrix();
        let result = f(self);
        self.matrix_mode = mode;
        self.pop_matrix();
        result
    }

    /// Multiply by a perspective projection; `fov_y` in degrees
    pub fn perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.mult_matrix(Mat4::perspective_rh_gl(fov_y.to_radians(), aspect, near, far));
    }

    /// Multiply by an orthographic projection
    pub fn ortho(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.mult_matrix(Mat4::orthographic_rh_gl(left, right, bottom, top, near, far));
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.mult_matrix(Mat4::from_translation(offset));
    }

    pub fn scale(&mut self, factor: Vec3) {
        self.mult_matrix(Mat4::from_scale(factor));
    }

    /// Rotate by `degrees` about `axis`
    pub fn rotate(&mut self, degrees: f32, axis: Vec3) {
        let axis = axis.normalize_or_zero();
        if axis == Vec3::ZERO {
            return;
        }
        self.mult_matrix(Mat4::from_axis_angle(axis, degrees.to_radians()));
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        self.mult_matrix(Mat4::look_at_rh(eye, target, up));
    }

    /// Top of the projection stack
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection[self.projection.len() - 1]
    }

    /// Top of the model-view stack
    pub fn modelview_matrix(&self) -> Mat4 {
        self.modelview[self.modelview.len() - 1]
    }

    pub fn matrix_depth(&self, mode: MatrixMode) -> usize {
        match mode {
            MatrixMode::Projection => self.projection.len(),
            MatrixMode::ModelView => self.modelview.len(),
        }
    }

    // Color and clearing

    pub fn color3(&mut self, r: f32, g: f32, b: f32) {
        self.color = Vec4::new(r, g, b, 1.0);
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    pub fn current_color(&self) -> Vec4 {
        self.color
    }

    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) {
        self.clear_color = [r, g, b, a];
    }

    pub fn current_clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    /// Clear the bound target. Honors the scissor while scissor testing is on.
    pub fn clear(&mut self, flags: ClearFlags) -> BackendResult<()> {
        self.backend.clear(flags, self.clear_color, self.clear_depth)
    }

    // Fixed-function state

    pub fn enable(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
        self.backend.set_capability(capability, true);
    }

    pub fn disable(&mut self, capability: Capability) {
        self.capabilities.remove(&capability);
        self.backend.set_capability(capability, false);
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn viewport(&mut self, rect: Rect) {
        self.viewport = rect;
        self.backend.set_viewport(rect);
    }

    pub fn current_viewport(&self) -> Rect {
        self.viewport
    }

    pub fn scissor(&mut self, rect: Rect) {
        self.scissor = rect;
        self.backend.set_scissor(rect);
    }

    pub fn current_scissor(&self) -> Rect {
        self.scissor
    }

    /// Bind a framebuffer, `None` for the default surface
    pub fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferHandle>) -> BackendResult<()> {
        self.backend.bind_framebuffer(framebuffer)?;
        self.bound_framebuffer = framebuffer;
        Ok(())
    }

    pub fn bound_framebuffer(&self) -> Option<FramebufferHandle> {
        self.bound_framebuffer
    }

    pub fn bind_texture(&mut self, texture: Option<TextureHandle>) -> BackendResult<()> {
        self.backend.bind_texture(texture)?;
        self.bound_texture = texture;
        Ok(())
    }

    pub fn bound_texture(&self) -> Option<TextureHandle> {
        self.bound_texture
    }

    // Drawing

    /// Draw object-space positions in the current color
    pub fn draw(&mut self, topology: PrimitiveTopology, positions: &[Vec3]) -> BackendResult<()> {
        self.draw_vertices(topology, positions, None, None)
    }

    /// Draw object-space positions with optional per-vertex colors and
    /// texture coordinates. Missing attributes fall back to the current
    /// color and `(0, 0)`.
    pub fn draw_vertices(
        &mut self,
        topology: PrimitiveTopology,
        positions: &[Vec3],
        colors: Option<&[Vec4]>,
        uvs: Option<&[Vec2]>,
    ) -> BackendResult<()> {
        if positions.is_empty() {
            return Ok(());
        }
        let mvp = self.projection_matrix() * self.modelview_matrix();
        let vertices: Vec<ClipVertex> = positions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let color = colors.and_then(|c| c.get(i)).copied().unwrap_or(self.color);
                let uv = uvs.and_then(|u| u.get(i)).copied().unwrap_or(Vec2::ZERO);
                ClipVertex::new(mvp * p.extend(1.0), color, uv)
            })
            .collect();
        self.backend.draw(topology, &vertices)
    }

    /// Read pixels of the bound target, rows bottom-up
    pub fn read_pixels(&mut self, rect: Rect, format: PixelFormat) -> BackendResult<Vec<u8>> {
        self.backend.read_pixels(rect, format)
    }

    // Resources

    pub fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        self.backend.create_texture(desc)
    }

    pub fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        self.backend.write_texture(texture, data)
    }

    pub fn create_renderbuffer(
        &mut self,
        desc: &RenderbufferDescriptor,
    ) -> BackendResult<RenderbufferHandle> {
        self.backend.create_renderbuffer(desc)
    }

    pub fn create_framebuffer(&mut self, label: Option<&str>) -> BackendResult<FramebufferHandle> {
        self.backend.create_framebuffer(label)
    }

    pub fn attach_texture(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        texture: TextureHandle,
    ) -> BackendResult<()> {
        self.backend.attach_texture(framebuffer, attachment, texture)
    }

    pub fn attach_renderbuffer(
        &mut self,
        framebuffer: FramebufferHandle,
        attachment: Attachment,
        renderbuffer: RenderbufferHandle,
    ) -> BackendResult<()> {
        self.backend.attach_renderbuffer(framebuffer, attachment, renderbuffer)
    }

    pub fn framebuffer_status(&self, framebuffer: FramebufferHandle) -> FramebufferStatus {
        self.backend.framebuffer_status(framebuffer)
    }
}

#[cfg(all(test, feature = "software"))]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;

    fn context(width: u32, height: u32) -> RenderContext {
        RenderContext::new(SoftwareBackend::new(width, height))
    }

    #[test]
    fn test_push_pop_restores_top() {
        let mut ctx = context(4, 4);
        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.push_matrix();
        ctx.translate(Vec3::new(1.0, 2.0, 3.0));
        assert_ne!(ctx.modelview_matrix(), Mat4::IDENTITY);
        ctx.pop_matrix();
        assert_eq!(ctx.modelview_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_pop_underflow_is_ignored() {
        let mut ctx = context(4, 4);
        ctx.matrix_mode(MatrixMode::Projection);
        ctx.load_matrix(Mat4::from_scale(Vec3::splat(2.0)));
        ctx.pop_matrix();
        assert_eq!(ctx.matrix_depth(MatrixMode::Projection), 1);
        assert_eq!(ctx.projection_matrix(), Mat4::from_scale(Vec3::splat(2.0)));
    }

    #[test]
    fn test_matrix_mode_selects_stack() {
        let mut ctx = context(4, 4);
        ctx.matrix_mode(MatrixMode::Projection);
        ctx.ortho(0.0, 4.0, 0.0, 4.0, -1.0, 1.0);
        assert_eq!(ctx.modelview_matrix(), Mat4::IDENTITY);
        assert_eq!(
            ctx.projection_matrix(),
            Mat4::orthographic_rh_gl(0.0, 4.0, 0.0, 4.0, -1.0, 1.0)
        );
    }

    #[test]
    fn test_draw_uses_current_matrices() {
        let mut ctx = context(4, 4);
        ctx.matrix_mode(MatrixMode::Projection);
        ctx.ortho(0.0, 4.0, 0.0, 4.0, -1.0, 1.0);
        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.translate(Vec3::new(2.0, 1.0, 0.0));
        ctx.color3(1.0, 0.0, 0.0);
        ctx.draw(PrimitiveTopology::PointList, &[Vec3::new(0.5, 0.5, 0.0)])
            .unwrap();

        let pixels = ctx
            .read_pixels(Rect::new(2, 1, 1, 1), PixelFormat::Rgb8)
            .unwrap();
        assert_eq!(pixels, vec![255, 0, 0]);
    }

    #[test]
    fn test_state_is_tracked() {
        let mut ctx = context(8, 8);
        assert_eq!(ctx.current_viewport(), Rect::new(0, 0, 8, 8));
        ctx.viewport(Rect::new(1, 2, 3, 4));
        ctx.scissor(Rect::new(0, 0, 2, 2));
        ctx.enable(Capability::ScissorTest);
        assert_eq!(ctx.current_viewport(), Rect::new(1, 2, 3, 4));
        assert_eq!(ctx.current_scissor(), Rect::new(0, 0, 2, 2));
        assert!(ctx.is_enabled(Capability::ScissorTest));
        ctx.disable(Capability::ScissorTest);
        assert!(!ctx.is_enabled(Capability::ScissorTest));
        assert_eq!(ctx.bound_framebuffer(), None);
    }
}
