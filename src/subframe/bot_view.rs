//! First-person view from the actor's on-board camera

use glam::Vec3;

use super::{draw_overlays, Subframe};
use crate::backend::{Capability, ClearFlags};
use crate::camera::{FAR_PLANE, NEAR_PLANE};
use crate::context::{MatrixMode, RenderContext};
use crate::drawable::{Drawable, ObjectSet, TileGrid};
use crate::error::{ConfigError, RenderError};
use crate::scene::Scene;

/// Ground quad scale along x and z
const GROUND_SCALE: f32 = 50.0;

/// What the actor sees. Camera parameters come from
/// [`Scene::first_person_camera`]; a size differing from the camera's native
/// resolution is rendered stretched and reported once.
pub struct BotViewSubframe {
    width: u32,
    height: u32,
    drawables: Vec<Box<dyn Drawable>>,
    overlays: Vec<Box<dyn Drawable>>,
    warned: bool,
}

impl BotViewSubframe {
    pub fn new(width: u32, height: u32) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroSize { width, height });
        }
        Ok(Self {
            width,
            height,
            drawables: vec![Box::new(TileGrid::default()), Box::new(ObjectSet::default())],
            overlays: Vec::new(),
            warned: false,
        })
    }

    pub fn with_overlays(mut self, overlays: Vec<Box<dyn Drawable>>) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn with_overlay(mut self, overlay: impl Drawable + 'static) -> Self {
        self.overlays.push(Box::new(overlay));
        self
    }
}

impl Subframe for BotViewSubframe {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn draw(&mut self, scene: &dyn Scene, ctx: &mut RenderContext) -> Result<(), RenderError> {
        let camera = scene.first_person_camera();
        let (native_w, native_h) = camera.resolution;
        if (native_w, native_h) != (self.width, self.height) && !self.warned {
            self.warned = true;
            log::warn!(
                "BotViewSubframe: size {}x{} differs from the scene camera's {}x{}, output will be distorted",
                self.width,
                self.height,
                native_w,
                native_h
            );
        }

        ctx.enable(Capability::Multisample);
        ctx.enable(Capability::DepthTest);
        let [r, g, b] = scene.horizon_color();
        ctx.clear_color(r, g, b, 1.0);
        ctx.clear(ClearFlags::COLOR | ClearFlags::DEPTH)?;

        let aspect = if native_h > 0 {
            native_w as f32 / native_h as f32
        } else {
            self.width as f32 / self.height as f32
        };
        ctx.matrix_mode(MatrixMode::Projection);
        ctx.load_identity();
        ctx.perspective(camera.fov_y, aspect, NEAR_PLANE, FAR_PLANE);

        let mut eye = scene.actor_position();
        if let Some(noise) = camera.position_noise {
            eye += noise;
        }
        eye += camera.offset;
        eye.y += camera.mount_height;
        let direction = scene.actor_direction();

        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.load_identity();
        ctx.rotate(camera.rotation.x, Vec3::X);
        ctx.rotate(camera.rotation.y, Vec3::Y);
        ctx.rotate(camera.rotation.z, Vec3::Z);
        ctx.translate(Vec3::new(0.0, 0.0, camera.forward_offset));
        ctx.look_at(eye, eye + direction, Vec3::Y);

        ctx.disable(Capability::Texture2D);
        let [r, g, b] = scene.ground_color();
        ctx.color3(r, g, b);
        ctx.with_pushed_matrix(|ctx| {
            ctx.scale(Vec3::new(GROUND_SCALE, 1.0, GROUND_SCALE));
            scene.draw_ground_quad(ctx)
        })?;
        scene.draw_ground_triangles(ctx)?;

        for drawable in &mut self.drawables {
            drawable.draw(scene, ctx)?;
        }

        draw_overlays(&mut self.overlays, self.width, self.height, scene, ctx)
    }
}

#[cfg(all(test, feature = "software"))]
mod tests {
    use super::*;
    use crate::backend::software::SoftwareBackend;
    use crate::scene::SimpleScene;

    #[test]
    fn test_size_mismatch_warns_once() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(32, 24));
        let scene = SimpleScene::default();
        assert_eq!(scene.first_person_camera().resolution, (640, 480));

        let mut view = BotViewSubframe::new(32, 24).unwrap();
        view.draw(&scene, &mut ctx).unwrap();
        assert!(view.warned);
        view.draw(&scene, &mut ctx).unwrap();
        assert!(view.warned);
    }

    #[test]
    fn test_native_size_does_not_warn() {
        let mut ctx = RenderContext::new(SoftwareBackend::new(64, 48));
        let mut scene = SimpleScene::default();
        scene.set_first_person_camera(crate::scene::FirstPersonCamera {
            resolution: (64, 48),
            ..Default::default()
        });

        let mut view = BotViewSubframe::new(64, 48).unwrap();
        view.draw(&scene, &mut ctx).unwrap();
        view.draw(&scene, &mut ctx).unwrap();
        assert!(!view.warned);
    }
}
