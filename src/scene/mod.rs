//! Scene contract
//!
//! The recorder does not own simulation content. It draws whatever a
//! [`Scene`] implementation exposes: a tile grid, dynamic objects, one
//! primary actor and the first-person camera parameters of that actor.

mod simple;

pub use simple::*;

use std::sync::Arc;

use glam::{Vec2, Vec3};
use parking_lot::RwLock;
use thiserror::Error;

use crate::backend::{BackendResult, TextureHandle};
use crate::context::RenderContext;

/// Scene shared between the driving application, the recorder and info providers
pub type SceneHandle = Arc<RwLock<dyn Scene>>;

/// Wrap a scene into a [`SceneHandle`]
pub fn scene_handle(scene: impl Scene + 'static) -> SceneHandle {
    Arc::new(RwLock::new(scene))
}

/// Unit heading vector in the ground plane for an angle in radians
pub fn direction_vector(angle: f32) -> Vec3 {
    Vec3::new(angle.cos(), 0.0, -angle.sin())
}

/// Point on a cubic bezier curve
pub fn bezier_point(control: &[Vec3; 4], t: f32) -> Vec3 {
    let u = 1.0 - t;
    control[0] * (u * u * u)
        + control[1] * (3.0 * u * u * t)
        + control[2] * (3.0 * u * t * t)
        + control[3] * (t * t * t)
}

/// One cell of the tile grid
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Rotation about the vertical axis in quarter turns
    pub angle: i32,
    pub color: [f32; 3],
    pub texture: Option<TextureHandle>,
    pub drivable: bool,
    /// Candidate lane curves, 4 world-space control points each
    pub curves: Vec<[Vec3; 4]>,
}

/// Raised by [`Scene::lane_position`] when a position cannot be mapped to a lane
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Position {position} is not in a lane")]
pub struct NotInLane {
    pub position: Vec3,
}

/// Position relative to the closest lane curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LanePosition {
    /// Distance to the curve
    pub dist: f32,
    /// Alignment between heading and curve tangent
    pub dot_dir: f32,
    /// Angle between heading and curve tangent in degrees
    pub angle_deg: f32,
}

/// Mounting and optics of the actor's on-board camera
#[derive(Debug, Clone, PartialEq)]
pub struct FirstPersonCamera {
    /// Vertical field of view in degrees
    pub fov_y: f32,
    /// Rotation offsets about x, y, z in degrees
    pub rotation: Vec3,
    pub offset: Vec3,
    pub mount_height: f32,
    /// Distance the camera sits ahead of the actor
    pub forward_offset: f32,
    /// Randomized position perturbation, present when domain randomization is on
    pub position_noise: Option<Vec3>,
    /// Native resolution the simulation renders this camera at
    pub resolution: (u32, u32),
}

impl Default for FirstPersonCamera {
    fn default() -> Self {
        Self {
            fov_y: 42.0,
            rotation: Vec3::new(15.0, 0.0, 0.0),
            offset: Vec3::ZERO,
            mount_height: 0.108,
            forward_offset: 0.066,
            position_noise: None,
            resolution: (640, 480),
        }
    }
}

/// Dynamic scene object
pub trait SceneObject {
    fn render(&self, ctx: &mut RenderContext, draw_bbox: bool) -> BackendResult<()>;
}

/// Text label appearance
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStyle {
    pub font_name: String,
    pub font_size: f32,
    pub color: [f32; 4],
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial".to_string(),
            font_size: 12.0,
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Text object drawn in pixel space
pub trait Label {
    fn set_text(&mut self, text: &str);
    fn text(&self) -> &str;
    fn draw(&mut self, ctx: &mut RenderContext) -> BackendResult<()>;
}

/// Simulation state consumed by the recorder
pub trait Scene: Send + Sync {
    // Tile grid

    /// Number of tiles along x and z
    fn grid_size(&self) -> (usize, usize);

    fn tile(&self, i: usize, j: usize) -> Option<&Tile>;

    /// Edge length of one tile in world units
    fn road_tile_size(&self) -> f32;

    /// Whether lane curves should be drawn on drivable tiles
    fn draw_curves(&self) -> bool;

    /// Draw one road tile centred at the origin of the current model-view
    fn draw_road_tile(&self, ctx: &mut RenderContext) -> BackendResult<()>;

    // Objects

    fn objects(&self) -> Box<dyn Iterator<Item = &dyn SceneObject> + '_>;

    // Primary actor

    fn actor_position(&self) -> Vec3;

    /// Heading in radians
    fn actor_angle(&self) -> f32;

    fn actor_speed(&self) -> f32;

    fn step_count(&self) -> u64;

    fn actor_direction(&self) -> Vec3 {
        direction_vector(self.actor_angle())
    }

    /// Footprint corners in the ground plane, as (x, z)
    fn actor_corners(&self) -> [Vec2; 4];

    /// Draw the actor mesh in its local frame
    fn render_actor_mesh(&self, ctx: &mut RenderContext) -> BackendResult<()>;

    fn lane_position(&self, position: Vec3, angle: f32) -> Result<LanePosition, NotInLane>;

    fn first_person_camera(&self) -> FirstPersonCamera;

    // Ground

    fn horizon_color(&self) -> [f32; 3];

    fn ground_color(&self) -> [f32; 3];

    /// Unit ground quad, scaled by the caller
    fn draw_ground_quad(&self, ctx: &mut RenderContext) -> BackendResult<()>;

    fn draw_ground_triangles(&self, ctx: &mut RenderContext) -> BackendResult<()>;

    // Text

    fn create_label(&self, text: &str, x: f32, y: f32, style: &LabelStyle) -> Box<dyn Label>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_direction_vector() {
        assert!(direction_vector(0.0).abs_diff_eq(Vec3::X, 1e-6));
        assert!(direction_vector(FRAC_PI_2).abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn test_bezier_endpoints() {
        let control = [
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 1.0),
            Vec3::new(3.0, 0.0, 1.0),
        ];
        assert_eq!(bezier_point(&control, 0.0), control[0]);
        assert_eq!(bezier_point(&control, 1.0), control[3]);
    }
}
