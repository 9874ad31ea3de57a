//! Camera settings for a subframe
//!
//! A camera owns a projection (perspective or orthogonal, with a uniform
//! x/y scale) and an optional set of view providers. Without providers the
//! view is the identity.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::context::{MatrixMode, RenderContext};
use crate::error::ConfigError;
use crate::scene::Scene;

/// Vertical field of view of perspective cameras, in degrees
pub const FIELD_OF_VIEW_Y: f32 = 45.0;
pub const NEAR_PLANE: f32 = 0.04;
pub const FAR_PLANE: f32 = 100.0;
const ORTHO_NEAR: f32 = -1.0;
const ORTHO_FAR: f32 = 10.0;

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    Orthogonal,
}

impl FromStr for ProjectionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perspective" => Ok(Self::Perspective),
            "orthogonal" => Ok(Self::Orthogonal),
            other => Err(ConfigError::InvalidProjection(other.to_string())),
        }
    }
}

impl fmt::Display for ProjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Perspective => write!(f, "perspective"),
            Self::Orthogonal => write!(f, "orthogonal"),
        }
    }
}

/// Reads one vector from the scene (eye position, view direction or up)
pub trait VectorProvider {
    fn vector(&self, scene: &dyn Scene) -> Vec3;
}

impl<F> VectorProvider for F
where
    F: Fn(&dyn Scene) -> Vec3,
{
    fn vector(&self, scene: &dyn Scene) -> Vec3 {
        self(scene)
    }
}

/// Eye position, view direction and up vector providers, always all three
#[derive(Clone)]
pub struct ViewProviders {
    pub position: Arc<dyn VectorProvider>,
    pub direction: Arc<dyn VectorProvider>,
    pub up: Arc<dyn VectorProvider>,
}

impl ViewProviders {
    pub fn new(
        position: impl VectorProvider + 'static,
        direction: impl VectorProvider + 'static,
        up: impl VectorProvider + 'static,
    ) -> Self {
        Self {
            position: Arc::new(position),
            direction: Arc::new(direction),
            up: Arc::new(up),
        }
    }

    /// Build from individually optional providers. A partial set yields
    /// `None`, which means an identity view.
    pub fn from_parts(
        position: Option<Arc<dyn VectorProvider>>,
        direction: Option<Arc<dyn VectorProvider>>,
        up: Option<Arc<dyn VectorProvider>>,
    ) -> Option<Self> {
        match (position, direction, up) {
            (Some(position), Some(direction), Some(up)) => Some(Self {
                position,
                direction,
                up,
            }),
            (None, None, None) => None,
            _ => {
                log::warn!("Camera: partial view providers given, using identity view");
                None
            }
        }
    }
}

impl fmt::Debug for ViewProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewProviders").finish_non_exhaustive()
    }
}

/// Projection and view setup of one subframe
#[derive(Debug, Clone)]
pub struct CameraSettings {
    width: u32,
    height: u32,
    projection: ProjectionKind,
    scale: f32,
    view: Option<ViewProviders>,
}

impl CameraSettings {
    pub fn new(
        width: u32,
        height: u32,
        projection: ProjectionKind,
        scale: f32,
    ) -> Result<Self, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroSize { width, height });
        }
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(ConfigError::NonPositiveScale(scale));
        }
        Ok(Self {
            width,
            height,
            projection,
            scale,
            view: None,
        })
    }

    /// Like [`CameraSettings::new`] with the projection given by name
    pub fn parse(width: u32, height: u32, projection: &str, scale: f32) -> Result<Self, ConfigError> {
        Self::new(width, height, projection.parse()?, scale)
    }

    pub fn perspective(width: u32, height: u32) -> Result<Self, ConfigError> {
        Self::new(width, height, ProjectionKind::Perspective, 1.0)
    }

    pub fn orthogonal(width: u32, height: u32) -> Result<Self, ConfigError> {
        Self::new(width, height, ProjectionKind::Orthogonal, 1.0)
    }

    pub fn with_view(mut self, view: ViewProviders) -> Self {
        self.view = Some(view);
        self
    }

    /// Rebind the view providers
    pub fn set_view(&mut self, view: ViewProviders) {
        self.view = Some(view);
    }

    pub fn clear_view(&mut self) {
        self.view = None;
    }

    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn projection(&self) -> ProjectionKind {
        self.projection
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Projection including the x/y scale
    pub fn projection_matrix(&self) -> Mat4 {
        let base = match self.projection {
            ProjectionKind::Perspective => Mat4::perspective_rh_gl(
                FIELD_OF_VIEW_Y.to_radians(),
                self.aspect(),
                NEAR_PLANE,
                FAR_PLANE,
            ),
            ProjectionKind::Orthogonal => {
                let (hw, hh) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
                Mat4::orthographic_rh_gl(-hw, hw, -hh, hh, ORTHO_NEAR, ORTHO_FAR)
            }
        };
        base * Mat4::from_scale(Vec3::new(self.scale, self.scale, 1.0))
    }

    /// View transform for the current scene state. `flip_vertically`
    /// negates the provided up vector.
    pub fn view_matrix(&self, scene: &dyn Scene, flip_vertically: bool) -> Mat4 {
        let Some(view) = &self.view else {
            return Mat4::IDENTITY;
        };
        let eye = view.position.vector(scene);
        let target = eye + view.direction.vector(scene);
        let mut up = view.up.vector(scene);
        if flip_vertically {
            up = -up;
        }
        Mat4::look_at_rh(eye, target, up)
    }

    /// Load projection and view into the context. Prior matrices are not saved.
    pub fn apply(&self, ctx: &mut RenderContext, scene: &dyn Scene, flip_vertically: bool) {
        ctx.matrix_mode(MatrixMode::Projection);
        ctx.load_identity();
        match self.projection {
            ProjectionKind::Perspective => {
                ctx.perspective(FIELD_OF_VIEW_Y, self.aspect(), NEAR_PLANE, FAR_PLANE)
            }
            ProjectionKind::Orthogonal => {
                let (hw, hh) = (self.width as f32 / 2.0, self.height as f32 / 2.0);
                ctx.ortho(-hw, hw, -hh, hh, ORTHO_NEAR, ORTHO_FAR);
            }
        }
        ctx.scale(Vec3::new(self.scale, self.scale, 1.0));

        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.load_identity();
        if self.view.is_some() {
            ctx.mult_matrix(self.view_matrix(scene, flip_vertically));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SimpleScene;

    fn fixed(v: Vec3) -> impl Fn(&dyn Scene) -> Vec3 {
        move |_: &dyn Scene| v
    }

    #[test]
    fn test_projection_kind_parse() {
        assert_eq!("perspective".parse::<ProjectionKind>(), Ok(ProjectionKind::Perspective));
        assert_eq!("orthogonal".parse::<ProjectionKind>(), Ok(ProjectionKind::Orthogonal));
        assert_eq!(
            "isometric".parse::<ProjectionKind>(),
            Err(ConfigError::InvalidProjection("isometric".to_string()))
        );
        assert!(CameraSettings::parse(10, 10, "Perspective", 1.0).is_err());
    }

    #[test]
    fn test_invalid_settings() {
        assert_eq!(
            CameraSettings::new(640, 480, ProjectionKind::Perspective, 0.0).unwrap_err(),
            ConfigError::NonPositiveScale(0.0)
        );
        assert!(CameraSettings::new(640, 480, ProjectionKind::Perspective, f32::NAN).is_err());
        assert_eq!(
            CameraSettings::orthogonal(0, 480).unwrap_err(),
            ConfigError::ZeroSize {
                width: 0,
                height: 480
            }
        );
    }

    #[test]
    fn test_aspect_is_width_over_height() {
        let camera = CameraSettings::perspective(640, 480).unwrap();
        assert_eq!(camera.aspect(), 640.0 / 480.0);
        let expected = Mat4::perspective_rh_gl(45f32.to_radians(), 640.0 / 480.0, 0.04, 100.0);
        assert!(camera.projection_matrix().abs_diff_eq(expected, 1e-6));
    }

    #[test]
    fn test_scale_applies_to_xy_only() {
        let camera = CameraSettings::new(200, 100, ProjectionKind::Orthogonal, 2.0).unwrap();
        let p = camera.projection_matrix().project_point3(Vec3::new(25.0, 10.0, 0.0));
        assert!((p.x - 0.5).abs() < 1e-6);
        assert!((p.y - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_identity_view_without_providers() {
        let scene = SimpleScene::default();
        let camera = CameraSettings::perspective(64, 64).unwrap();
        assert_eq!(camera.view_matrix(&scene, false), Mat4::IDENTITY);
        assert_eq!(camera.view_matrix(&scene, true), Mat4::IDENTITY);
    }

    #[test]
    fn test_flip_negates_up_only() {
        let scene = SimpleScene::default();
        let eye = Vec3::new(1.0, 2.0, 3.0);
        let dir = Vec3::new(0.0, 0.0, -1.0);
        let up = Vec3::Y;
        let camera = CameraSettings::perspective(64, 64)
            .unwrap()
            .with_view(ViewProviders::new(fixed(eye), fixed(dir), fixed(up)));

        assert_eq!(
            camera.view_matrix(&scene, false),
            Mat4::look_at_rh(eye, eye + dir, up)
        );
        assert_eq!(
            camera.view_matrix(&scene, true),
            Mat4::look_at_rh(eye, eye + dir, -up)
        );
    }

    #[test]
    fn test_partial_providers_are_rejected() {
        let position: Arc<dyn VectorProvider> = Arc::new(fixed(Vec3::ZERO));
        assert!(ViewProviders::from_parts(Some(position), None, None).is_none());
        assert!(ViewProviders::from_parts(None, None, None).is_none());
    }

    #[cfg(feature = "software")]
    #[test]
    fn test_apply_loads_matrices() {
        use crate::backend::software::SoftwareBackend;

        let scene = SimpleScene::default();
        let mut ctx = RenderContext::new(SoftwareBackend::new(8, 8));
        ctx.matrix_mode(MatrixMode::ModelView);
        ctx.translate(Vec3::X);

        let camera = CameraSettings::perspective(640, 480).unwrap();
        camera.apply(&mut ctx, &scene, false);
        assert!(ctx
            .projection_matrix()
            .abs_diff_eq(camera.projection_matrix(), 1e-6));
        assert_eq!(ctx.modelview_matrix(), Mat4::IDENTITY);
        assert_eq!(ctx.current_matrix_mode(), MatrixMode::ModelView);
    }
}
