//! Info providers
//!
//! Each provider reads one quantity of the simulation and formats it for
//! an overlay label. Providers may be bound to a [`SceneHandle`]; reads
//! through [`Info::value`] without an explicit scene go through that binding.

use std::fmt;

use glam::Vec3;
use thiserror::Error;

use crate::camera::{VectorProvider, ViewProviders};
use crate::scene::{Scene, SceneHandle};

/// Info provider error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InfoError {
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("No scene bound to the provider and none given")]
    Unbound,
}

/// Quantity read from the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InfoValue {
    Scalar(f32),
    Count(u64),
    /// Radians, displayed as whole degrees
    Angle(f32),
    Vector(Vec3),
    Flag(bool),
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{:.2}", v),
            Self::Count(n) => write!(f, "{}", n),
            Self::Angle(rad) => write!(f, "{}", rad.to_degrees().trunc() as i64),
            Self::Vector(v) => write!(f, "[{:.2}, {:.2}, {:.2}]", v.x, v.y, v.z),
            Self::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// Scene binding and display prefix shared by all providers
#[derive(Clone, Default)]
pub struct InfoBinding {
    pub scene: Option<SceneHandle>,
    pub prefix: String,
}

impl fmt::Debug for InfoBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfoBinding")
            .field("bound", &self.scene.is_some())
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Value + formatter contract
pub trait Info {
    fn binding(&self) -> &InfoBinding;

    /// Read the quantity from `scene`
    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError>;

    /// Read from `scene`, or from the bound scene when `None`
    fn value(&self, scene: Option<&dyn Scene>) -> Result<InfoValue, InfoError> {
        match scene {
            Some(scene) => self.read(scene),
            None => {
                let handle = self.binding().scene.as_ref().ok_or(InfoError::Unbound)?;
                let guard = handle.read();
                self.read(&*guard)
            }
        }
    }

    /// Prefixed display string from the bound scene
    fn text(&self) -> Result<String, InfoError> {
        Ok(format!("{}{}", self.binding().prefix, self.value(None)?))
    }

    /// Prefixed display string from an explicit scene
    fn text_in(&self, scene: &dyn Scene) -> Result<String, InfoError> {
        Ok(format!("{}{}", self.binding().prefix, self.read(scene)?))
    }
}

macro_rules! info_provider {
    ($(#[$meta:meta])* $name:ident, $prefix:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            binding: InfoBinding,
        }

        impl $name {
            pub fn new(scene: Option<SceneHandle>) -> Self {
                Self {
                    binding: InfoBinding {
                        scene,
                        prefix: $prefix.to_string(),
                    },
                }
            }

            pub fn with_prefix(mut self, prefix: &str) -> Self {
                self.binding.prefix = prefix.to_string();
                self
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new(None)
            }
        }
    };
}

info_provider!(
    /// Actor position
    BotPosition,
    "pos: "
);
info_provider!(
    /// Actor speed
    BotSpeed,
    "speed: "
);
info_provider!(
    /// Simulation steps taken so far
    StepCount,
    "steps: "
);
info_provider!(
    /// Actor heading
    BotAngle,
    "angle: "
);
info_provider!(
    /// Actor heading as a unit vector
    BotDirection,
    "dir: "
);
info_provider!(
    /// Fixed world up vector
    WorldUp,
    "up: "
);
info_provider!(
    /// Whether the actor currently sits in a lane
    IsInLane,
    "in lane: "
);
info_provider!(Distance, "distance: ");
info_provider!(TimeOutOfLane, "out of lane: ");
info_provider!(TimeInactive, "inactive: ");

impl Info for BotPosition {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Ok(InfoValue::Vector(scene.actor_position()))
    }
}

impl Info for BotSpeed {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Ok(InfoValue::Scalar(scene.actor_speed()))
    }
}

impl Info for StepCount {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Ok(InfoValue::Count(scene.step_count()))
    }
}

impl Info for BotAngle {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Ok(InfoValue::Angle(scene.actor_angle()))
    }
}

impl Info for BotDirection {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Ok(InfoValue::Vector(scene.actor_direction()))
    }
}

impl Info for WorldUp {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, _scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Ok(InfoValue::Vector(Vec3::Y))
    }
}

impl Info for IsInLane {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        let lane = scene.lane_position(scene.actor_position(), scene.actor_angle());
        Ok(InfoValue::Flag(lane.is_ok()))
    }
}

impl Info for Distance {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, _scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Err(InfoError::NotImplemented("Distance"))
    }
}

impl Info for TimeOutOfLane {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, _scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Err(InfoError::NotImplemented("TimeOutOfLane"))
    }
}

impl Info for TimeInactive {
    fn binding(&self) -> &InfoBinding {
        &self.binding
    }

    fn read(&self, _scene: &dyn Scene) -> Result<InfoValue, InfoError> {
        Err(InfoError::NotImplemented("TimeInactive"))
    }
}

impl VectorProvider for BotPosition {
    fn vector(&self, scene: &dyn Scene) -> Vec3 {
        scene.actor_position()
    }
}

impl VectorProvider for BotDirection {
    fn vector(&self, scene: &dyn Scene) -> Vec3 {
        scene.actor_direction()
    }
}

impl VectorProvider for WorldUp {
    fn vector(&self, _scene: &dyn Scene) -> Vec3 {
        Vec3::Y
    }
}

impl ViewProviders {
    /// Chase view: eye at the actor, looking along its heading, world up
    pub fn actor() -> Self {
        Self::new(BotPosition::default(), BotDirection::default(), WorldUp::default())
    }
}
