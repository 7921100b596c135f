//! User navigation.
//!
//! [`NavigationProcessor`] owns the camera transform and applies the
//! active [`NavigationMode`] once per frame. Input arrives as
//! `start_move` / `move_by` / `stop_move` direction vectors, usually
//! produced by [`crate::InputHandler`].

mod processor;

pub use processor::{NavigationProcessor, ViewState};

use crate::render::ObjectId;
use serde::{Deserialize, Serialize};
use x3d_nodes::ListenerError;

/// How pointer input moves the viewer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NavigationMode {
    None,
    #[default]
    Examine,
    Walk,
    Fly,
    Pan,
    Tilt,
    LookAt,
    Inspect,
    TrackExamine,
    TrackPan,
}

impl NavigationMode {
    pub const ALL: &'static [NavigationMode] = &[
        NavigationMode::None,
        NavigationMode::Examine,
        NavigationMode::Walk,
        NavigationMode::Fly,
        NavigationMode::Pan,
        NavigationMode::Tilt,
        NavigationMode::LookAt,
        NavigationMode::Inspect,
        NavigationMode::TrackExamine,
        NavigationMode::TrackPan,
    ];

    /// Parse a NavigationInfo type string. `"ANY"` is not a mode and
    /// yields `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            NavigationMode::None => "NONE",
            NavigationMode::Examine => "EXAMINE",
            NavigationMode::Walk => "WALK",
            NavigationMode::Fly => "FLY",
            NavigationMode::Pan => "PAN",
            NavigationMode::Tilt => "TILT",
            NavigationMode::LookAt => "LOOKAT",
            NavigationMode::Inspect => "INSPECT",
            NavigationMode::TrackExamine => "TRACK_EXAMINE",
            NavigationMode::TrackPan => "TRACK_PAN",
        }
    }

    /// Modes that orbit a centre of rotation
    pub fn orbits(&self) -> bool {
        matches!(
            self,
            NavigationMode::Examine
                | NavigationMode::LookAt
                | NavigationMode::Inspect
                | NavigationMode::TrackExamine
        )
    }
}

impl std::fmt::Display for NavigationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Shape swept ahead of the viewer for collision
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarRepresentation {
    /// Single segment along the direction of travel
    #[default]
    Point,
    /// Head-to-knee cylinder
    Cylinder,
    /// Narrow cylinder across the shoulders
    Shoulders,
}

/// Observes navigation mode changes
pub trait NavigationStateListener {
    fn navigation_state_changed(&mut self, mode: NavigationMode) -> Result<(), ListenerError>;
}

/// Observes the viewer running into collidable geometry
pub trait CollisionListener {
    fn avatar_collision(&mut self, object: Option<ObjectId>) -> Result<(), ListenerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_round_trip() {
        for mode in NavigationMode::ALL {
            assert_eq!(NavigationMode::from_name(mode.name()), Some(*mode));
        }
        assert_eq!(NavigationMode::from_name("ANY"), None);
        assert_eq!(NavigationMode::from_name("walk"), None);
    }

    #[test]
    fn test_avatar_serde_names() {
        let json = serde_json::to_string(&AvatarRepresentation::Shoulders).unwrap();
        assert_eq!(json, "\"shoulders\"");
        let parsed: AvatarRepresentation = serde_json::from_str("\"cylinder\"").unwrap();
        assert_eq!(parsed, AvatarRepresentation::Cylinder);
    }
}
