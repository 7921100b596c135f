//! Input runtime configuration
//!
//! All sections are optional in the TOML file; missing keys take the
//! defaults below.
//!
//! ```toml
//! [navigation]
//! speed = 2.0
//! avatar = "cylinder"
//! modes = ["WALK", "ANY"]
//!
//! [clipping]
//! max_visibility = 5000.0
//! ```

use crate::error::{InputError, Result};
use crate::navigation::{AvatarRepresentation, NavigationMode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// =============================================================================
// Sections
// =============================================================================

/// Avatar and navigation defaults used until a NavigationInfo binds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Units per second
    pub speed: f32,
    /// Seconds for one full examine orbit at full input
    pub orbit_time: f32,
    pub avatar_height: f32,
    /// Collision radius
    pub avatar_size: f32,
    /// Highest step walk mode climbs
    pub avatar_step: f32,
    pub avatar: AvatarRepresentation,
    pub world_scale: f32,
    /// Examine zoom never brings the camera closer than this
    pub min_examine_radius: f32,
    /// NavigationInfo-style type list
    pub modes: Vec<String>,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            orbit_time: 5.0,
            avatar_height: 1.8,
            avatar_size: 0.25,
            avatar_step: 0.4,
            avatar: AvatarRepresentation::default(),
            world_scale: 1.0,
            min_examine_radius: 0.01,
            modes: vec!["EXAMINE".to_string(), "ANY".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickingConfig {
    /// Step by which pick result buffers grow
    pub result_increment: usize,
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            result_increment: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Far clip floor when no visibility limit is set
    pub max_visibility: f32,
    pub min_near: f32,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            max_visibility: 3000.0,
            min_near: 0.001,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Deepest route cascade followed from one event
    pub max_depth: usize,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            max_depth: x3d_nodes::DEFAULT_ROUTE_DEPTH,
        }
    }
}

// =============================================================================
// InputConfig
// =============================================================================

/// Complete input runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub navigation: NavigationConfig,
    pub picking: PickingConfig,
    pub clipping: ClipConfig,
    pub routing: RouteConfig,
}

impl InputConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: InputConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value against its accepted range
    pub fn validate(&self) -> Result<()> {
        let nav = &self.navigation;
        if !(nav.speed >= 0.0) {
            return Err(InputError::setting("navigation.speed", "must not be negative"));
        }
        if !(nav.orbit_time > 0.0) {
            return Err(InputError::setting(
                "navigation.orbit_time",
                "must be greater than zero",
            ));
        }
        for (name, value) in [
            ("navigation.avatar_height", nav.avatar_height),
            ("navigation.avatar_size", nav.avatar_size),
            ("navigation.avatar_step", nav.avatar_step),
        ] {
            if !(value >= 0.0) {
                return Err(InputError::setting(name, "must not be negative"));
            }
        }
        if !(nav.world_scale > 0.0) {
            return Err(InputError::setting(
                "navigation.world_scale",
                "must be greater than zero",
            ));
        }
        if !(nav.min_examine_radius > 0.0) {
            return Err(InputError::setting(
                "navigation.min_examine_radius",
                "must be greater than zero",
            ));
        }
        if let Some(bad) = nav
            .modes
            .iter()
            .find(|m| m.as_str() != "ANY" && NavigationMode::from_name(m).is_none())
        {
            return Err(InputError::setting(
                "navigation.modes",
                format!("unknown navigation type {bad:?}"),
            ));
        }
        if self.picking.result_increment == 0 {
            return Err(InputError::setting(
                "picking.result_increment",
                "must be at least 1",
            ));
        }
        if !(self.clipping.min_near > 0.0) {
            return Err(InputError::setting(
                "clipping.min_near",
                "must be greater than zero",
            ));
        }
        if !(self.clipping.max_visibility > self.clipping.min_near) {
            return Err(InputError::setting(
                "clipping.max_visibility",
                "must exceed clipping.min_near",
            ));
        }
        if self.routing.max_depth == 0 {
            return Err(InputError::setting("routing.max_depth", "must be at least 1"));
        }
        Ok(())
    }
}
