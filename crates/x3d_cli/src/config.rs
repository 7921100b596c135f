//! x3dnav configuration file handling
//!
//! `x3dnav.toml` holds the input runtime sections read by `x3d_input` plus
//! a `[demo]` table for the scripted session.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use x3d_input::{ClipConfig, InputConfig, NavigationConfig, NavigationMode, PickingConfig, RouteConfig};

pub const CONFIG_FILE: &str = "x3dnav.toml";

// =============================================================================
// x3dnav.toml
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NavConfig {
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub picking: PickingConfig,
    #[serde(default)]
    pub clipping: ClipConfig,
    #[serde(default)]
    pub routing: RouteConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// Scripted session settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DemoConfig {
    /// Frames spent walking
    #[serde(default = "default_frames")]
    pub frames: usize,
    /// Seconds per frame
    #[serde(default = "default_frame_time")]
    pub frame_time: f32,
    /// Mode selected before the session starts
    #[serde(default = "default_mode")]
    pub mode: String,
}

fn default_frames() -> usize {
    90
}

fn default_frame_time() -> f32 {
    1.0 / 60.0
}

fn default_mode() -> String {
    "WALK".to_string()
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: default_frames(),
            frame_time: default_frame_time(),
            mode: default_mode(),
        }
    }
}

impl NavConfig {
    /// Load from a file, validating every section
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("No {} found at {}", CONFIG_FILE, path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load `path` when given, else `x3dnav.toml` in the working directory
    /// if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let local = Path::new(CONFIG_FILE);
                if local.exists() {
                    Self::load(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: NavConfig = toml::from_str(content).context("Invalid x3dnav configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize x3dnav configuration")
    }

    pub fn validate(&self) -> Result<()> {
        self.input().validate()?;
        if self.demo.frames == 0 {
            anyhow::bail!("demo.frames must be at least 1");
        }
        if !(self.demo.frame_time > 0.0) {
            anyhow::bail!("demo.frame_time must be greater than zero");
        }
        if NavigationMode::from_name(&self.demo.mode).is_none() {
            anyhow::bail!("demo.mode: unknown navigation mode {:?}", self.demo.mode);
        }
        Ok(())
    }

    /// The input runtime sections
    pub fn input(&self) -> InputConfig {
        InputConfig {
            navigation: self.navigation.clone(),
            picking: self.picking.clone(),
            clipping: self.clipping.clone(),
            routing: self.routing.clone(),
        }
    }

    pub fn demo_mode(&self) -> NavigationMode {
        NavigationMode::from_name(&self.demo.mode).unwrap_or(NavigationMode::Walk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = NavConfig::from_toml("").unwrap();
        assert_eq!(config, NavConfig::default());
        assert_eq!(config.demo.frames, 90);
        assert_eq!(config.demo_mode(), NavigationMode::Walk);
    }

    #[test]
    fn test_partial_sections() {
        let config = NavConfig::from_toml(
            r#"
            [navigation]
            speed = 4.0

            [demo]
            mode = "EXAMINE"
            "#,
        )
        .unwrap();
        assert_eq!(config.navigation.speed, 4.0);
        assert_eq!(config.navigation.avatar_height, 1.8);
        assert_eq!(config.demo.frames, 90);
        assert_eq!(config.demo_mode(), NavigationMode::Examine);
        assert_eq!(config.input().navigation.speed, 4.0);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(NavConfig::from_toml("[demo]\nframes = 0").is_err());
        assert!(NavConfig::from_toml("[demo]\nmode = \"RUN\"").is_err());
        assert!(NavConfig::from_toml("[navigation]\nworld_scale = 0.0").is_err());
    }

    #[test]
    fn test_written_config_reads_back() {
        let mut config = NavConfig::default();
        config.routing.max_depth = 8;
        let text = config.to_toml().unwrap();
        assert_eq!(NavConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = NavConfig::load(Path::new("/nonexistent/x3dnav.toml")).unwrap_err();
        assert!(err.to_string().contains("No x3dnav.toml"));
    }
}
