use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::quadtree::QuadtreeConfig;
use crate::rect::Rect;

/// Settings the level loader hands to `World::new`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Playable area; also the root bounds of both indexes.
    pub bounds: Rect,
    pub index: QuadtreeConfig,
    /// Health removed by one melee hit.
    pub melee_damage: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            bounds: Rect::new(0.0, 0.0, 1024.0, 1024.0),
            index: QuadtreeConfig::default(),
            melee_damage: 1,
        }
    }
}

impl WorldConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.bounds;
        if ![b.x, b.y, b.width, b.height].iter().all(|v| v.is_finite()) {
            return Err(ConfigError::Invalid(format!("world bounds must be finite, got {:?}", b)));
        }
        if !(self.bounds.width > 0.0 && self.bounds.height > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "world bounds must have a positive size, got {}x{}",
                self.bounds.width, self.bounds.height
            )));
        }
        if self.index.max_objects == 0 {
            return Err(ConfigError::Invalid("index.max_objects must be at least 1".into()));
        }
        if self.melee_damage < 0 {
            return Err(ConfigError::Invalid(format!(
                "melee_damage must not be negative, got {}",
                self.melee_damage
            )));
        }
        Ok(())
    }
}
