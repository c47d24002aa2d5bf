//! Pipeline configuration
//!
//! Every tunable constant lives here with its default. `PipelineConfig` can be
//! loaded from a JSON file; fields left out keep their defaults.

use crate::recognize::RecognitionPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Size cap applied by the normalizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Longest allowed side in pixels (default: 2048)
    pub max_side: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { max_side: 2048 }
    }
}

/// Constants of the grayscale contrast pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Contrast factor around mid-gray (default: 1.4)
    pub contrast: f32,
    /// Brightness multiplier (default: 1.08)
    pub brightness: f32,
    /// Flat additive lift (default: 8.0)
    pub lift: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            contrast: 1.4,
            brightness: 1.08,
            lift: 8.0,
        }
    }
}

/// Everything the import coordinator needs to run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub normalize: NormalizeConfig,
    pub enhance: EnhanceConfig,
    pub recognition: RecognitionPolicy,
}

/// Error loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
