//! Engine configuration
//!
//! Loaded from TOML, e.g. `orpheus.toml`:
//!
//! ```toml
//! sample_rate = 48000.0
//! block_size = 256
//! modules = ["OrpheusSound", "NodeExt"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processing::OperatorSettings;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Config parsing error: {reason}")]
    Parse { reason: String },

    #[error("Invalid operator settings: {reason}")]
    InvalidSettings { reason: String },

    #[error("Unknown module: {name}")]
    UnknownModule { name: String },
}

fn default_sample_rate() -> f32 {
    44100.0
}

fn default_block_size() -> usize {
    512
}

fn default_modules() -> Vec<String> {
    vec!["OrpheusSound".to_string(), "NodeExt".to_string()]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,

    #[serde(default = "default_block_size")]
    pub block_size: usize,

    /// Modules to start, in load order.
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            modules: default_modules(),
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Self::load_from_str(&content)
    }

    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn operator_settings(&self) -> Result<OperatorSettings, ConfigError> {
        OperatorSettings::new(self.sample_rate, self.block_size)
    }
}
