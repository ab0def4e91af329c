use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    LapscopeError,
    analysis::{DetectionConfig, MetricsConfig, SegmentationConfig},
};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR: &str = "lapscope";

/// Tunables for one analysis run. Every field falls back to its default when
/// missing from the config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub segmentation: SegmentationConfig,
    pub detection: DetectionConfig,
    pub metrics: MetricsConfig,
    /// Directory of per-track zone files
    pub track_zones_dir: Option<PathBuf>,
}

impl AnalysisConfig {
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(APP_DIR).join(CONFIG_FILE_NAME))
    }

    /// Loads the user's config file, if there is one.
    pub fn from_local_file() -> Result<Option<Self>, LapscopeError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_path(&path).map(Some),
            _ => Ok(None),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, LapscopeError> {
        debug!("Loading config from {:?}", path);
        let file = std::fs::File::open(path).map_err(|e| LapscopeError::ConfigIO { source: e })?;
        serde_json::from_reader(file).map_err(|e| LapscopeError::ConfigSerialize { source: e })
    }

    pub fn save(&self) -> Result<(), LapscopeError> {
        let config_path = Self::default_path().ok_or(LapscopeError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), LapscopeError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LapscopeError::ConfigIO { source: e })?;
        }
        let file =
            std::fs::File::create(config_path).map_err(|e| LapscopeError::ConfigIO { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| LapscopeError::ConfigSerialize { source: e })
    }
}
