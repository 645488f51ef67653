//! Viewer configuration
//!
//! Loaded from an optional JSON file; every field has a default so partial
//! files are accepted. Command-line flags override what the file sets.

use crate::{Result, ViewerError};
use attnscope_cache::{CacheConfig, HttpConfig};
use attnscope_core::{AggMode, Direction, HeadSelection, Palette};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Initial view settings for a new session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewDefaults {
    pub head: HeadSelection,
    pub agg: AggMode,
    pub direction: Direction,
    pub palette: Palette,
    /// Overlay opacity in `[0, 1]`
    pub opacity: f32,
}

impl Default for ViewDefaults {
    fn default() -> Self {
        Self {
            head: HeadSelection::Aggregated,
            agg: AggMode::Mean,
            direction: Direction::Source,
            palette: Palette::Viridis,
            opacity: 0.7,
        }
    }
}

/// Top-level viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Directory holding datasets
    pub data_root: PathBuf,
    /// Serve layers over HTTP from this URL instead of `data_root`
    pub base_url: Option<String>,
    pub cache: CacheConfig,
    pub http: HttpConfig,
    pub defaults: ViewDefaults,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            base_url: None,
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
            defaults: ViewDefaults::default(),
        }
    }
}

impl ViewerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ViewerError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| ViewerError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: ViewerConfig =
            serde_json::from_str(text).map_err(|e| ViewerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(ViewerError::Config("cache.capacity must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.defaults.opacity) {
            return Err(ViewerError::Config(format!(
                "defaults.opacity {} outside [0, 1]",
                self.defaults.opacity
            )));
        }
        Ok(())
    }

    /// Set data root
    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = root.into();
        self
    }

    /// Set HTTP base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set cache configuration
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}
