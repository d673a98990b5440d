//! Engine configuration.
//!
//! Defaults are embedded from `config/default.toml` at compile time. A
//! deployment can point at its own TOML file, and the API base URL and
//! widget key can be overridden from the environment.

use std::path::Path;

use complaint_map_complaint_models::LatLng;
use serde::Deserialize;
use thiserror::Error;

use crate::palette::{DensityPalette, DensityStyle, DensityTier};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Environment variable overriding [`MapConfig::api_base_url`].
pub const API_URL_ENV: &str = "COMPLAINT_MAP_API_URL";

/// Environment variable providing [`MapConfig::widget_key`].
pub const WIDGET_KEY_ENV: &str = "COMPLAINT_MAP_WIDGET_KEY";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The config file is not valid TOML for [`MapConfig`].
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The values are inconsistent.
    #[error("Invalid configuration: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Marker clustering settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Level at and above which nearby markers collapse into badges.
    pub min_level: u8,
    /// Place badges at the average of their markers instead of the first.
    #[serde(default = "default_true")]
    pub average_center: bool,
}

/// Side panel settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SidePanelConfig {
    /// Items per list page.
    pub page_size: usize,
}

/// Density polygon color table.
#[derive(Debug, Clone, Deserialize)]
pub struct DensityConfig {
    /// Opacity cap.
    pub max_opacity: f64,
    /// Style for zero-count regions.
    pub empty: DensityStyle,
    /// Tiers ordered by ascending `min_count`.
    pub tiers: Vec<DensityTier>,
}

/// Full engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MapConfig {
    /// Base URL of the complaint API.
    pub api_base_url: String,
    /// Map widget credential. `None` means the map cannot be shown.
    #[serde(default)]
    pub widget_key: Option<String>,
    /// Initial map center.
    pub initial_center: LatLng,
    /// Initial zoom level.
    pub initial_level: u8,
    /// Clustering settings.
    pub cluster: ClusterConfig,
    /// Side panel settings.
    pub side_panel: SidePanelConfig,
    /// Density color table.
    pub density: DensityConfig,
}

const fn default_true() -> bool {
    true
}

impl MapConfig {
    /// Parses the embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the embedded TOML is malformed.
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::parse(DEFAULT_CONFIG)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or inconsistent.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from `path`, or the embedded default when
    /// `path` is `None`, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                log::info!("Loading map config from {}", path.display());
                Self::parse(&std::fs::read_to_string(path)?)?
            }
            None => Self::embedded()?,
        };
        Ok(config.with_env_overrides())
    }

    /// Applies `COMPLAINT_MAP_API_URL` and `COMPLAINT_MAP_WIDGET_KEY`.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            self.api_base_url = url;
        }
        if let Ok(key) = std::env::var(WIDGET_KEY_ENV) {
            self.widget_key = Some(key);
        }
        self
    }

    /// Builds the validated density palette.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the density table is inconsistent.
    pub fn density_palette(&self) -> Result<DensityPalette, ConfigError> {
        DensityPalette::new(
            self.density.tiers.clone(),
            self.density.empty.clone(),
            self.density.max_opacity,
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_center.is_valid() {
            return Err(ConfigError::invalid("initial_center is not a valid coordinate"));
        }
        if self.side_panel.page_size == 0 {
            return Err(ConfigError::invalid("side_panel.page_size must be positive"));
        }
        self.density_palette()?;
        Ok(())
    }
}
