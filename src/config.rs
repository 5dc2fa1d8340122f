use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::binning::{DEFAULT_BIN_WIDTH_MS, DEFAULT_OUTER_QUANTILES};
use crate::logging::LogConfig;
use crate::models::{BgBounds, TimePrefs};

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Glucose classification boundaries
    pub bounds: BgBounds,

    /// Time-of-day binning settings
    pub binning: BinningSettings,

    /// Timezone preferences resolved before normalization
    pub time: TimePrefs,

    /// Logging settings
    pub logging: LogConfig,
}

/// Time-of-day binning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinningSettings {
    /// Bin width in milliseconds; must divide the 24-hour cycle evenly
    pub bin_width_ms: i64,

    /// Outer quantile pair for the continuous whisker band
    pub outer_quantiles: [f64; 2],
}

impl Default for BinningSettings {
    fn default() -> Self {
        Self {
            bin_width_ms: DEFAULT_BIN_WIDTH_MS,
            outer_quantiles: DEFAULT_OUTER_QUANTILES,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bounds: BgBounds::default(),
            binning: BinningSettings::default(),
            time: TimePrefs::default(),
            logging: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize configuration")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Default configuration file location
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glucotrend")
            .join("config.toml")
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();
        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(_) => {
                tracing::debug!(path = %config_path.display(), "config file not found, using defaults");
                Self::default()
            }
        }
    }
}
