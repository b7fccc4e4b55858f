//! Configuration module for the TOF codec tools
//!
//! Loaded from a TOML file with one table per stage. Every table and every
//! key is optional; missing values take the defaults below.
//!
//! # Example
//! ```ignore
//! let config = Config::load("tof.toml")?;
//! let decoder = RawDecoder::new(config.decoder.clone());
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::compressed::EncoderConfig;
use crate::emulator::EmulatorConfig;
use crate::raw::format::constants::HIT_TIME_MASK;
use crate::raw::RawDecoderConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw decoder settings
    pub decoder: RawDecoderConfig,
    /// Compressed encoder settings
    pub encoder: EncoderConfig,
    /// Synthetic data generator settings
    pub emulator: EmulatorConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML file, or defaults if the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let pages = [
            ("decoder.page_size", self.decoder.page_size),
            ("emulator.page_size", self.emulator.page_size),
        ];
        let page_range = crate::raw::RDH_SIZE + 16..=crate::raw::MAX_PAGE_SIZE;
        for (field, page_size) in pages {
            if !page_range.contains(&page_size) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!(
                        "must be within {}..={} bytes",
                        page_range.start(),
                        page_range.end()
                    ),
                });
            }
        }
        if self.encoder.buffer_size < 8 {
            return Err(ConfigError::InvalidValue {
                field: "encoder.buffer_size",
                reason: "must hold at least a crate header and trailer".to_string(),
            });
        }
        if self.emulator.min_width > self.emulator.max_width {
            return Err(ConfigError::InvalidValue {
                field: "emulator.min_width",
                reason: format!("must not exceed max_width ({})", self.emulator.max_width),
            });
        }
        if self.emulator.max_width > HIT_TIME_MASK {
            return Err(ConfigError::InvalidValue {
                field: "emulator.max_width",
                reason: format!("must fit the TDC time range (at most {})", HIT_TIME_MASK),
            });
        }
        if !(0.0..=1.0).contains(&self.emulator.bad_status_probability) {
            return Err(ConfigError::InvalidValue {
                field: "emulator.bad_status_probability",
                reason: "must be within 0..=1".to_string(),
            });
        }
        Ok(())
    }
}
