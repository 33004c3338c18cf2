//! Capture configuration.
//!
//! Geometry and buffer-pool settings are fixed for the lifetime of a
//! capture session; the driver may enlarge what we ask for but never the
//! other way around.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the capture device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device path, e.g. "/dev/video0". The value "mock:" selects the
    /// synthetic backend.
    pub device_path: String,
    /// Frame width in pixels (must be even: packed 4:2:2 chroma pairs).
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Number of memory-mapped buffers to request from the driver.
    pub buffer_count: u32,
    /// Bounded wait for one frame before the device is considered wedged.
    pub fetch_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_path: "/dev/video0".to_string(),
            width: 320,
            height: 240,
            buffer_count: 4,
            fetch_timeout_ms: 2000, // 2s
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Returns the fetch timeout as a `Duration`.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.buffer_count < 2 {
            return Err(ConfigError::InvalidBufferCount);
        }
        if self.fetch_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid frame dimensions (width must be even and nonzero)")]
    InvalidDimensions,
    #[error("invalid buffer count (need at least 2)")]
    InvalidBufferCount,
    #[error("invalid fetch timeout")]
    InvalidTimeout,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub detect: crate::detect::DetectConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output and reporting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Emit a per-frame render log line every Nth frame.
    pub log_every_frames: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_every_frames: 30,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_odd_width_invalid() {
        let mut config = CaptureConfig::default();
        config.width = 321;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_single_buffer_invalid() {
        let mut config = CaptureConfig::default();
        config.buffer_count = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidBufferCount)
        ));
    }

    #[test]
    fn test_file_config_roundtrip() {
        let toml_str = r#"
            [capture]
            device_path = "mock:"
            width = 64
            height = 48
            buffer_count = 2
            fetch_timeout_ms = 100
        "#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.capture.device_path, "mock:");
        assert_eq!(config.capture.width, 64);
        // Sections not present fall back to defaults.
        assert_eq!(config.output.log_every_frames, 30);
    }
}
