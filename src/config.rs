use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::attention::AttentionGrid;
use crate::decoder::DecodeOptions;
use crate::enums::SortBy;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OverlayConfig {
    pub gain: f32,
    pub frame_delay_ms: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            gain: 3.0,
            frame_delay_ms: 100,
        }
    }
}

/// Everything a pipeline run can be tuned with. Every section is optional.
///
/// ```toml
/// sort_by = "image-position-patient"
///
/// [decode.window]
/// center = -600.0
/// width = 1500.0
/// bit_depth = 16
///
/// [decode.channel_filter]
/// expected_channels = 3
///
/// [attention]
/// depth = 25
///
/// [overlay]
/// gain = 3.0
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub decode: DecodeOptions,
    pub sort_by: SortBy,
    pub attention: AttentionGrid,
    pub overlay: OverlayConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.attention.validate()?;
        if !self.overlay.gain.is_finite() || self.overlay.gain < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "overlay gain must be finite and >= 0, got {}",
                self.overlay.gain
            )));
        }
        if self.decode.channel_filter.expected_channels == Some(0) {
            return Err(ConfigError::Invalid(
                "expected_channels must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_toml_str(config: &str) -> Result<Self, ConfigError> {
        let parsed: PipelineConfig = toml::from_str(config)?;
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&data)
    }
}
