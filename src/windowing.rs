//! DICOM VOI windowing.
//!
//! Implements the linear window function of PS3.3 C.11.2.1.2 on
//! post-modality-LUT intensities. The floor comparison is inclusive and the
//! ceiling comparison is strict, so a value sitting exactly on
//! `c + w / 2` goes through the linear ramp (which evaluates to the ceiling).

use ndarray::{Array2, ArrayView2};
use serde::Deserialize;

use crate::error::ConfigError;

/// A validated window: finite center, width of at least 1 and an output
/// bit depth within `8..=32`. Deserializing goes through [`Window::new`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "WindowFields")]
pub struct Window {
    center: f64,
    width: f64,
    bit_depth: u32,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct WindowFields {
    center: f64,
    width: f64,
    bit_depth: u32,
}

impl Default for WindowFields {
    fn default() -> Self {
        let Window {
            center,
            width,
            bit_depth,
        } = Window::LUNG;
        Self {
            center,
            width,
            bit_depth,
        }
    }
}

impl TryFrom<WindowFields> for Window {
    type Error = ConfigError;

    fn try_from(fields: WindowFields) -> Result<Self, Self::Error> {
        Self::new(fields.center, fields.width, fields.bit_depth)
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::LUNG
    }
}

impl Window {
    /// Clinical lung window at 16 bit.
    pub const LUNG: Window = Window {
        center: -600.0,
        width: 1500.0,
        bit_depth: 16,
    };

    pub fn new(center: f64, width: f64, bit_depth: u32) -> Result<Self, ConfigError> {
        let window = Self {
            center,
            width,
            bit_depth,
        };
        window.validate()?;
        Ok(window)
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.center.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "window center must be finite, got {}",
                self.center
            )));
        }
        if !self.width.is_finite() || self.width < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "window width must be >= 1, got {}",
                self.width
            )));
        }
        if !(8..=32).contains(&self.bit_depth) {
            return Err(ConfigError::Invalid(format!(
                "window bit depth must be within 8..=32, got {}",
                self.bit_depth
            )));
        }
        Ok(())
    }

    /// Largest output value, `2^bit_depth - 1`.
    pub fn y_max(&self) -> f64 {
        ((1u64 << self.bit_depth) - 1) as f64
    }

    /// Maps a single intensity through the window.
    #[inline]
    pub fn map(&self, value: f64) -> f64 {
        let y_max = self.y_max();
        let c = self.center - 0.5;
        let w = self.width - 1.0;
        let half = w / 2.0;

        if value <= c - half {
            0.0
        } else if value > c + half {
            y_max
        } else {
            ((value - c) / w + 0.5) * y_max
        }
    }

    /// Windows `pixels` in place. The buffer is overwritten; callers that
    /// still need the raw intensities use [`Window::apply`] instead.
    pub fn apply_in_place(&self, pixels: &mut Array2<f32>) {
        pixels.par_mapv_inplace(|v| self.map(v as f64) as f32);
    }

    pub fn apply(&self, pixels: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut out = pixels.to_owned();
        self.apply_in_place(&mut out);
        out
    }

    /// Floor-divides a windowed buffer down to 8-bit range (by 256 for a
    /// 16-bit window).
    pub fn reduce_to_8bit(&self, pixels: &mut Array2<f32>) {
        let divisor = (1u64 << (self.bit_depth - 8)) as f64;
        pixels.par_mapv_inplace(|v| (v as f64 / divisor).floor() as f32);
    }
}
