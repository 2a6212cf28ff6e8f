//! Detection and erasure parameters.

use image::Rgb;

use crate::error::{Error, Result};

/// Scale ladder applied to the logo template by default.
pub const DEFAULT_SCALES: [f32; 8] = [0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 2.5, 3.0];

/// Parameters shared by every detector and erasure call.
///
/// Build once, validate with [`DetectionConfig::validate`], then pass by
/// reference. The engine never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Minimum correlation score accepted as a logo occurrence.
    pub logo_threshold: f32,
    /// Minimum correlation score accepted as the ribbon.
    pub ribbon_threshold: f32,
    /// Resize factors applied to the logo template.
    pub scales: Vec<f32>,
    /// Pixels added around each logo match before inpainting.
    pub padding: u32,
    /// Neighbourhood radius used by the inpainting fill.
    pub inpaint_radius: u32,
    /// Rows whose mean gray level is below this count as ribbon in the fallback.
    pub fallback_darkness: f32,
    /// Number of bottom rows inspected by the fallback.
    pub fallback_window: u32,
    /// Colour painted over a detected ribbon.
    pub fill_color: Rgb<u8>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            logo_threshold: 0.7,
            ribbon_threshold: 0.6,
            scales: DEFAULT_SCALES.to_vec(),
            padding: 4,
            inpaint_radius: 5,
            fallback_darkness: 200.0,
            fallback_window: 200,
            fill_color: Rgb([255, 255, 255]),
        }
    }
}

impl DetectionConfig {
    /// Check that the configuration can drive the detectors.
    ///
    /// Thresholds may lie outside `[-1, 1]` (a ribbon threshold above 1.0
    /// disables the template strategy) but must be finite.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for non-finite thresholds, an empty
    /// scale ladder, or a non-positive scale.
    pub fn validate(&self) -> Result<()> {
        if !self.logo_threshold.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "logo threshold must be finite, got {}",
                self.logo_threshold
            )));
        }
        if !self.ribbon_threshold.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "ribbon threshold must be finite, got {}",
                self.ribbon_threshold
            )));
        }
        if self.scales.is_empty() {
            return Err(Error::InvalidConfig("scale ladder is empty".to_string()));
        }
        if let Some(bad) = self.scales.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(Error::InvalidConfig(format!(
                "scales must be positive, got {bad}"
            )));
        }
        if !self.fallback_darkness.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "fallback darkness must be finite, got {}",
                self.fallback_darkness
            )));
        }
        Ok(())
    }
}
