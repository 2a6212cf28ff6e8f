//! Grayscale templates and the luma conversion shared by every detector.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::error::{Error, Result};

/// Convert an RGB image to 8-bit grayscale.
///
/// Uses luminance formula: `0.299*R + 0.587*G + 0.114*B`, rounded to nearest.
#[must_use]
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y);
        let lum = 0.299 * f32::from(px[0]) + 0.587 * f32::from(px[1]) + 0.114 * f32::from(px[2]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = lum.round().clamp(0.0, 255.0) as u8;
        image::Luma([value])
    })
}

/// An immutable grayscale template (logo or ribbon).
///
/// Loaded once and shared read-only by every scale pass and every image.
#[derive(Debug, Clone)]
pub struct Template {
    name: &'static str,
    pixels: GrayImage,
}

impl Template {
    /// Wrap an already grayscale buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if the buffer has zero area.
    pub fn from_gray(name: &'static str, pixels: GrayImage) -> Result<Self> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(Error::InvalidTemplate {
                name,
                reason: format!("zero area ({}x{})", pixels.width(), pixels.height()),
            });
        }
        Ok(Self { name, pixels })
    }

    /// Build a template from a decoded image of any colour type.
    ///
    /// An alpha channel, if present, is discarded before the luma conversion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if the image has zero area.
    pub fn from_image(name: &'static str, image: &DynamicImage) -> Result<Self> {
        Self::from_gray(name, to_grayscale(&image.to_rgb8()))
    }

    /// Decode a template from encoded bytes (PNG, JPEG, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if decoding fails or the image is empty.
    pub fn from_memory(name: &'static str, bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes).map_err(|e| Error::InvalidTemplate {
            name,
            reason: e.to_string(),
        })?;
        Self::from_image(name, &decoded)
    }

    /// Load a template from a file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if the file cannot be read or decoded.
    pub fn open(name: &'static str, path: &Path) -> Result<Self> {
        let decoded = image::open(path).map_err(|e| Error::InvalidTemplate {
            name,
            reason: format!("{}: {e}", path.display()),
        })?;
        Self::from_image(name, &decoded)
    }

    /// Template label used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// The grayscale pixels.
    #[must_use]
    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    /// Resize to exactly `width x height` with linear interpolation.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> GrayImage {
        imageops::resize(&self.pixels, width, height, FilterType::Triangle)
    }
}
