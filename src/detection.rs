//! Multi-scale logo detection.
//!
//! The logo template is resized along the configured scale ladder. For every
//! scale the full correlation surface is computed and peaks are pulled out one
//! at a time: accept the global maximum, mark its padded box in the [`Mask`],
//! suppress its unpadded box in the surface, repeat until the maximum drops
//! below the logo threshold. The mask accumulates across scales, so the ladder
//! order does not matter.

use image::{GrayImage, Luma};
use tracing::{debug, trace};

use crate::config::DetectionConfig;
use crate::matching::{match_template, Peak, ScoreSurface, SUPPRESSED};
use crate::template::Template;

/// Smallest template side (in pixels) worth correlating.
pub const MIN_TEMPLATE_SIDE: u32 = 5;

/// Mask value for pixels to be erased.
pub const MASK_ON: u8 = 255;

/// Binary mask of detected logo regions, same extent as the searched image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pixels: GrayImage,
}

impl Mask {
    /// An empty mask.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: GrayImage::new(width, height),
        }
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

    /// Set every pixel in the half-open box `[x1, x2) x [y1, y2)`, clamped to the mask.
    pub fn mark(&mut self, x1: u32, y1: u32, x2: u32, y2: u32) {
        let x2 = x2.min(self.width());
        let y2 = y2.min(self.height());
        for y in y1..y2 {
            for x in x1..x2 {
                self.pixels.put_pixel(x, y, Luma([MASK_ON]));
            }
        }
    }

    /// Whether `(x, y)` is marked. Out-of-bounds coordinates are not.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.pixels.get_pixel(x, y)[0] != 0
    }

    /// Number of marked pixels.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.pixels.as_raw().iter().filter(|&&v| v != 0).count() as u64
    }

    /// Whether nothing is marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.as_raw().iter().all(|&v| v == 0)
    }

    /// The mask as a grayscale image (0 or 255).
    #[must_use]
    pub fn as_image(&self) -> &GrayImage {
        &self.pixels
    }
}

/// One accepted logo occurrence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRecord {
    /// Top-left x of the (unpadded) match.
    pub x: u32,
    /// Top-left y of the (unpadded) match.
    pub y: u32,
    /// Width of the resized template.
    pub width: u32,
    /// Height of the resized template.
    pub height: u32,
    /// Correlation score of the match.
    pub score: f32,
    /// Scale factor that produced the match.
    pub scale: f32,
}

/// Result of running the logo detector over one image.
#[derive(Debug, Clone)]
pub struct LogoDetection {
    /// Union of all padded match boxes.
    pub mask: Mask,
    /// Every accepted match, in the order found.
    pub matches: Vec<MatchRecord>,
}

/// Template size at `scale`, truncated toward zero.
#[must_use]
pub fn scaled_size(width: u32, height: u32, scale: f32) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scale_side = |side: u32| (f64::from(side) * f64::from(scale)).floor().max(0.0) as u32;
    (scale_side(width), scale_side(height))
}

/// Pull peaks out of `surface` until the best remaining score is below `threshold`.
///
/// Scores equal to the threshold are accepted. Each accepted peak suppresses
/// the `width x height` box anchored at it, so the loop ends after at most
/// one iteration per surface cell.
pub fn extract_peaks(
    surface: &mut ScoreSurface,
    width: u32,
    height: u32,
    threshold: f32,
) -> Vec<Peak> {
    let mut peaks = Vec::new();
    while let Some(peak) = surface.peak() {
        let accepted = peak.score > SUPPRESSED && peak.score >= threshold;
        if !accepted {
            break;
        }
        surface.suppress(peak.x, peak.y, width, height);
        peaks.push(peak);
    }
    peaks
}

/// Find every occurrence of `template` in `gray` across the configured scales.
///
/// Scales whose resized template is smaller than [`MIN_TEMPLATE_SIDE`] or not
/// strictly smaller than the image are skipped.
#[must_use]
pub fn detect_logos(gray: &GrayImage, template: &Template, config: &DetectionConfig) -> LogoDetection {
    let (width, height) = gray.dimensions();
    let mut mask = Mask::new(width, height);
    let mut matches = Vec::new();

    for &scale in &config.scales {
        let (tw, th) = scaled_size(template.width(), template.height(), scale);
        if tw < MIN_TEMPLATE_SIDE || th < MIN_TEMPLATE_SIDE || tw >= width || th >= height {
            trace!("scale {scale}: {tw}x{th} template rejected for {width}x{height} image");
            continue;
        }

        let resized = template.resized(tw, th);
        let mut surface = match_template(gray, &resized);

        for peak in extract_peaks(&mut surface, tw, th, config.logo_threshold) {
            debug!(
                scale,
                x = peak.x,
                y = peak.y,
                score = peak.score,
                "{} match",
                template.name()
            );
            mask.mark(
                peak.x.saturating_sub(config.padding),
                peak.y.saturating_sub(config.padding),
                peak.x + tw + config.padding,
                peak.y + th + config.padding,
            );
            matches.push(MatchRecord {
                x: peak.x,
                y: peak.y,
                width: tw,
                height: th,
                score: peak.score,
                scale,
            });
        }
    }

    LogoDetection { mask, matches }
}
