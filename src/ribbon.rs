//! Bottom ribbon detection.
//!
//! The ribbon spans the full image width near the bottom. Detection runs an
//! ordered chain of [`BandStrategy`] implementations and stops at the first
//! one that reports a band:
//!
//! 1. [`TemplateBand`]: the ribbon template resized to the image width and
//!    correlated once against the lower half of the image.
//! 2. [`BrightnessBand`]: a scan for the topmost contiguous run of dark rows
//!    at the bottom of the image.

use image::{imageops, GrayImage};
use tracing::debug;

use crate::config::DetectionConfig;
use crate::detection::MIN_TEMPLATE_SIDE;
use crate::matching::match_template;
use crate::template::Template;

/// Which strategy located a band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandSource {
    /// Width-locked template match.
    Template,
    /// Mean row brightness scan.
    Brightness,
}

/// A detected ribbon: every row from `top` to the bottom of the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// First row of the band.
    pub top: u32,
    /// Strategy that found it.
    pub source: BandSource,
    /// Correlation score for [`BandSource::Template`], mean gray level of the
    /// top row for [`BandSource::Brightness`].
    pub score: f32,
}

/// One way of locating the ribbon.
pub trait BandStrategy {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// Locate the band in `gray`, or `None` when this strategy finds nothing.
    fn locate(&self, gray: &GrayImage, config: &DetectionConfig) -> Option<Band>;
}

/// Run `strategies` in order and return the first band found.
#[must_use]
pub fn locate_band(
    gray: &GrayImage,
    config: &DetectionConfig,
    strategies: &[&dyn BandStrategy],
) -> Option<Band> {
    strategies.iter().find_map(|strategy| {
        let band = strategy.locate(gray, config);
        if band.is_none() {
            debug!("{}: no band", strategy.name());
        }
        band
    })
}

/// Width-locked template match over the lower half of the image.
#[derive(Debug, Clone, Copy)]
pub struct TemplateBand<'a> {
    template: &'a Template,
}

impl<'a> TemplateBand<'a> {
    /// Match against `template`.
    #[must_use]
    pub fn new(template: &'a Template) -> Self {
        Self { template }
    }

    /// Template height after scaling its width to `image_width`, at least
    /// [`MIN_TEMPLATE_SIDE`].
    #[must_use]
    pub fn scaled_height(&self, image_width: u32) -> u32 {
        let scale = f64::from(image_width) / f64::from(self.template.width());
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let height = (f64::from(self.template.height()) * scale).round() as u32;
        height.max(MIN_TEMPLATE_SIDE)
    }
}

impl BandStrategy for TemplateBand<'_> {
    fn name(&self) -> &'static str {
        "ribbon template"
    }

    fn locate(&self, gray: &GrayImage, config: &DetectionConfig) -> Option<Band> {
        let (width, height) = gray.dimensions();
        if width < MIN_TEMPLATE_SIDE {
            return None;
        }

        let search_top = height / 2;
        let search_height = height - search_top;
        let band_height = self.scaled_height(width);
        if band_height > search_height {
            debug!("ribbon template {width}x{band_height} taller than search region {search_height}");
            return None;
        }

        let resized = self.template.resized(width, band_height);
        let region = imageops::crop_imm(gray, 0, search_top, width, search_height).to_image();
        let peak = match_template(&region, &resized).peak()?;
        debug!("ribbon match value: {:.3} at row {}", peak.score, search_top + peak.y);

        (peak.score >= config.ribbon_threshold).then_some(Band {
            top: search_top + peak.y,
            source: BandSource::Template,
            score: peak.score,
        })
    }
}

/// Dark-row scan over the bottom of the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrightnessBand;

impl BandStrategy for BrightnessBand {
    fn name(&self) -> &'static str {
        "brightness fallback"
    }

    fn locate(&self, gray: &GrayImage, config: &DetectionConfig) -> Option<Band> {
        let (width, height) = gray.dimensions();
        let window = config.fallback_window.min(height);
        if width == 0 || window == 0 {
            return None;
        }

        let first = height - window;
        let means: Vec<f32> = (first..height).map(|y| row_mean(gray, y)).collect();
        let is_dark = |mean: f32| mean < config.fallback_darkness;

        let start = means.iter().rposition(|&m| is_dark(m))?;
        let top = means[..=start]
            .iter()
            .rposition(|&m| !is_dark(m))
            .map_or(0, |bright| bright + 1);

        #[allow(clippy::cast_possible_truncation)]
        let top_row = first + top as u32;
        debug!("dark band from row {top_row} to {}", height - 1);
        Some(Band {
            top: top_row,
            source: BandSource::Brightness,
            score: means[top],
        })
    }
}

/// Mean gray level of row `y`.
#[allow(clippy::cast_precision_loss)]
fn row_mean(gray: &GrayImage, y: u32) -> f32 {
    let width = gray.width() as usize;
    let start = y as usize * width;
    let total: u64 = gray.as_raw()[start..start + width]
        .iter()
        .map(|&v| u64::from(v))
        .sum();
    total as f32 / width as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Dark ribbon with a light block of "text" in the middle.
    fn ribbon_template() -> Template {
        let pixels = GrayImage::from_fn(40, 10, |x, y| {
            if (12..28).contains(&x) && (3..7).contains(&y) {
                Luma([150])
            } else {
                Luma([25])
            }
        });
        Template::from_gray("ribbon", pixels).unwrap()
    }

    /// White page with the resized ribbon pasted at `top`.
    fn page_with_ribbon(width: u32, height: u32, top: u32, template: &Template) -> GrayImage {
        let strategy = TemplateBand::new(template);
        let band = template.resized(width, strategy.scaled_height(width));
        let mut page = GrayImage::from_pixel(width, height, Luma([255]));
        imageops::replace(&mut page, &band, 0, i64::from(top));
        page
    }

    #[test]
    fn scaled_height_keeps_aspect_and_minimum() {
        let template = ribbon_template();
        assert_eq!(TemplateBand::new(&template).scaled_height(80), 20);
        assert_eq!(TemplateBand::new(&template).scaled_height(10), 5);
    }

    #[test]
    fn template_strategy_finds_band_top() {
        let template = ribbon_template();
        let page = page_with_ribbon(80, 120, 100, &template);
        let band = TemplateBand::new(&template)
            .locate(&page, &DetectionConfig::default())
            .unwrap();
        assert_eq!(band.top, 100);
        assert_eq!(band.source, BandSource::Template);
        assert!(band.score > 0.99);
    }

    #[test]
    fn template_strategy_respects_threshold() {
        let template = ribbon_template();
        let page = page_with_ribbon(80, 120, 100, &template);
        let cfg = DetectionConfig {
            ribbon_threshold: 1.5,
            ..DetectionConfig::default()
        };
        assert!(TemplateBand::new(&template).locate(&page, &cfg).is_none());
    }

    #[test]
    fn template_strategy_rejects_tall_template() {
        let template = ribbon_template();
        // 80 wide -> 20 rows, but only 15 rows in the lower half.
        let page = GrayImage::from_pixel(80, 30, Luma([255]));
        assert!(TemplateBand::new(&template)
            .locate(&page, &DetectionConfig::default())
            .is_none());
    }

    #[test]
    fn brightness_strategy_finds_topmost_dark_row() {
        let mut page = GrayImage::from_pixel(50, 120, Luma([250]));
        for y in 90..120 {
            for x in 0..50 {
                page.put_pixel(x, y, Luma([30]));
            }
        }
        let band = BrightnessBand.locate(&page, &DetectionConfig::default()).unwrap();
        assert_eq!(band.top, 90);
        assert_eq!(band.source, BandSource::Brightness);
    }

    #[test]
    fn brightness_strategy_starts_from_lowest_dark_run() {
        let mut page = GrayImage::from_pixel(20, 100, Luma([255]));
        // Upper dark run 40..50 separated by bright rows from lower run 70..95.
        for y in (40..50).chain(70..95) {
            for x in 0..20 {
                page.put_pixel(x, y, Luma([10]));
            }
        }
        let band = BrightnessBand.locate(&page, &DetectionConfig::default()).unwrap();
        assert_eq!(band.top, 70);
    }

    #[test]
    fn brightness_strategy_only_inspects_window() {
        let mut page = GrayImage::from_pixel(20, 300, Luma([255]));
        for y in 0..50 {
            for x in 0..20 {
                page.put_pixel(x, y, Luma([0]));
            }
        }
        assert!(BrightnessBand.locate(&page, &DetectionConfig::default()).is_none());

        // A dark run touching the window top reports the window's first row.
        for y in 60..300 {
            for x in 0..20 {
                page.put_pixel(x, y, Luma([0]));
            }
        }
        let band = BrightnessBand.locate(&page, &DetectionConfig::default()).unwrap();
        assert_eq!(band.top, 100);
    }

    #[test]
    fn brightness_threshold_is_strict() {
        let page = GrayImage::from_pixel(10, 40, Luma([200]));
        assert!(BrightnessBand.locate(&page, &DetectionConfig::default()).is_none());
    }

    #[test]
    fn chain_falls_back_when_template_fails() {
        let template = ribbon_template();
        let page = page_with_ribbon(80, 120, 100, &template);
        let cfg = DetectionConfig {
            ribbon_threshold: 1.5,
            ..DetectionConfig::default()
        };
        let primary = TemplateBand::new(&template);
        let band = locate_band(&page, &cfg, &[&primary, &BrightnessBand]).unwrap();
        assert_eq!(band.source, BandSource::Brightness);
        assert_eq!(band.top, 100);

        let band = locate_band(&page, &DetectionConfig::default(), &[&primary, &BrightnessBand])
            .unwrap();
        assert_eq!(band.source, BandSource::Template);
    }

    #[test]
    fn chain_reports_nothing_on_blank_page() {
        let template = ribbon_template();
        let page = GrayImage::from_pixel(80, 120, Luma([255]));
        let primary = TemplateBand::new(&template);
        assert!(locate_band(&page, &DetectionConfig::default(), &[&primary, &BrightnessBand]).is_none());
    }
}
