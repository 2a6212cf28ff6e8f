//! Per-image removal pipeline and batch file processing.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::detection::{detect_logos, LogoDetection, MatchRecord};
use crate::erasure;
use crate::error::{Error, Result};
use crate::ribbon::{locate_band, Band, BandStrategy, BrightnessBand, TemplateBand};
use crate::template::{to_grayscale, Template};

/// What the pipeline found and erased in one image.
#[derive(Debug, Clone, Default)]
pub struct ImageReport {
    /// Accepted logo matches across all scales.
    pub logo_matches: Vec<MatchRecord>,
    /// Number of pixels handed to the inpainter.
    pub mask_pixels: u64,
    /// Ribbon painted over, if any.
    pub band: Option<Band>,
}

impl ImageReport {
    /// Whether neither stage changed the image.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.mask_pixels == 0 && self.band.is_none()
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether nothing was found (the image was written unchanged).
    pub skipped: bool,
    /// Detection summary, present when the image was decoded.
    pub report: Option<ImageReport>,
    /// Human-readable status message.
    pub message: String,
}

/// The removal engine holding the templates and configuration.
///
/// Create once and reuse for many images; it is shared read-only, including
/// across threads during directory processing.
#[derive(Debug, Clone)]
pub struct RemovalEngine {
    logo: Template,
    ribbon: Option<Template>,
    config: DetectionConfig,
}

impl RemovalEngine {
    /// Create an engine from loaded templates.
    ///
    /// Without a ribbon template only the logo stage runs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` fails validation.
    pub fn new(logo: Template, ribbon: Option<Template>, config: DetectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            logo,
            ribbon,
            config,
        })
    }

    /// Create an engine by loading the template files.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if a template cannot be loaded, or
    /// [`Error::InvalidConfig`] if `config` fails validation.
    pub fn from_paths(logo: &Path, ribbon: Option<&Path>, config: DetectionConfig) -> Result<Self> {
        let logo = Template::open("logo", logo)?;
        let ribbon = ribbon.map(|p| Template::open("ribbon", p)).transpose()?;
        Self::new(logo, ribbon, config)
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Run the multi-scale logo detector without modifying the image.
    #[must_use]
    pub fn detect_logos(&self, image: &RgbImage) -> LogoDetection {
        detect_logos(&to_grayscale(image), &self.logo, &self.config)
    }

    /// Locate the ribbon without modifying the image.
    ///
    /// Always `None` when the engine has no ribbon template.
    #[must_use]
    pub fn locate_ribbon(&self, image: &RgbImage) -> Option<Band> {
        let ribbon = self.ribbon.as_ref()?;
        let primary = TemplateBand::new(ribbon);
        let strategies: [&dyn BandStrategy; 2] = [&primary, &BrightnessBand];
        locate_band(&to_grayscale(image), &self.config, &strategies)
    }

    /// Remove the logo and the ribbon from `image`.
    ///
    /// The logo stage inpaints every detected occurrence; the ribbon stage then
    /// runs on the result and paints the band with the fill colour. Either
    /// stage finding nothing leaves the image as it was for that stage.
    #[must_use]
    pub fn process(&self, mut image: RgbImage) -> (RgbImage, ImageReport) {
        let LogoDetection { mask, matches } = self.detect_logos(&image);
        let mask_pixels = mask.count();
        debug!("logo mask non-zero pixels: {mask_pixels}");
        if mask_pixels > 0 {
            erasure::inpaint(&mut image, &mask, self.config.inpaint_radius);
        }

        let band = self.locate_ribbon(&image);
        if let Some(band) = band {
            debug!("painting rows {} to {}", band.top, image.height().saturating_sub(1));
            erasure::fill_band(&mut image, band.top, self.config.fill_color);
        }

        let report = ImageReport {
            logo_matches: matches,
            mask_pixels,
            band,
        };
        (image, report)
    }

    /// Process a single image file: load, remove, save.
    ///
    /// Images with nothing to remove are still written (unchanged) and
    /// reported as skipped. Failures are reported in the result, never raised.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path) -> ProcessResult {
        info!("processing {}", input.display());
        match self.run_file(input, output) {
            Ok(report) => {
                let skipped = report.is_unchanged();
                let message = if skipped {
                    "No logo or ribbon found, copied unchanged".to_string()
                } else {
                    describe(&report)
                };
                ProcessResult {
                    path: input.to_path_buf(),
                    success: true,
                    skipped,
                    report: Some(report),
                    message,
                }
            }
            Err(e) => {
                warn!("{}: {e}", input.display());
                ProcessResult {
                    path: input.to_path_buf(),
                    success: false,
                    skipped: false,
                    report: None,
                    message: e.to_string(),
                }
            }
        }
    }

    fn run_file(&self, input: &Path, output: &Path) -> Result<ImageReport> {
        let decoded = image::open(input).map_err(|source| Error::InvalidImage {
            path: input.to_path_buf(),
            source,
        })?;

        let (cleaned, report) = self.process(decoded.to_rgb8());

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        save_image(&cleaned, output)?;
        debug!("saved cleaned image to {}", output.display());
        Ok(report)
    }

    /// Process all supported images in a directory.
    ///
    /// Each image is handled independently: one that fails to decode produces
    /// a failed [`ProcessResult`] and the rest of the batch continues. Uses
    /// parallel iteration when the `cli` feature is enabled (via rayon).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the input directory cannot be read or the
    /// output directory cannot be created, and [`Error::NoImages`] if the
    /// input directory holds no supported images.
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Result<Vec<ProcessResult>> {
        let mut inputs: Vec<PathBuf> = std::fs::read_dir(input_dir)?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
            .map(|e| e.path())
            .filter(|p| is_supported_image(p))
            .collect();
        inputs.sort();

        if inputs.is_empty() {
            return Err(Error::NoImages(input_dir.to_path_buf()));
        }
        std::fs::create_dir_all(output_dir)?;

        let process_one = |input_path: &PathBuf| {
            let output_path = match input_path.file_name() {
                Some(name) => output_dir.join(name),
                None => output_dir.to_path_buf(),
            };
            self.process_file(input_path, &output_path)
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            Ok(inputs.par_iter().map(process_one).collect())
        }

        #[cfg(not(feature = "cli"))]
        {
            Ok(inputs.iter().map(process_one).collect())
        }
    }
}

fn describe(report: &ImageReport) -> String {
    let mut parts = Vec::new();
    if report.mask_pixels > 0 {
        parts.push(format!(
            "{} logo match(es) inpainted",
            report.logo_matches.len()
        ));
    }
    if let Some(band) = report.band {
        parts.push(format!("ribbon removed from row {} ({:?})", band.top, band.source));
    }
    parts.join(", ")
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "tif" | "tiff" | "bmp"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::Tiff | ImageFormat::Bmp => {
            img.save_with_format(path, format)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"flyer.jpg"` becomes `"flyer_cleaned.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_cleaned.{ext}"))
}
