//! Error types for the flyer-mark-removal crate.

use std::path::PathBuf;

/// Errors that can occur while loading templates or processing images.
///
/// Geometry that a scale cannot satisfy and images without any detection are
/// not errors: those paths return empty results instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A template could not be decoded or has zero area.
    #[error("invalid {name} template: {reason}")]
    InvalidTemplate {
        /// Which template failed (`"logo"` or `"ribbon"`).
        name: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// A source image could not be decoded.
    #[error("could not read image {}: {source}", path.display())]
    InvalidImage {
        /// Path of the offending image.
        path: PathBuf,
        /// Underlying decoder error.
        source: image::ImageError,
    },

    /// The detection configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A directory contained no supported images.
    #[error("no images found in directory {}", .0.display())]
    NoImages(PathBuf),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The output image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred while encoding or saving an image.
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
