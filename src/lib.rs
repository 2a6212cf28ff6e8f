//! Find and erase a known logo and bottom ribbon from flyer images.
//!
//! The logo is located with multi-scale normalized cross-correlation and
//! removed by fast-marching inpainting. The full-width ribbon at the bottom
//! of the page is located with a width-locked template match (falling back
//! to a dark-row scan) and painted over with a solid colour.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use flyer_mark_removal::{DetectionConfig, RemovalEngine};
//!
//! let engine = RemovalEngine::from_paths(
//!     Path::new("logo.png"),
//!     Some(Path::new("ribbon.png")),
//!     DetectionConfig::default(),
//! )
//! .expect("failed to load templates");
//! let img = image::open("flyer.jpg").unwrap().to_rgb8();
//! let (cleaned, report) = engine.process(img);
//! println!("{} logo match(es), ribbon: {:?}", report.logo_matches.len(), report.band);
//! cleaned.save("flyer_cleaned.jpg").unwrap();
//! ```
//!
//! # Detection only
//!
//! ```no_run
//! use flyer_mark_removal::{DetectionConfig, RemovalEngine, Template};
//!
//! let logo = Template::open("logo", "logo.png".as_ref()).unwrap();
//! let engine = RemovalEngine::new(logo, None, DetectionConfig::default()).unwrap();
//! let img = image::open("flyer.jpg").unwrap().to_rgb8();
//! let detection = engine.detect_logos(&img);
//! println!("mask covers {} pixels", detection.mask.count());
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod detection;
mod engine;
pub mod erasure;
pub mod error;
pub mod matching;
pub mod ribbon;
pub mod template;

pub use config::DetectionConfig;
pub use detection::{LogoDetection, Mask, MatchRecord};
pub use engine::{
    default_output_path, is_supported_image, save_image, ImageReport, ProcessResult,
    RemovalEngine,
};
pub use error::{Error, Result};
pub use ribbon::{Band, BandSource};
pub use template::Template;
