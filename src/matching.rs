//! Normalized cross-correlation template matching.
//!
//! Each cell of a [`ScoreSurface`] holds the mean-normalized correlation
//! coefficient between the template and the image window anchored at that
//! cell's top-left corner:
//!
//! `score = sum(T' * I') / sqrt(sum(T'^2) * sum(I'^2))`
//!
//! Window sums come from integral images. The numerator is computed directly
//! for small workloads and through an FFT cross-correlation otherwise.

use image::GrayImage;
use rustfft::{num_complex::Complex, FftPlanner};

/// Value written into suppressed cells; compares below every finite threshold.
pub const SUPPRESSED: f32 = f32::NEG_INFINITY;

/// Above this many multiply-adds the numerator is computed through the FFT.
const DIRECT_WORK_LIMIT: u64 = 1 << 24;

/// Best cell of a score surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Column of the peak (template top-left x).
    pub x: u32,
    /// Row of the peak (template top-left y).
    pub y: u32,
    /// Correlation score at the peak.
    pub score: f32,
}

/// Correlation scores for every template placement inside a search image.
#[derive(Debug, Clone)]
pub struct ScoreSurface {
    width: u32,
    height: u32,
    scores: Vec<f32>,
}

impl ScoreSurface {
    /// Number of placements per row (`image width - template width + 1`).
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Number of placement rows (`image height - template height + 1`).
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether the template did not fit anywhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Score at placement `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside the surface.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        assert!(x < self.width && y < self.height, "({x}, {y}) outside surface");
        self.scores[(y * self.width + x) as usize]
    }

    /// Global maximum, first in row-major order on ties.
    ///
    /// Returns `None` for an empty surface.
    #[must_use]
    pub fn peak(&self) -> Option<Peak> {
        let mut best: Option<Peak> = None;
        for y in 0..self.height {
            for x in 0..self.width {
                let score = self.scores[(y * self.width + x) as usize];
                match best {
                    Some(b) if score <= b.score => {}
                    _ => best = Some(Peak { x, y, score }),
                }
            }
        }
        best
    }

    /// Overwrite the `w x h` box at `(x, y)` with [`SUPPRESSED`].
    ///
    /// The box is clamped to the surface.
    pub fn suppress(&mut self, x: u32, y: u32, w: u32, h: u32) {
        let x2 = x.saturating_add(w).min(self.width);
        let y2 = y.saturating_add(h).min(self.height);
        for row in y.min(y2)..y2 {
            let start = (row * self.width + x.min(x2)) as usize;
            let end = (row * self.width + x2) as usize;
            self.scores[start..end].fill(SUPPRESSED);
        }
    }
}

/// Summed-area tables of pixel values and squared pixel values.
struct IntegralImages {
    stride: usize,
    sum: Vec<u64>,
    squared: Vec<u64>,
}

impl IntegralImages {
    fn new(image: &GrayImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let stride = width + 1;
        let mut sum = vec![0u64; stride * (height + 1)];
        let mut squared = vec![0u64; stride * (height + 1)];
        let raw = image.as_raw();

        for y in 0..height {
            let mut row_sum = 0u64;
            let mut row_squared = 0u64;
            for x in 0..width {
                let v = u64::from(raw[y * width + x]);
                row_sum += v;
                row_squared += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                squared[(y + 1) * stride + x + 1] = squared[y * stride + x + 1] + row_squared;
            }
        }

        Self {
            stride,
            sum,
            squared,
        }
    }

    /// `(sum, sum of squares)` over the `w x h` window at `(x, y)`.
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (u64, u64) {
        let at = |table: &[u64], xx: usize, yy: usize| table[yy * self.stride + xx];
        let area = |table: &[u64]| {
            at(table, x + w, y + h) + at(table, x, y) - at(table, x + w, y) - at(table, x, y + h)
        };
        (area(&self.sum), area(&self.squared))
    }
}

/// Compute the normalized cross-correlation surface of `template` over `image`.
///
/// The template must not be larger than the image in either dimension; if it
/// is, the surface is empty. Flat windows and flat templates score 0. Inputs
/// are not modified.
#[must_use]
pub fn match_template(image: &GrayImage, template: &GrayImage) -> ScoreSurface {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return ScoreSurface {
            width: 0,
            height: 0,
            scores: Vec::new(),
        };
    }

    let cw = iw - tw + 1;
    let ch = ih - th + 1;
    let cells = cw as usize * ch as usize;
    let n = u64::from(tw) * u64::from(th);

    #[allow(clippy::cast_precision_loss)]
    let mean = template.as_raw().iter().map(|&v| u64::from(v)).sum::<u64>() as f64 / n as f64;
    #[allow(clippy::cast_possible_truncation)]
    let zero_mean: Vec<f32> = template
        .as_raw()
        .iter()
        .map(|&v| (f64::from(v) - mean) as f32)
        .collect();
    let template_norm: f64 = zero_mean.iter().map(|&v| f64::from(v) * f64::from(v)).sum();

    if template_norm < 1e-9 {
        return ScoreSurface {
            width: cw,
            height: ch,
            scores: vec![0.0; cells],
        };
    }

    let numerators = if cells as u64 * n <= DIRECT_WORK_LIMIT {
        correlate_direct(image, &zero_mean, tw, th)
    } else {
        correlate_fft(image, &zero_mean, tw, th)
    };

    let integrals = IntegralImages::new(image);
    let mut scores = Vec::with_capacity(cells);
    for y in 0..ch as usize {
        for x in 0..cw as usize {
            let (s, sq) = integrals.window(x, y, tw as usize, th as usize);
            // n * sum(I'^2), exact in integers
            let spread = u128::from(n) * u128::from(sq) - u128::from(s) * u128::from(s);
            if spread == 0 {
                scores.push(0.0);
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let window_norm = spread as f64 / n as f64;
            let denom = (window_norm * template_norm).sqrt();
            let num = numerators[y * cw as usize + x];
            #[allow(clippy::cast_possible_truncation)]
            let score = (num / denom).clamp(-1.0, 1.0) as f32;
            scores.push(score);
        }
    }

    ScoreSurface {
        width: cw,
        height: ch,
        scores,
    }
}

/// `sum(T' * I)` for every placement, by direct summation.
fn correlate_direct(image: &GrayImage, zero_mean: &[f32], tw: u32, th: u32) -> Vec<f64> {
    let (iw, ih) = image.dimensions();
    let (cw, ch) = ((iw - tw + 1) as usize, (ih - th + 1) as usize);
    let (iw, tw, th) = (iw as usize, tw as usize, th as usize);
    let raw = image.as_raw();

    let mut out = Vec::with_capacity(cw * ch);
    for y in 0..ch {
        for x in 0..cw {
            let mut acc = 0.0_f64;
            for j in 0..th {
                let img_row = &raw[(y + j) * iw + x..(y + j) * iw + x + tw];
                let tpl_row = &zero_mean[j * tw..(j + 1) * tw];
                let row: f32 = img_row
                    .iter()
                    .zip(tpl_row)
                    .map(|(&p, &t)| f32::from(p) * t)
                    .sum();
                acc += f64::from(row);
            }
            out.push(acc);
        }
    }
    out
}

/// `sum(T' * I)` for every placement, via a 1-D FFT over the row-major layout.
///
/// The template is laid out with the image's row stride, so a shift of
/// `y * width + x` in the flattened buffers is the placement `(x, y)`. The
/// buffer is padded past `width * height`, which keeps valid placements free
/// of circular wrap-around.
fn correlate_fft(image: &GrayImage, zero_mean: &[f32], tw: u32, th: u32) -> Vec<f64> {
    let (iw, ih) = image.dimensions();
    let (cw, ch) = ((iw - tw + 1) as usize, (ih - th + 1) as usize);
    let (iw, ih, tw, th) = (iw as usize, ih as usize, tw as usize, th as usize);
    let len = (iw * ih).next_power_of_two();

    let mut image_freq: Vec<Complex<f32>> = image
        .as_raw()
        .iter()
        .map(|&v| Complex::new(f32::from(v), 0.0))
        .collect();
    image_freq.resize(len, Complex::new(0.0, 0.0));

    let mut template_freq = vec![Complex::new(0.0, 0.0); len];
    for j in 0..th {
        for i in 0..tw {
            template_freq[j * iw + i] = Complex::new(zero_mean[j * tw + i], 0.0);
        }
    }

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(len);
    forward.process(&mut image_freq);
    forward.process(&mut template_freq);

    for (a, b) in image_freq.iter_mut().zip(&template_freq) {
        *a *= b.conj();
    }

    let inverse = planner.plan_fft_inverse(len);
    inverse.process(&mut image_freq);

    #[allow(clippy::cast_precision_loss)]
    let scale = 1.0 / len as f64;
    let mut out = Vec::with_capacity(cw * ch);
    for y in 0..ch {
        for x in 0..cw {
            out.push(f64::from(image_freq[y * iw + x].re) * scale);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn noise(width: u32, height: u32, seed: u32) -> GrayImage {
        let mut state = seed;
        GrayImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            Luma([(state >> 24) as u8])
        })
    }

    #[test]
    fn exact_patch_scores_one_at_its_offset() {
        let image = noise(40, 30, 7);
        let template = image::imageops::crop_imm(&image, 11, 9, 8, 6).to_image();
        let surface = match_template(&image, &template);

        assert_eq!((surface.width(), surface.height()), (33, 25));
        let peak = surface.peak().unwrap();
        assert_eq!((peak.x, peak.y), (11, 9));
        assert!((peak.score - 1.0).abs() < 1e-4, "got {}", peak.score);
    }

    #[test]
    fn scores_are_invariant_to_brightness_and_contrast() {
        let template = noise(6, 6, 3);
        let mut image = GrayImage::from_pixel(20, 20, Luma([200]));
        for (x, y, px) in template.enumerate_pixels() {
            let v = u32::from(px[0]) / 2 + 10;
            image.put_pixel(x + 5, y + 4, Luma([v as u8]));
        }
        let surface = match_template(&image, &template);
        assert!(surface.get(5, 4) > 0.99);
    }

    #[test]
    fn inverted_patch_scores_minus_one() {
        let template = noise(7, 5, 11);
        let inverted = GrayImage::from_fn(7, 5, |x, y| Luma([255 - template.get_pixel(x, y)[0]]));
        let surface = match_template(&inverted, &template);
        assert_eq!((surface.width(), surface.height()), (1, 1));
        assert!((surface.get(0, 0) + 1.0).abs() < 1e-4);
    }

    #[test]
    fn flat_windows_and_flat_templates_score_zero() {
        let flat_image = GrayImage::from_pixel(16, 16, Luma([128]));
        let surface = match_template(&flat_image, &noise(5, 5, 1));
        assert!(surface.peak().unwrap().score.abs() < f32::EPSILON);

        let flat_template = GrayImage::from_pixel(5, 5, Luma([0]));
        let surface = match_template(&noise(16, 16, 2), &flat_template);
        assert!(surface.peak().unwrap().score.abs() < f32::EPSILON);
    }

    #[test]
    fn oversized_template_gives_empty_surface() {
        let surface = match_template(&noise(10, 10, 1), &noise(11, 5, 2));
        assert!(surface.is_empty());
        assert!(surface.peak().is_none());
    }

    #[test]
    fn full_width_template_gives_single_column() {
        let image = noise(24, 30, 5);
        let template = image::imageops::crop_imm(&image, 0, 12, 24, 8).to_image();
        let surface = match_template(&image, &template);
        assert_eq!((surface.width(), surface.height()), (1, 23));
        assert_eq!(surface.peak().unwrap().y, 12);
    }

    #[test]
    fn suppress_clamps_and_hides_peak() {
        let image = noise(30, 30, 9);
        let template = image::imageops::crop_imm(&image, 20, 20, 6, 6).to_image();
        let mut surface = match_template(&image, &template);
        surface.suppress(20, 20, 50, 50);
        let peak = surface.peak().unwrap();
        assert_ne!((peak.x, peak.y), (20, 20));
        assert!(surface.get(24, 24) == SUPPRESSED);
        assert!(surface.get(19, 19) != SUPPRESSED);
    }

    #[test]
    fn peak_prefers_first_cell_on_ties() {
        let mut surface = ScoreSurface {
            width: 3,
            height: 2,
            scores: vec![0.1, 0.5, 0.2, 0.5, 0.0, 0.5],
        };
        assert_eq!(
            surface.peak(),
            Some(Peak {
                x: 1,
                y: 0,
                score: 0.5
            })
        );
        surface.suppress(0, 0, 3, 1);
        assert_eq!(surface.peak().map(|p| (p.x, p.y)), Some((0, 1)));
    }

    #[test]
    fn fft_numerators_agree_with_direct_summation() {
        let image = noise(37, 29, 4);
        let template = noise(9, 7, 8);
        #[allow(clippy::cast_precision_loss)]
        let mean = template.as_raw().iter().map(|&v| f64::from(v)).sum::<f64>()
            / template.as_raw().len() as f64;
        #[allow(clippy::cast_possible_truncation)]
        let zero_mean: Vec<f32> = template
            .as_raw()
            .iter()
            .map(|&v| (f64::from(v) - mean) as f32)
            .collect();

        let direct = correlate_direct(&image, &zero_mean, 9, 7);
        let fft = correlate_fft(&image, &zero_mean, 9, 7);
        assert_eq!(direct.len(), fft.len());
        for (d, f) in direct.iter().zip(&fft) {
            assert!((d - f).abs() < 32.0, "direct {d} vs fft {f}");
        }
    }
}
