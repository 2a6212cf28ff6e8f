//! Erasing detected marks.
//!
//! Logo regions are filled by fast-marching inpainting (Telea 2004): the
//! boundary of the mask is propagated inward in order of distance, and every
//! newly reached pixel is set to a weighted average of the already known
//! pixels around it, each extrapolated along its local gradient. Ribbons are
//! painted over with a solid colour.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{Rgb, RgbImage};
use tracing::warn;

use crate::detection::Mask;

/// Pixel outside the mask, or already filled and settled.
const KNOWN: u8 = 0;
/// Pixel on the propagating front.
const BAND: u8 = 1;
/// Pixel still waiting to be filled.
const INSIDE: u8 = 2;

/// Arrival time of pixels the front has not reached.
const FAR: f32 = 1.0e6;

/// Entry of the narrow-band priority queue, ordered by smallest arrival time.
#[derive(Debug, Clone, Copy)]
struct Front {
    time: f32,
    idx: usize,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Fast-marching state over one image.
struct FastMarching<'a> {
    image: &'a mut RgbImage,
    width: usize,
    height: usize,
    flags: Vec<u8>,
    times: Vec<f32>,
    radius: i64,
}

impl FastMarching<'_> {
    fn flag(&self, x: i64, y: i64) -> u8 {
        self.index(x, y).map_or(INSIDE, |idx| self.flags[idx])
    }

    fn time(&self, x: i64, y: i64) -> f32 {
        self.index(x, y).map_or(FAR, |idx| self.times[idx])
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let inside = x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height;
        inside.then(|| y as usize * self.width + x as usize)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn coords(&self, idx: usize) -> (i64, i64) {
        ((idx % self.width) as i64, (idx / self.width) as i64)
    }

    /// Eikonal update from the two neighbours `(x1, y1)` and `(x2, y2)`.
    fn solve(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> f32 {
        let (f1, f2) = (self.flag(x1, y1), self.flag(x2, y2));
        let (t1, t2) = (self.time(x1, y1), self.time(x2, y2));
        match (f1 != INSIDE, f2 != INSIDE) {
            (true, true) => {
                let diff = t1 - t2;
                if diff.abs() >= 1.0 {
                    1.0 + t1.min(t2)
                } else {
                    (t1 + t2 + (2.0 - diff * diff).sqrt()) * 0.5
                }
            }
            (true, false) => 1.0 + t1,
            (false, true) => 1.0 + t2,
            (false, false) => 1.0 + t1.min(t2),
        }
    }

    fn arrival_time(&self, x: i64, y: i64) -> f32 {
        self.solve(x - 1, y, x, y - 1)
            .min(self.solve(x + 1, y, x, y - 1))
            .min(self.solve(x - 1, y, x, y + 1))
            .min(self.solve(x + 1, y, x, y + 1))
    }

    /// Central difference of `value` at `(x, y)` along `(dx, dy)`, using only
    /// non-inside neighbours; one-sided when one neighbour is missing.
    fn difference(&self, x: i64, y: i64, dx: i64, dy: i64, value: impl Fn(i64, i64) -> f32) -> f32 {
        let ahead = self.flag(x + dx, y + dy) != INSIDE;
        let behind = self.flag(x - dx, y - dy) != INSIDE;
        match (ahead, behind) {
            (true, true) => (value(x + dx, y + dy) - value(x - dx, y - dy)) * 0.5,
            (true, false) => value(x + dx, y + dy) - value(x, y),
            (false, true) => value(x, y) - value(x - dx, y - dy),
            (false, false) => 0.0,
        }
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn channel(&self, x: i64, y: i64, c: usize) -> f32 {
        f32::from(self.image.get_pixel(x as u32, y as u32)[c])
    }

    /// Fill `(x, y)` from the known pixels within the radius.
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn fill(&mut self, x: i64, y: i64) {
        let time_here = self.time(x, y);
        let grad_tx = self.difference(x, y, 1, 0, |xx, yy| self.time(xx, yy));
        let grad_ty = self.difference(x, y, 0, 1, |xx, yy| self.time(xx, yy));

        let mut acc = [0.0_f32; 3];
        let mut total = 0.0_f32;
        let r = self.radius;

        for qy in y - r..=y + r {
            for qx in x - r..=x + r {
                let (rx, ry) = (x - qx, y - qy);
                let dist2 = rx * rx + ry * ry;
                if dist2 == 0 || dist2 > r * r || self.flag(qx, qy) == INSIDE {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let (rx, ry, dist2) = (rx as f32, ry as f32, dist2 as f32);

                let direction = ((rx * grad_tx + ry * grad_ty) / dist2.sqrt()).abs().max(1e-6);
                let geometric = 1.0 / dist2;
                let level = 1.0 / (1.0 + (self.time(qx, qy) - time_here).abs());
                let weight = direction * geometric * level;

                for (c, slot) in acc.iter_mut().enumerate() {
                    let gx = self.difference(qx, qy, 1, 0, |xx, yy| self.channel(xx, yy, c));
                    let gy = self.difference(qx, qy, 0, 1, |xx, yy| self.channel(xx, yy, c));
                    *slot += weight * (self.channel(qx, qy, c) + gx * rx + gy * ry);
                }
                total += weight;
            }
        }

        if total <= 0.0 {
            return;
        }
        let filled = Rgb(acc.map(|v| (v / total).round().clamp(0.0, 255.0) as u8));
        self.image.put_pixel(x as u32, y as u32, filled);
    }

    fn run(&mut self) {
        let mut heap = BinaryHeap::new();
        for idx in 0..self.flags.len() {
            if self.flags[idx] != KNOWN {
                continue;
            }
            let (x, y) = self.coords(idx);
            let touches_hole = [(1, 0), (-1, 0), (0, 1), (0, -1)]
                .iter()
                .any(|&(dx, dy)| self.index(x + dx, y + dy).is_some_and(|n| self.flags[n] == INSIDE));
            if touches_hole {
                self.flags[idx] = BAND;
                heap.push(Front { time: 0.0, idx });
            }
        }

        while let Some(Front { idx, .. }) = heap.pop() {
            self.flags[idx] = KNOWN;
            let (x, y) = self.coords(idx);
            for (dx, dy) in [(1, 0), (-1, 0), (0, 1), (0, -1)] {
                let Some(n) = self.index(x + dx, y + dy) else {
                    continue;
                };
                if self.flags[n] != INSIDE {
                    continue;
                }
                let (nx, ny) = (x + dx, y + dy);
                let time = self.arrival_time(nx, ny);
                self.times[n] = time;
                self.fill(nx, ny);
                self.flags[n] = BAND;
                heap.push(Front { time, idx: n });
            }
        }
    }
}

/// Inpaint every masked pixel of `image` in place.
///
/// `radius` bounds the neighbourhood that contributes to each filled pixel
/// (values below 1 behave as 1). An empty mask leaves the image untouched, as
/// does a mask covering the whole image, which has no known boundary to grow from.
pub fn inpaint(image: &mut RgbImage, mask: &Mask, radius: u32) {
    if mask.is_empty() {
        return;
    }
    if image.dimensions() != (mask.width(), mask.height()) {
        warn!(
            "mask {}x{} does not match image {}x{}, skipping inpaint",
            mask.width(),
            mask.height(),
            image.width(),
            image.height()
        );
        return;
    }

    let (flags, times): (Vec<u8>, Vec<f32>) = mask
        .as_image()
        .as_raw()
        .iter()
        .map(|&m| if m == 0 { (KNOWN, 0.0) } else { (INSIDE, FAR) })
        .unzip();

    let width = image.width() as usize;
    let height = image.height() as usize;
    FastMarching {
        image,
        width,
        height,
        flags,
        times,
        radius: i64::from(radius.max(1)),
    }
    .run();
}

/// Paint every row from `top` to the bottom of `image` with `color`.
///
/// A `top` at or below the last row leaves the image untouched.
pub fn fill_band(image: &mut RgbImage, top: u32, color: Rgb<u8>) {
    for y in top..image.height() {
        for x in 0..image.width() {
            image.put_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(width: u32, height: u32, x: u32, y: u32, side: u32) -> Mask {
        let mut mask = Mask::new(width, height);
        mask.mark(x, y, x + side, y + side);
        mask
    }

    #[test]
    fn empty_mask_is_a_no_op() {
        let mut img = RgbImage::from_fn(20, 20, |x, y| Rgb([x as u8, y as u8, 7]));
        let before = img.clone();
        inpaint(&mut img, &Mask::new(20, 20), 5);
        assert_eq!(img, before);
    }

    #[test]
    fn uniform_background_is_restored_exactly() {
        let mut img = RgbImage::from_pixel(40, 30, Rgb([200, 120, 40]));
        for y in 10..18 {
            for x in 12..22 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        inpaint(&mut img, &square_mask(40, 30, 10, 8, 14), 5);
        assert!(img.pixels().all(|p| *p == Rgb([200, 120, 40])));
    }

    #[test]
    fn linear_ramp_is_continued_across_the_hole() {
        let ramp = |x: u32, y: u32| Rgb([(x * 4) as u8, (y * 3) as u8, 90]);
        let mut img = RgbImage::from_fn(50, 50, ramp);
        for y in 20..30 {
            for x in 20..30 {
                img.put_pixel(x, y, Rgb([255, 0, 255]));
            }
        }
        inpaint(&mut img, &square_mask(50, 50, 20, 20, 10), 5);

        for y in 20..30 {
            for x in 20..30 {
                let got = img.get_pixel(x, y);
                let want = ramp(x, y);
                for c in 0..3 {
                    let diff = (i32::from(got[c]) - i32::from(want[c])).abs();
                    assert!(diff <= 6, "({x},{y}) ch {c}: got {} want {}", got[c], want[c]);
                }
            }
        }
    }

    #[test]
    fn pixels_outside_mask_are_untouched() {
        let mut img = RgbImage::from_fn(30, 30, |x, y| Rgb([(x * 7 % 256) as u8, (y * 5) as u8, 1]));
        let before = img.clone();
        let mask = square_mask(30, 30, 0, 0, 6);
        inpaint(&mut img, &mask, 3);
        for (x, y, px) in img.enumerate_pixels() {
            if !mask.contains(x, y) {
                assert_eq!(px, before.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn full_mask_has_nothing_to_grow_from() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]));
        let mask = square_mask(8, 8, 0, 0, 8);
        inpaint(&mut img, &mask, 5);
        assert!(img.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }

    #[test]
    fn fill_band_paints_to_the_bottom() {
        let mut img = RgbImage::from_pixel(12, 10, Rgb([0, 0, 0]));
        fill_band(&mut img, 7, Rgb([255, 255, 255]));
        for (_, y, px) in img.enumerate_pixels() {
            if y >= 7 {
                assert_eq!(*px, Rgb([255, 255, 255]));
            } else {
                assert_eq!(*px, Rgb([0, 0, 0]));
            }
        }

        let before = img.clone();
        fill_band(&mut img, 10, Rgb([1, 2, 3]));
        assert_eq!(img, before);
    }
}
