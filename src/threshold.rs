//! Luma histograms, Otsu's method and binarization.
//!
//! The threshold is expressed in [0, 1] (bucket index / 255) so that a
//! manually chosen value and an Otsu suggestion are interchangeable.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::surface::PixelSurface;

pub const NUMBER_OF_BUCKETS: usize = 256;

/// Integer luma in 0..=255 using the BT.601 weights 0.299 / 0.587 / 0.114
#[inline]
pub fn luma(pixel: &Rgba<u8>) -> u8 {
    let weighted = 299 * pixel[0] as u32 + 587 * pixel[1] as u32 + 114 * pixel[2] as u32;
    (weighted / 1000) as u8
}

/// Count of pixels per luma bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumaHistogram {
    buckets: [u64; NUMBER_OF_BUCKETS],
}

impl LumaHistogram {
    pub fn from_buckets(buckets: [u64; NUMBER_OF_BUCKETS]) -> Self {
        Self { buckets }
    }

    /// Builds the histogram of every visible pixel, one rayon task per row
    pub fn from_surface<S: PixelSurface + Sync>(surface: &S) -> Self {
        let width = surface.width();
        let buckets = (0..surface.height())
            .into_par_iter()
            .fold(
                || [0u64; NUMBER_OF_BUCKETS],
                |mut buckets, y| {
                    for x in 0..width {
                        let pixel = surface.pixel(x, y);
                        if pixel[3] != 0 {
                            buckets[luma(&pixel) as usize] += 1;
                        }
                    }
                    buckets
                },
            )
            .reduce(
                || [0u64; NUMBER_OF_BUCKETS],
                |mut left, right| {
                    for (l, r) in left.iter_mut().zip(right.iter()) {
                        *l += r;
                    }
                    left
                },
            );

        Self { buckets }
    }

    pub fn buckets(&self) -> &[u64; NUMBER_OF_BUCKETS] {
        &self.buckets
    }

    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// Otsu's suggested threshold for this histogram
    pub fn otsu_threshold(&self) -> f32 {
        otsu_threshold(&self.buckets)
    }
}

/// Otsu's method in its inter-class-variance-maximizing form.
///
/// One sweep keeps the running class-0 weight and weighted index sum; the
/// class-1 values are the totals minus those. Splits leaving either class
/// empty are skipped. When several adjacent splits share the maximal
/// variance (e.g. two isolated spikes), the midpoint of that first plateau
/// is returned; a later, separate tie does not displace it.
pub fn otsu_threshold(histogram: &[u64; NUMBER_OF_BUCKETS]) -> f32 {
    let sum_of_omegas: u64 = histogram.iter().sum();
    let sum_of_mu_numerators: u64 = histogram
        .iter()
        .enumerate()
        .map(|(index, &count)| index as u64 * count)
        .sum();

    let mut omega0 = 0u64;
    let mut mu0_numerator = 0u64;

    let mut maximum_variance: Option<f64> = None;
    let mut plateau_start = 0usize;
    let mut plateau_end = 0usize;
    let mut plateau_open = false;

    for (index, &count) in histogram.iter().enumerate() {
        omega0 += count;
        mu0_numerator += index as u64 * count;

        let omega1 = sum_of_omegas - omega0;
        if omega0 == 0 || omega1 == 0 {
            continue;
        }

        let mu1_numerator = sum_of_mu_numerators - mu0_numerator;
        let mu0 = mu0_numerator as f64 / omega0 as f64;
        let mu1 = mu1_numerator as f64 / omega1 as f64;
        // Multiply as floats, the weights can overflow a u64 product on large images
        let variance = omega0 as f64 * omega1 as f64 * (mu0 - mu1).powi(2);

        match maximum_variance {
            Some(maximum) => {
                let tolerance = maximum.abs() * 1e-12;
                if variance > maximum + tolerance {
                    maximum_variance = Some(variance);
                    plateau_start = index;
                    plateau_end = index;
                    plateau_open = true;
                } else if (variance - maximum).abs() <= tolerance {
                    if plateau_open {
                        plateau_end = index;
                    }
                } else {
                    plateau_open = false;
                }
            }
            None => {
                maximum_variance = Some(variance);
                plateau_start = index;
                plateau_end = index;
                plateau_open = true;
            }
        }
    }

    let best_cut = (plateau_start + plateau_end) / 2;
    best_cut as f32 / (NUMBER_OF_BUCKETS - 1) as f32
}

/// Whether a pixel counts as foreground at the given threshold.
///
/// On a bright page the leaf is darker than the threshold; on a black
/// background it is brighter. Transparent pixels are never foreground.
#[inline]
pub fn is_foreground(pixel: &Rgba<u8>, threshold: f32, use_black_background: bool) -> bool {
    if pixel[3] == 0 {
        return false;
    }
    let value = luma(pixel) as f32 / (NUMBER_OF_BUCKETS - 1) as f32;
    if use_black_background {
        value > threshold
    } else {
        value < threshold
    }
}

/// Binarize an image: foreground keeps its color at full opacity, background
/// becomes fully transparent.
pub fn apply_threshold<S: PixelSurface + Sync>(
    surface: &S,
    threshold: f32,
    use_black_background: bool,
) -> RgbaImage {
    let (width, height) = (surface.width(), surface.height());
    let mut output = RgbaImage::new(width, height);
    if width == 0 || height == 0 {
        return output;
    }

    output
        .par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width {
                let pixel = surface.pixel(x, y as u32);
                let offset = x as usize * 4;
                if is_foreground(&pixel, threshold, use_black_background) {
                    row[offset..offset + 4].copy_from_slice(&[pixel[0], pixel[1], pixel[2], 255]);
                }
            }
        });

    output
}
