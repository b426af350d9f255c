//! Projective correction of the photographed scale square.
//!
//! Four scale-mark centers, in any order, are put into rotational order and
//! mapped onto the corners of an upright square. The photo is resampled
//! through that homography so every output pixel covers the same physical
//! area.
//!
//! Coordinates here are continuous: pixel (i, j) covers [i, i+1) x [j, j+1)
//! and its center is (i + 0.5, j + 0.5).

use image::{Rgba, RgbaImage};
use log::debug;
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const DEGENERACY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PointF) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Four points labelled by position. Image y grows downward, so "top"
/// means smaller y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OrientedQuadrilateral {
    pub top_left: PointF,
    pub top_right: PointF,
    pub bottom_right: PointF,
    pub bottom_left: PointF,
}

impl OrientedQuadrilateral {
    /// Order points by their angle around the centroid. With y pointing
    /// down, increasing `atan2` walks top-left, top-right, bottom-right,
    /// bottom-left for an upright square.
    pub fn from_unordered(points: [PointF; 4]) -> Self {
        let center_x = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
        let center_y = points.iter().map(|p| p.y).sum::<f64>() / 4.0;

        let mut ordered = points;
        ordered.sort_by(|a, b| {
            let angle_a = (a.y - center_y).atan2(a.x - center_x);
            let angle_b = (b.y - center_y).atan2(b.x - center_x);
            angle_a.total_cmp(&angle_b)
        });

        Self {
            top_left: ordered[0],
            top_right: ordered[1],
            bottom_right: ordered[2],
            bottom_left: ordered[3],
        }
    }

    /// Corners in drawing order: top-left, top-right, bottom-right, bottom-left
    pub fn corners(&self) -> [PointF; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    pub fn shortest_side(&self) -> f64 {
        let corners = self.corners();
        (0..4)
            .map(|i| corners[i].distance_to(&corners[(i + 1) % 4]))
            .fold(f64::INFINITY, f64::min)
    }
}

/// A solved 3x3 projective transform, normalized so the bottom-right entry is 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Direct linear transform from four point correspondences.
    ///
    /// Both point sets are normalized (centroid at the origin, mean distance
    /// sqrt 2) before the 8x8 system is solved, and the result is mapped
    /// back. Returns `None` for coincident or collinear points or when the
    /// system is singular.
    pub fn solve(source: &[PointF; 4], destination: &[PointF; 4]) -> Option<Self> {
        if is_degenerate(source) || is_degenerate(destination) {
            return None;
        }

        let (normalized_source, source_transform) = normalize_points(source)?;
        let (normalized_destination, destination_transform) = normalize_points(destination)?;

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let (x, y) = (normalized_source[i].x, normalized_source[i].y);
            let (u, v) = (normalized_destination[i].x, normalized_destination[i].y);

            let row = 2 * i;
            a[(row, 0)] = x;
            a[(row, 1)] = y;
            a[(row, 2)] = 1.0;
            a[(row, 6)] = -u * x;
            a[(row, 7)] = -u * y;
            b[row] = u;

            a[(row + 1, 3)] = x;
            a[(row + 1, 4)] = y;
            a[(row + 1, 5)] = 1.0;
            a[(row + 1, 6)] = -v * x;
            a[(row + 1, 7)] = -v * y;
            b[row + 1] = v;
        }

        let h = a.lu().solve(&b)?;
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);

        let matrix = destination_transform.try_inverse()? * normalized * source_transform;
        Self::from_matrix(matrix)
    }

    /// Wrap a raw matrix, rescaling it so the bottom-right entry is 1
    pub fn from_matrix(matrix: Matrix3<f64>) -> Option<Self> {
        let scale = matrix[(2, 2)];
        if scale.abs() < DEGENERACY_EPSILON {
            return None;
        }
        let matrix = matrix / scale;
        matrix
            .iter()
            .all(|value| value.is_finite())
            .then_some(Self { matrix })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn inverse(&self) -> Option<Self> {
        Self::from_matrix(self.matrix.try_inverse()?)
    }

    /// Map a point, `None` when it lands on the line at infinity
    pub fn project(&self, point: PointF) -> Option<PointF> {
        let mapped = self.matrix * Vector3::new(point.x, point.y, 1.0);
        if mapped.z.abs() < DEGENERACY_EPSILON {
            return None;
        }
        Some(PointF::new(mapped.x / mapped.z, mapped.y / mapped.z))
    }
}

/// Side of the corrected square: the shortest quadrilateral edge, floored,
/// clamped to `[1, max_size]`
pub fn corrected_side(quadrilateral: &OrientedQuadrilateral, max_size: u32) -> u32 {
    let side = quadrilateral.shortest_side().floor();
    if !side.is_finite() || side < 1.0 {
        return 1;
    }
    (side as u64).min(max_size.max(1) as u64) as u32
}

#[derive(Debug, Clone)]
pub struct CorrectedImage {
    pub image: RgbaImage,
    /// Side of the square in pixels; all four sides are equal by construction
    pub scale_mark_pixel_length: f64,
    pub quadrilateral: OrientedQuadrilateral,
    /// Maps continuous source coordinates into the corrected image
    pub source_to_corrected: Homography,
}

/// Straighten the square spanned by four scale-mark centers.
///
/// `marks` are centers in pixel-index coordinates, e.g. the mean of a blob's
/// pixel indices. Returns `None` when the marks do not form a proper
/// quadrilateral.
///
/// The mark centers become the output corners, so only the inner quarter
/// of each mark is kept. Detecting marks again in the output finds those
/// quarters, centered half a mark radius in from each corner.
pub fn correct_perspective(
    image: &RgbaImage,
    marks: &[PointF; 4],
    max_size: u32,
) -> Option<CorrectedImage> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }

    let centers = marks.map(|mark| PointF::new(mark.x + 0.5, mark.y + 0.5));
    let quadrilateral = OrientedQuadrilateral::from_unordered(centers);
    let side = corrected_side(&quadrilateral, max_size);
    let extent = side as f64;

    let square = [
        PointF::new(0.0, 0.0),
        PointF::new(extent, 0.0),
        PointF::new(extent, extent),
        PointF::new(0.0, extent),
    ];
    let corrected_to_source = Homography::solve(&square, &quadrilateral.corners())?;
    let source_to_corrected = corrected_to_source.inverse()?;

    debug!(
        "Correcting perspective to a {}x{} square from corners {:?}",
        side,
        side,
        quadrilateral.corners()
    );

    let mut corrected = RgbaImage::new(side, side);
    corrected
        .par_chunks_mut(side as usize * 4)
        .enumerate()
        .for_each(|(v, row)| {
            for u in 0..side as usize {
                let target = PointF::new(u as f64 + 0.5, v as f64 + 0.5);
                if let Some(source) = corrected_to_source.project(target) {
                    let pixel = sample_bilinear(image, source.x - 0.5, source.y - 0.5);
                    row[u * 4..u * 4 + 4].copy_from_slice(&pixel.0);
                }
            }
        });

    Some(CorrectedImage {
        image: corrected,
        scale_mark_pixel_length: extent,
        quadrilateral,
        source_to_corrected,
    })
}

/// Bilinear interpolation at pixel-index coordinates, clamped to the edges
fn sample_bilinear(image: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (width, height) = image.dimensions();
    let x = x.clamp(0.0, (width - 1) as f64);
    let y = y.clamp(0.0, (height - 1) as f64);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = image.get_pixel(x0, y0);
    let p10 = image.get_pixel(x1, y0);
    let p01 = image.get_pixel(x0, y1);
    let p11 = image.get_pixel(x1, y1);

    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = p00[channel] as f64 * (1.0 - fx) + p10[channel] as f64 * fx;
        let bottom = p01[channel] as f64 * (1.0 - fx) + p11[channel] as f64 * fx;
        out[channel] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

fn is_degenerate(points: &[PointF; 4]) -> bool {
    let scale = points
        .iter()
        .flat_map(|p| [p.x.abs(), p.y.abs()])
        .fold(1.0, f64::max);
    let tolerance = DEGENERACY_EPSILON * scale * scale;

    for i in 0..4 {
        for j in (i + 1)..4 {
            if points[i].distance_to(&points[j]) <= DEGENERACY_EPSILON * scale {
                return true;
            }
            for k in (j + 1)..4 {
                let cross = (points[j].x - points[i].x) * (points[k].y - points[i].y)
                    - (points[j].y - points[i].y) * (points[k].x - points[i].x);
                if cross.abs() <= tolerance {
                    return true;
                }
            }
        }
    }
    false
}

/// Translate to the centroid and scale to a mean distance of sqrt 2
fn normalize_points(points: &[PointF; 4]) -> Option<([PointF; 4], Matrix3<f64>)> {
    let center_x = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let center_y = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_distance = points
        .iter()
        .map(|p| (p.x - center_x).hypot(p.y - center_y))
        .sum::<f64>()
        / 4.0;
    if mean_distance < DEGENERACY_EPSILON {
        return None;
    }

    let scale = std::f64::consts::SQRT_2 / mean_distance;
    let normalized = points.map(|p| PointF::new((p.x - center_x) * scale, (p.y - center_y) * scale));
    let transform = Matrix3::new(
        scale, 0.0, -center_x * scale,
        0.0, scale, -center_y * scale,
        0.0, 0.0, 1.0,
    );
    Some((normalized, transform))
}
