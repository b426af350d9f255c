//! Finding the four printed scale marks and converting pixel counts to
//! physical area.

use log::{debug, warn};
use std::cmp::Reverse;
use std::collections::{HashSet, VecDeque};

use crate::homography::PointF;
use crate::labeling::{label_connected_components, Label, Point, Size};
use crate::layered::LayeredSurface;
use crate::surface::PixelSurface;

/// Roughly how many pixels a tap search looks at before giving up
pub const DEFAULT_TAP_SEARCH_PIXELS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleDetection {
    /// Mark centers in pixel-index coordinates, ordered by mark size
    Found([PointF; 4]),
    NotFound,
}

impl ScaleDetection {
    pub fn marks(&self) -> Option<&[PointF; 4]> {
        match self {
            ScaleDetection::Found(marks) => Some(marks),
            ScaleDetection::NotFound => None,
        }
    }
}

/// Look for the scale marks in a binarized image.
///
/// The largest occupied region is taken to be the leaf and the next four
/// (by photographed pixel count) the marks. Each candidate must have
/// between `min_pixels` and `max_pixels` pixels, and no two may share a
/// center.
pub fn detect_scale_marks<S: PixelSurface>(binary: &S, min_pixels: u64, max_pixels: u64) -> ScaleDetection {
    let surface = match LayeredSurface::new(binary) {
        Ok(surface) => surface,
        Err(e) => {
            warn!("Cannot look for scale marks: {}", e);
            return ScaleDetection::NotFound;
        }
    };
    let info = label_connected_components(&surface, &[]);

    let mut occupied: Vec<(Label, Size)> = info
        .label_to_size()
        .iter()
        .filter(|(&label, _)| label > 0)
        .map(|(&label, &size)| (label, size))
        .collect();

    if occupied.len() < 5 {
        debug!("Only {} occupied regions, no scale marks", occupied.len());
        return ScaleDetection::NotFound;
    }
    occupied.sort_by_key(|&(label, size)| (Reverse(size.standard_part), label));

    let mut marks = [PointF::default(); 4];
    for (index, &(label, _)) in occupied[1..5].iter().enumerate() {
        let Some(start) = info.member_point(label) else {
            return ScaleDetection::NotFound;
        };
        let Some(center) = component_centroid(binary, start, min_pixels, max_pixels) else {
            debug!("Scale mark candidate {} at ({}, {}) has the wrong size", index, start.x, start.y);
            return ScaleDetection::NotFound;
        };
        if marks[..index].contains(&center) {
            debug!("Scale mark candidate {} duplicates an earlier mark", index);
            return ScaleDetection::NotFound;
        }
        marks[index] = center;
    }

    debug!("Scale marks found at {:?}", marks);
    ScaleDetection::Found(marks)
}

/// Mean position of the 4-connected visible pixels around `start`.
///
/// Returns `None` if `start` is not visible or the component has fewer
/// than `min_pixels` or more than `max_pixels` pixels. The walk stops as
/// soon as `max_pixels` is exceeded.
pub fn component_centroid<S: PixelSurface>(
    surface: &S,
    start: Point,
    min_pixels: u64,
    max_pixels: u64,
) -> Option<PointF> {
    let (width, height) = (surface.width(), surface.height());
    if start.x >= width || start.y >= height || !surface.is_visible(start.x, start.y) {
        return None;
    }

    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert((start.x, start.y));
    queue.push_back((start.x, start.y));

    let (mut sum_x, mut sum_y, mut count) = (0u64, 0u64, 0u64);

    while let Some((x, y)) = queue.pop_front() {
        sum_x += x as u64;
        sum_y += y as u64;
        count += 1;
        if count > max_pixels {
            return None;
        }

        let neighbors = [
            (x > 0).then(|| (x - 1, y)),
            (x + 1 < width).then(|| (x + 1, y)),
            (y > 0).then(|| (x, y - 1)),
            (y + 1 < height).then(|| (x, y + 1)),
        ];
        for (nx, ny) in neighbors.into_iter().flatten() {
            if surface.is_visible(nx, ny) && visited.insert((nx, ny)) {
                queue.push_back((nx, ny));
            }
        }
    }

    if count < min_pixels {
        return None;
    }
    Some(PointF::new(
        sum_x as f64 / count as f64,
        sum_y as f64 / count as f64,
    ))
}

/// Nearest visible pixel to `from`, searching square rings of growing
/// radius until about `max_pixels_to_check` in-bounds pixels were looked at
pub fn search_for_visible<S: PixelSurface>(surface: &S, from: Point, max_pixels_to_check: u64) -> Option<Point> {
    let (width, height) = (surface.width() as i64, surface.height() as i64);
    let (cx, cy) = (from.x as i64, from.y as i64);
    let mut checked = 0u64;
    let max_radius = width.max(height) + cx.abs().max(cy.abs());

    let check = |x: i64, y: i64, checked: &mut u64| -> Option<Point> {
        if x < 0 || y < 0 || x >= width || y >= height {
            return None;
        }
        *checked += 1;
        surface
            .is_visible(x as u32, y as u32)
            .then(|| Point::new(x as u32, y as u32))
    };

    if let Some(point) = check(cx, cy, &mut checked) {
        return Some(point);
    }

    for radius in 1..=max_radius {
        // Top and bottom rows, then the columns between them
        for x in (cx - radius)..=(cx + radius) {
            if let Some(point) = check(x, cy - radius, &mut checked) {
                return Some(point);
            }
            if let Some(point) = check(x, cy + radius, &mut checked) {
                return Some(point);
            }
        }
        for y in (cy - radius + 1)..(cy + radius) {
            if let Some(point) = check(cx - radius, y, &mut checked) {
                return Some(point);
            }
            if let Some(point) = check(cx + radius, y, &mut checked) {
                return Some(point);
            }
        }

        if checked >= max_pixels_to_check {
            break;
        }
    }

    None
}

/// Center of the mark closest to a tapped point. Any visible blob counts,
/// down to a single pixel, as long as it is no larger than `max_pixels`.
pub fn locate_mark_near<S: PixelSurface>(surface: &S, tap: Point, max_pixels: u64) -> Option<PointF> {
    let start = search_for_visible(surface, tap, DEFAULT_TAP_SEARCH_PIXELS)?;
    component_centroid(surface, start, 1, max_pixels)
}

/// Physical area of `pixels` given the side of the scale square in pixels
/// and in physical units
pub fn pixels_to_units2(pixels: u64, scale_mark_pixel_length: f64, scale_mark_length: f64) -> f64 {
    let units_per_pixel = scale_mark_length / scale_mark_pixel_length;
    units_per_pixel * units_per_pixel * pixels as f64
}
