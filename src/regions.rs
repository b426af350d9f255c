//! Leaf and hole classification over a labeled surface, and the pixel
//! accounting that turns it into leaf and consumed areas.

use log::{debug, warn};
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;

use crate::labeling::{ComponentInfo, Label, Point, Size};

/// Caller-supplied points: which blob is the leaf, and which empty regions
/// must not be counted as holes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionSelection {
    pub leaf_point: Option<Point>,
    pub excluded_points: Vec<Point>,
}

impl RegionSelection {
    /// Points the labeler has to resolve for this selection
    pub fn points_to_identify(&self) -> Vec<Point> {
        self.leaf_point
            .iter()
            .chain(self.excluded_points.iter())
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoleRegion {
    pub label: Label,
    pub member_point: Point,
    pub size: Size,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeafMeasurement {
    pub leaf_label: Label,
    pub leaf_member_point: Point,
    pub leaf_size: Size,
    /// Leaf tissue from the photo
    pub leaf_area_pixels: u64,
    /// Holes adjacent to the leaf plus edges the user drew onto the leaf
    pub consumed_area_pixels: u64,
    /// Everything else: the page, other blobs, excluded regions
    pub background_area_pixels: u64,
    pub background_label: Label,
    pub holes: Vec<HoleRegion>,
}

impl LeafMeasurement {
    pub fn total_area_pixels(&self) -> u64 {
        self.leaf_area_pixels + self.consumed_area_pixels + self.background_area_pixels
    }

    /// The leaf as it was before anything ate it
    pub fn leaf_area_including_consumed_pixels(&self) -> u64 {
        self.leaf_area_pixels + self.consumed_area_pixels
    }

    pub fn percent_consumed(&self) -> f64 {
        let whole = self.leaf_area_including_consumed_pixels();
        if whole == 0 {
            return 0.0;
        }
        self.consumed_area_pixels as f64 / whole as f64 * 100.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AreaOutcome {
    Measured(LeafMeasurement),
    /// No occupied region at all
    NoLeafFound,
    /// No empty region at all, nothing separates leaf from background
    SolidImage,
}

impl AreaOutcome {
    pub fn measurement(&self) -> Option<&LeafMeasurement> {
        match self {
            AreaOutcome::Measured(measurement) => Some(measurement),
            _ => None,
        }
    }
}

/// Identify the leaf, the background and the holes in a labeled surface.
///
/// The leaf is the region under `selection.leaf_point` when that point is
/// on tissue, otherwise the largest occupied region. The background is the
/// largest empty region, whether or not it touches the border. Every other
/// empty region bordering the leaf, the outside region included, counts as
/// consumed unless an excluded point falls inside it.
pub fn classify_regions(info: &ComponentInfo, selection: &RegionSelection) -> AreaOutcome {
    // Largest first; label breaks ties so the result does not depend on map order
    let mut labels_and_sizes: Vec<(Label, Size)> = info
        .label_to_size()
        .iter()
        .map(|(&label, &size)| (label, size))
        .collect();
    labels_and_sizes.sort_by_key(|&(label, size)| (Reverse(size.total()), label));

    let Some(largest_occupied) = labels_and_sizes.iter().find(|(label, _)| *label > 0) else {
        return AreaOutcome::NoLeafFound;
    };
    let Some(largest_empty) = labels_and_sizes.iter().find(|(label, _)| *label < 0) else {
        return AreaOutcome::SolidImage;
    };

    let designated_leaf = selection.leaf_point.and_then(|point| {
        let label = info.label_of_point(&point).filter(|&label| label > 0);
        if label.is_none() {
            warn!(
                "Leaf point ({}, {}) is not on leaf tissue, using the largest region",
                point.x, point.y
            );
        }
        label
    });
    let leaf_label = designated_leaf.unwrap_or(largest_occupied.0);
    let leaf_size = info.size_of(leaf_label).unwrap_or_default();

    let background_label = largest_empty.0;

    let excluded_labels: HashSet<Label> = selection
        .excluded_points
        .iter()
        .filter_map(|point| info.label_of_point(point))
        .filter(|&label| label != leaf_label)
        .collect();

    let holes: Vec<HoleRegion> = labels_and_sizes
        .iter()
        .filter(|&&(label, _)| label < 0 && label != background_label)
        .filter(|&&(label, _)| !excluded_labels.contains(&label))
        .filter(|&&(label, _)| {
            info.neighbors_of(label)
                .map_or(false, |neighbors| neighbors.contains(&leaf_label))
        })
        .filter_map(|&(label, size)| {
            info.member_point(label).map(|member_point| HoleRegion {
                label,
                member_point,
                size,
            })
        })
        .collect();

    let leaf_area_pixels = leaf_size.standard_part;
    let consumed_area_pixels =
        leaf_size.drawing_part + holes.iter().map(|hole| hole.size.standard_part).sum::<u64>();
    let background_area_pixels = info
        .total_pixels()
        .saturating_sub(leaf_area_pixels + consumed_area_pixels);

    debug!(
        "Leaf label {} ({} px), {} holes ({} px consumed), background label {}",
        leaf_label,
        leaf_area_pixels,
        holes.len(),
        consumed_area_pixels,
        background_label
    );

    AreaOutcome::Measured(LeafMeasurement {
        leaf_label,
        leaf_member_point: info.member_point(leaf_label).unwrap_or(Point::new(0, 0)),
        leaf_size,
        leaf_area_pixels,
        consumed_area_pixels,
        background_area_pixels,
        background_label,
        holes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::label_connected_components;
    use crate::layered::LayeredSurface;
    use assert_approx_eq::assert_approx_eq;
    use image::{Rgba, RgbaImage};

    fn mask<F: Fn(u32, u32) -> bool>(width: u32, height: u32, occupied: F) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            if occupied(x, y) {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    fn in_rect(x: u32, y: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> bool {
        x >= x0 && x < x1 && y >= y0 && y < y1
    }

    fn classify(image: &RgbaImage, selection: &RegionSelection) -> AreaOutcome {
        let surface = LayeredSurface::new(image).unwrap();
        let info = label_connected_components(&surface, &selection.points_to_identify());
        classify_regions(&info, selection)
    }

    #[test]
    fn square_with_two_holes() {
        let image = mask(40, 40, |x, y| {
            in_rect(x, y, 10, 10, 30, 30)
                && !in_rect(x, y, 12, 12, 15, 15)
                && !in_rect(x, y, 20, 20, 24, 22)
        });

        let outcome = classify(&image, &RegionSelection::default());
        let measurement = outcome.measurement().unwrap();

        assert_eq!(measurement.leaf_area_pixels, 400 - 9 - 8);
        assert_eq!(measurement.consumed_area_pixels, 17);
        assert_eq!(measurement.holes.len(), 2);
        assert_eq!(measurement.background_label, crate::labeling::OUTSIDE_LABEL);
        assert_eq!(measurement.background_area_pixels, 1600 - 400);
        assert_eq!(measurement.total_area_pixels(), 1600);
        assert_approx_eq!(measurement.percent_consumed(), 17.0 / 400.0 * 100.0, 1e-9);
    }

    #[test]
    fn excluded_hole_is_not_consumed() {
        let image = mask(40, 40, |x, y| {
            in_rect(x, y, 10, 10, 30, 30)
                && !in_rect(x, y, 12, 12, 15, 15)
                && !in_rect(x, y, 20, 20, 24, 22)
        });
        let selection = RegionSelection {
            leaf_point: None,
            excluded_points: vec![Point::new(13, 13)],
        };

        let outcome = classify(&image, &selection);
        let measurement = outcome.measurement().unwrap();

        assert_eq!(measurement.consumed_area_pixels, 8);
        assert_eq!(measurement.holes.len(), 1);
        assert_eq!(measurement.leaf_area_pixels, 383);
        assert_eq!(measurement.background_area_pixels, 1600 - 383 - 8);
        assert_eq!(measurement.total_area_pixels(), 1600);
    }

    #[test]
    fn leaf_point_picks_a_smaller_blob() {
        // Large solid blob on the left, small blob with a hole on the right
        let image = mask(50, 20, |x, y| {
            in_rect(x, y, 2, 2, 20, 18) || (in_rect(x, y, 30, 5, 40, 15) && !in_rect(x, y, 34, 9, 36, 11))
        });

        let default_outcome = classify(&image, &RegionSelection::default());
        let default_measurement = default_outcome.measurement().unwrap();
        assert_eq!(default_measurement.leaf_area_pixels, 18 * 16);
        assert_eq!(default_measurement.consumed_area_pixels, 0);

        let selection = RegionSelection {
            leaf_point: Some(Point::new(31, 6)),
            excluded_points: Vec::new(),
        };
        let outcome = classify(&image, &selection);
        let measurement = outcome.measurement().unwrap();
        assert_eq!(measurement.leaf_area_pixels, 100 - 4);
        assert_eq!(measurement.consumed_area_pixels, 4);
        assert_eq!(measurement.total_area_pixels(), 1000);
    }

    #[test]
    fn leaf_point_on_background_falls_back_to_largest() {
        let image = mask(20, 20, |x, y| in_rect(x, y, 5, 5, 15, 15));
        let selection = RegionSelection {
            leaf_point: Some(Point::new(0, 0)),
            excluded_points: Vec::new(),
        };

        let outcome = classify(&image, &selection);
        assert_eq!(outcome.measurement().unwrap().leaf_area_pixels, 100);
    }

    #[test]
    fn drawn_edges_count_as_consumed() {
        let base = mask(20, 20, |x, y| in_rect(x, y, 5, 5, 15, 15));
        let drawing = mask(20, 20, |x, y| in_rect(x, y, 15, 5, 17, 15));
        let surface = LayeredSurface::new(&base).unwrap().with_layer(&drawing).unwrap();
        let info = label_connected_components(&surface, &[]);

        let outcome = classify_regions(&info, &RegionSelection::default());
        let measurement = outcome.measurement().unwrap();
        assert_eq!(measurement.leaf_area_pixels, 100);
        assert_eq!(measurement.consumed_area_pixels, 20);
        assert_eq!(measurement.total_area_pixels(), 400);
    }

    #[test]
    fn degenerate_images() {
        let blank = mask(10, 10, |_, _| false);
        assert_eq!(classify(&blank, &RegionSelection::default()), AreaOutcome::NoLeafFound);

        let solid = mask(10, 10, |_, _| true);
        assert_eq!(classify(&solid, &RegionSelection::default()), AreaOutcome::SolidImage);
    }

    #[test]
    fn largest_empty_region_is_background_when_nothing_touches_the_border() {
        // Solid frame with a big interior pocket and a small hole in the frame
        let image = mask(30, 30, |x, y| !in_rect(x, y, 3, 3, 20, 20) && !in_rect(x, y, 24, 24, 26, 26));

        let outcome = classify(&image, &RegionSelection::default());
        let measurement = outcome.measurement().unwrap();
        assert_eq!(measurement.consumed_area_pixels, 4);
        assert_eq!(measurement.background_area_pixels, 17 * 17);
        assert_eq!(measurement.total_area_pixels(), 900);
    }

    #[test]
    fn enclosed_pocket_larger_than_the_border_is_background() {
        // Ring of tissue one pixel in from the edge around a 14x14 pocket
        let image = mask(20, 20, |x, y| in_rect(x, y, 1, 1, 19, 19) && !in_rect(x, y, 3, 3, 17, 17));
        let surface = LayeredSurface::new(&image).unwrap();
        let info = label_connected_components(&surface, &[Point::new(10, 10)]);
        let pocket = info.label_of_point(&Point::new(10, 10)).unwrap();

        let outcome = classify_regions(&info, &RegionSelection::default());
        let measurement = outcome.measurement().unwrap();

        assert_eq!(measurement.background_label, pocket);
        assert_eq!(measurement.background_area_pixels, 14 * 14);
        assert!(measurement.holes.iter().all(|hole| hole.label != pocket));
        assert_eq!(measurement.leaf_area_pixels, 18 * 18 - 14 * 14);
        // The 76-pixel frame outside the ring borders the leaf and is smaller
        assert_eq!(measurement.holes.len(), 1);
        assert_eq!(measurement.holes[0].label, crate::labeling::OUTSIDE_LABEL);
        assert_eq!(measurement.consumed_area_pixels, 400 - 18 * 18);
        assert_eq!(measurement.total_area_pixels(), 400);
    }
}
