//! Connected-component labeling of a layered binary surface.
//!
//! Labeling runs in two phases. A single raster scan assigns provisional
//! labels with 4-connectivity, looking only west and north, and records
//! equivalences in a disjoint set whenever two provisional labels turn out
//! to be one blob. A separate pure normalization pass then folds every
//! equivalence class into one representative label.
//!
//! Positive labels are occupied regions, negative labels are empty ones and
//! `OUTSIDE_LABEL` is the empty region touching the image border.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::layered::{LayeredSurface, DRAWING_LAYER};
use crate::union_find::DisjointSet;

pub type Label = i32;

/// Reserved label of the empty region that touches the image border
pub const OUTSIDE_LABEL: Label = -1;

const FIRST_OCCUPIED_LABEL: Label = 1;
const FIRST_EMPTY_LABEL: Label = -2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Ordering key for "topmost": smallest y first, then smallest x
    #[inline]
    fn topmost_key(&self) -> (u32, u32) {
        (self.y, self.x)
    }
}

/// Pixel count of a region, split by the layer that occupied each pixel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub standard_part: u64,
    pub drawing_part: u64,
}

impl Size {
    pub fn new(standard_part: u64, drawing_part: u64) -> Self {
        Self {
            standard_part,
            drawing_part,
        }
    }

    pub fn total(&self) -> u64 {
        self.standard_part + self.drawing_part
    }

    /// Count one pixel. Only pixels claimed by the drawing layer go to
    /// `drawing_part`; empty pixels count as standard.
    #[inline]
    pub fn add_pixel(&mut self, layer: Option<usize>) {
        if layer == Some(DRAWING_LAYER) {
            self.drawing_part += 1;
        } else {
            self.standard_part += 1;
        }
    }
}

impl Add for Size {
    type Output = Size;

    fn add(self, other: Size) -> Size {
        Size {
            standard_part: self.standard_part + other.standard_part,
            drawing_part: self.drawing_part + other.drawing_part,
        }
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, other: Size) {
        self.standard_part += other.standard_part;
        self.drawing_part += other.drawing_part;
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Size>>(iter: I) -> Size {
        iter.fold(Size::default(), Add::add)
    }
}

/// Result of labeling. After normalization only representative labels
/// appear as keys, and every label with a member point also has a size.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    label_to_member_point: HashMap<Label, Point>,
    empty_label_to_neighboring_occupied_labels: HashMap<Label, HashSet<Label>>,
    label_to_size: HashMap<Label, Size>,
    equivalence_classes: DisjointSet<Label>,
    labels_of_points_to_identify: HashMap<Point, Label>,
}

impl ComponentInfo {
    /// The outside label, absent when no empty pixel touches the border
    pub fn outside_label(&self) -> Option<Label> {
        self.label_to_size
            .contains_key(&OUTSIDE_LABEL)
            .then_some(OUTSIDE_LABEL)
    }

    pub fn label_to_member_point(&self) -> &HashMap<Label, Point> {
        &self.label_to_member_point
    }

    pub fn label_to_size(&self) -> &HashMap<Label, Size> {
        &self.label_to_size
    }

    pub fn empty_label_to_neighboring_occupied_labels(&self) -> &HashMap<Label, HashSet<Label>> {
        &self.empty_label_to_neighboring_occupied_labels
    }

    pub fn equivalence_classes(&self) -> &DisjointSet<Label> {
        &self.equivalence_classes
    }

    pub fn labels_of_points_to_identify(&self) -> &HashMap<Point, Label> {
        &self.labels_of_points_to_identify
    }

    pub fn member_point(&self, label: Label) -> Option<Point> {
        self.label_to_member_point.get(&label).copied()
    }

    pub fn size_of(&self, label: Label) -> Option<Size> {
        self.label_to_size.get(&label).copied()
    }

    /// Occupied labels bordering an empty region, as representatives
    pub fn neighbors_of(&self, empty_label: Label) -> Option<&HashSet<Label>> {
        self.empty_label_to_neighboring_occupied_labels.get(&empty_label)
    }

    /// Final label of a point passed to the labeler
    pub fn label_of_point(&self, point: &Point) -> Option<Label> {
        self.labels_of_points_to_identify.get(point).copied()
    }

    /// Representative of the class a raw label ended up in
    pub fn representative_of(&self, label: Label) -> Option<Label> {
        self.equivalence_classes.members_of(&label).iter().copied().max()
    }

    /// Every raw label folded into `label`'s class
    pub fn class_members(&self, label: Label) -> &[Label] {
        self.equivalence_classes.members_of(&label)
    }

    pub fn occupied_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.label_to_size.keys().copied().filter(|&label| label > 0)
    }

    pub fn empty_labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.label_to_size.keys().copied().filter(|&label| label < 0)
    }

    /// Sum of all region sizes, equal to width * height of the labeled surface
    pub fn total_pixels(&self) -> u64 {
        self.label_to_size.values().map(Size::total).sum()
    }
}

/// Provisional labeling straight out of the raster scan
#[derive(Debug, Clone)]
struct ScanResult {
    label_to_member_point: HashMap<Label, Point>,
    empty_label_to_neighboring_occupied_labels: HashMap<Label, HashSet<Label>>,
    label_to_size: HashMap<Label, Size>,
    equivalence_classes: DisjointSet<Label>,
    labels_to_points_to_identify: HashMap<Label, Vec<Point>>,
}

impl ScanResult {
    fn new() -> Self {
        let mut equivalence_classes = DisjointSet::new();
        equivalence_classes.create_subset(OUTSIDE_LABEL);

        let mut empty_label_to_neighboring_occupied_labels = HashMap::new();
        empty_label_to_neighboring_occupied_labels.insert(OUTSIDE_LABEL, HashSet::new());

        let mut label_to_size = HashMap::new();
        label_to_size.insert(OUTSIDE_LABEL, Size::default());

        Self {
            label_to_member_point: HashMap::new(),
            empty_label_to_neighboring_occupied_labels,
            label_to_size,
            equivalence_classes,
            labels_to_points_to_identify: HashMap::new(),
        }
    }

    fn create_label(&mut self, label: Label, point: Point) {
        self.label_to_member_point.insert(label, point);
        self.label_to_size.insert(label, Size::default());
        if label < 0 {
            self.empty_label_to_neighboring_occupied_labels
                .insert(label, HashSet::new());
        }
        self.equivalence_classes.create_subset(label);
    }

    fn record_neighbor(&mut self, empty_label: Label, occupied_label: Label) {
        self.empty_label_to_neighboring_occupied_labels
            .entry(empty_label)
            .or_default()
            .insert(occupied_label);
    }
}

/// Label every pixel of `surface` and resolve `points_to_identify` to
/// their final labels. Points outside the surface are ignored.
pub fn label_connected_components(
    surface: &LayeredSurface,
    points_to_identify: &[Point],
) -> ComponentInfo {
    let info = normalize(scan(surface, points_to_identify));
    debug!(
        "Labeled {}x{} surface: {} occupied, {} empty regions",
        surface.width(),
        surface.height(),
        info.occupied_labels().count(),
        info.empty_labels().count()
    );
    info
}

fn scan(surface: &LayeredSurface, points_to_identify: &[Point]) -> ScanResult {
    let (width, height) = (surface.width(), surface.height());
    let mut result = ScanResult::new();

    let mut next_occupied_label = FIRST_OCCUPIED_LABEL;
    let mut next_empty_label = FIRST_EMPTY_LABEL;

    let mut row_to_points: HashMap<u32, Vec<u32>> = HashMap::new();
    for point in points_to_identify {
        if point.x < width && point.y < height {
            row_to_points.entry(point.y).or_default().push(point.x);
        }
    }

    // Previous row cache: occupancy and label per column
    let mut previous_row: Vec<(bool, Label)> = Vec::with_capacity(width as usize);
    let mut current_row: Vec<(bool, Label)> = Vec::with_capacity(width as usize);

    for y in 0..height {
        current_row.clear();

        for x in 0..width {
            let layer = surface.layer_with_pixel(x, y);
            let is_occupied = layer.is_some();

            let west = (x > 0).then(|| current_row[x as usize - 1]);
            let north = (y > 0).then(|| previous_row[x as usize]);

            let matching_west = west.filter(|&(occupied, _)| occupied == is_occupied);
            let matching_north = north.filter(|&(occupied, _)| occupied == is_occupied);

            let label = match (matching_west, matching_north) {
                (Some((_, west_label)), Some((_, north_label))) => {
                    if west_label != north_label {
                        result.equivalence_classes.union(&west_label, &north_label);
                    }
                    west_label
                }
                (Some((_, west_label)), None) => west_label,
                (None, Some((_, north_label))) => north_label,
                (None, None) => {
                    let label = if is_occupied {
                        next_occupied_label += 1;
                        next_occupied_label - 1
                    } else {
                        next_empty_label -= 1;
                        next_empty_label + 1
                    };
                    result.create_label(label, Point::new(x, y));
                    label
                }
            };

            result.label_to_size.entry(label).or_default().add_pixel(layer);

            // Occupied/empty adjacency across the west and north edges
            for (neighbor_occupied, neighbor_label) in [west, north].into_iter().flatten() {
                match (is_occupied, neighbor_occupied) {
                    (true, false) => result.record_neighbor(neighbor_label, label),
                    (false, true) => result.record_neighbor(label, neighbor_label),
                    _ => {}
                }
            }

            let on_border = x == 0 || y == 0 || x == width - 1 || y == height - 1;
            if !is_occupied && on_border {
                result.equivalence_classes.union(&label, &OUTSIDE_LABEL);
            }

            current_row.push((is_occupied, label));
        }

        if let Some(xs) = row_to_points.get(&y) {
            for &x in xs {
                let (_, label) = current_row[x as usize];
                result
                    .labels_to_points_to_identify
                    .entry(label)
                    .or_default()
                    .push(Point::new(x, y));
            }
        }

        std::mem::swap(&mut previous_row, &mut current_row);
    }

    result
}

/// Fold every equivalence class into its maximum label. Sizes are summed,
/// neighbor sets are merged and rewritten to representatives, and the
/// member point becomes the topmost one in the class. An outside label
/// whose class holds nothing else is dropped.
fn normalize(scan: ScanResult) -> ComponentInfo {
    let ScanResult {
        label_to_member_point: raw_member_points,
        empty_label_to_neighboring_occupied_labels: raw_neighbors,
        label_to_size: raw_sizes,
        mut equivalence_classes,
        labels_to_points_to_identify,
    } = scan;

    if equivalence_classes.members_of(&OUTSIDE_LABEL).len() == 1 {
        equivalence_classes.remove_singleton(&OUTSIDE_LABEL);
    }

    let mut representatives: HashMap<Label, Label> = HashMap::new();
    for class in equivalence_classes.subsets() {
        if let Some(representative) = class.iter().copied().max() {
            for &label in class {
                representatives.insert(label, representative);
            }
        }
    }

    let mut label_to_member_point: HashMap<Label, Point> = HashMap::new();
    for (label, point) in raw_member_points {
        let Some(&representative) = representatives.get(&label) else {
            continue;
        };
        label_to_member_point
            .entry(representative)
            .and_modify(|current| {
                if point.topmost_key() < current.topmost_key() {
                    *current = point;
                }
            })
            .or_insert(point);
    }

    let mut label_to_size: HashMap<Label, Size> = HashMap::new();
    for (label, size) in raw_sizes {
        if let Some(&representative) = representatives.get(&label) {
            *label_to_size.entry(representative).or_default() += size;
        }
    }

    let mut empty_label_to_neighboring_occupied_labels: HashMap<Label, HashSet<Label>> =
        HashMap::new();
    for (label, neighbors) in raw_neighbors {
        let Some(&representative) = representatives.get(&label) else {
            continue;
        };
        empty_label_to_neighboring_occupied_labels
            .entry(representative)
            .or_default()
            .extend(
                neighbors
                    .iter()
                    .filter_map(|neighbor| representatives.get(neighbor).copied()),
            );
    }

    let mut labels_of_points_to_identify = HashMap::new();
    for (label, points) in labels_to_points_to_identify {
        if let Some(&representative) = representatives.get(&label) {
            for point in points {
                labels_of_points_to_identify.insert(point, representative);
            }
        }
    }

    ComponentInfo {
        label_to_member_point,
        empty_label_to_neighboring_occupied_labels,
        label_to_size,
        equivalence_classes,
        labels_of_points_to_identify,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn fully_occupied_image_has_no_outside() {
        let image = mask(3, 3, |_, _| true);
        let surface = LayeredSurface::new(&image).unwrap();
        let info = label_connected_components(&surface, &[]);

        let occupied: Vec<Label> = info.occupied_labels().collect();
        assert_eq!(occupied.len(), 1);
        assert_eq!(info.size_of(occupied[0]), Some(Size::new(9, 0)));
        assert_eq!(info.outside_label(), None);
        assert_eq!(info.empty_labels().count(), 0);
        assert!(!info.equivalence_classes().contains(&OUTSIDE_LABEL));
    }

    #[test]
    fn diagonal_cells_stay_separate() {
        let image = mask(5, 5, |x, y| x == y);
        let surface = LayeredSurface::new(&image).unwrap();
        let info = label_connected_components(&surface, &[]);

        assert_eq!(info.occupied_labels().count(), 5);
        for label in info.occupied_labels() {
            assert_eq!(info.size_of(label).unwrap().total(), 1);
        }

        let empty: Vec<Label> = info.empty_labels().collect();
        assert_eq!(empty, vec![OUTSIDE_LABEL]);
        assert_eq!(info.size_of(OUTSIDE_LABEL), Some(Size::new(20, 0)));
        assert_eq!(info.neighbors_of(OUTSIDE_LABEL).unwrap().len(), 5);
        assert_eq!(info.total_pixels(), 25);
    }

    #[test]
    fn enclosed_hole_borders_the_blob() {
        // 5x5 block inside a 7x7 field with a single empty pixel in the middle
        let image = mask(7, 7, |x, y| (1..=5).contains(&x) && (1..=5).contains(&y) && (x, y) != (3, 3));
        let surface = LayeredSurface::new(&image).unwrap();
        let info = label_connected_components(&surface, &[Point::new(3, 3)]);

        let blob: Vec<Label> = info.occupied_labels().collect();
        assert_eq!(blob.len(), 1);
        let blob = blob[0];
        assert_eq!(info.size_of(blob).unwrap().standard_part, 24);

        let hole = info.label_of_point(&Point::new(3, 3)).unwrap();
        assert!(hole < 0 && hole != OUTSIDE_LABEL);
        assert_eq!(info.size_of(hole), Some(Size::new(1, 0)));
        assert_eq!(info.neighbors_of(hole), Some(&HashSet::from([blob])));
        assert_eq!(info.neighbors_of(OUTSIDE_LABEL), Some(&HashSet::from([blob])));
        assert_eq!(info.size_of(OUTSIDE_LABEL).unwrap().total(), 24);
        assert_eq!(info.member_point(hole), Some(Point::new(3, 3)));
    }

    #[test]
    fn merged_labels_collapse_to_maximum_and_topmost_point() {
        // A "U": two arms are discovered separately and joined by the bottom row
        let image = mask(5, 5, |x, y| {
            ((x == 1 || x == 3) && (1..=3).contains(&y)) || (y == 3 && (1..=3).contains(&x))
        });
        let surface = LayeredSurface::new(&image).unwrap();
        let points = [Point::new(1, 1), Point::new(3, 1), Point::new(2, 2), Point::new(9, 9)];
        let info = label_connected_components(&surface, &points);

        let occupied: Vec<Label> = info.occupied_labels().collect();
        assert_eq!(occupied, vec![2]);
        assert_eq!(info.size_of(2).unwrap().total(), 7);
        assert_eq!(info.member_point(2), Some(Point::new(1, 1)));
        assert_eq!(info.representative_of(1), Some(2));

        assert_eq!(info.label_of_point(&Point::new(1, 1)), Some(2));
        assert_eq!(info.label_of_point(&Point::new(3, 1)), Some(2));
        // The pocket inside the U is open to the top border
        assert_eq!(info.label_of_point(&Point::new(2, 2)), Some(OUTSIDE_LABEL));
        assert_eq!(info.label_of_point(&Point::new(9, 9)), None);
        assert!(info.label_to_member_point().keys().all(|label| info.size_of(*label).is_some()));
    }

    #[test]
    fn drawing_layer_pixels_are_counted_separately() {
        let base = mask(6, 3, |x, y| y == 1 && x <= 2);
        let drawing = mask(6, 3, |x, y| y == 1 && (2..=3).contains(&x));
        let surface = LayeredSurface::new(&base).unwrap().with_layer(&drawing).unwrap();
        let info = label_connected_components(&surface, &[Point::new(0, 1)]);

        let label = info.label_of_point(&Point::new(0, 1)).unwrap();
        // (2, 1) is claimed by the base layer first
        assert_eq!(info.size_of(label), Some(Size::new(3, 1)));
        assert_eq!(info.total_pixels(), 18);
    }

    #[test]
    fn outside_member_point_is_topmost_border_pixel() {
        let image = mask(4, 4, |x, y| x == 0 && y == 0);
        let surface = LayeredSurface::new(&image).unwrap();
        let info = label_connected_components(&surface, &[]);

        assert_eq!(info.member_point(OUTSIDE_LABEL), Some(Point::new(1, 0)));
    }

    #[test]
    fn size_arithmetic() {
        let sizes = [Size::new(1, 2), Size::new(3, 4), Size::new(0, 1)];
        let total: Size = sizes.iter().copied().sum();
        assert_eq!(total, Size::new(4, 7));
        assert_eq!(total.total(), 11);

        let mut size = Size::default();
        size.add_pixel(None);
        size.add_pixel(Some(0));
        size.add_pixel(Some(DRAWING_LAYER));
        assert_eq!(size, Size::new(2, 1));
    }
}
