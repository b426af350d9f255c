//! End-to-end measurement of one photo.
//!
//! Preparation resizes the photo, picks a threshold, finds the scale and
//! straightens the image. Measurement then binarizes the prepared image,
//! stacks the user's drawing on top, labels it, classifies regions and
//! renders the visualization. The split lets a caller re-measure after each
//! drawing edit without repeating the perspective correction.

use image::RgbaImage;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::Config;
use crate::drawing::{compose_visualization, draw_marker, draw_quadrilateral};
use crate::errors::Result;
use crate::flood_fill::{flood_fill, OverlaySink};
use crate::homography::{correct_perspective, PointF};
use crate::image_io::resize_to_fit;
use crate::labeling::label_connected_components;
use crate::layered::LayeredSurface;
use crate::regions::{classify_regions, AreaOutcome, LeafMeasurement, RegionSelection};
use crate::scale::{detect_scale_marks, pixels_to_units2, ScaleDetection};
use crate::threshold::{apply_threshold, LumaHistogram};

const MARKER_ARM: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleStatus {
    /// Marks found automatically and the image was corrected
    Detected,
    /// Marks supplied by the caller and the image was corrected
    Manual,
    /// Detection ran but found no usable square
    NotFound,
    /// Detection switched off and no marks supplied
    Disabled,
}

/// A photo ready for (repeated) measurement
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// The resized photo, perspective corrected when the scale was found
    pub image: RgbaImage,
    pub threshold: f32,
    pub scale_status: ScaleStatus,
    /// Scale-mark centers in the resized, uncorrected photo
    pub scale_marks: Option<[PointF; 4]>,
    /// Side of the scale square in pixels of `image`
    pub scale_mark_pixel_length: Option<f64>,
}

/// What the user added on top of the photo
#[derive(Debug, Clone, Default)]
pub struct MeasurementRequest {
    /// User-edit layer with the same dimensions as the prepared image
    pub drawing: Option<RgbaImage>,
    pub selection: RegionSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhysicalAreas {
    pub leaf_area: f64,
    pub consumed_area: f64,
    pub leaf_area_including_consumed: f64,
    pub unit: String,
}

#[derive(Debug, Clone)]
pub struct MeasurementReport {
    pub threshold: f32,
    pub scale_status: ScaleStatus,
    pub scale_marks: Option<[PointF; 4]>,
    pub scale_mark_pixel_length: Option<f64>,
    pub outcome: AreaOutcome,
    pub areas: Option<PhysicalAreas>,
    pub visualization: Option<RgbaImage>,
}

impl MeasurementReport {
    pub fn measurement(&self) -> Option<&LeafMeasurement> {
        self.outcome.measurement()
    }
}

/// Resize, threshold and, when possible, straighten a photo.
///
/// `manual_marks` (pixel-index centers in the resized photo) take
/// precedence over automatic detection. A failed correction is not an
/// error: the uncorrected photo is measured and the status says so.
pub fn prepare_image(
    photo: &RgbaImage,
    config: &Config,
    manual_marks: Option<[PointF; 4]>,
) -> Result<PreparedImage> {
    let resized = resize_to_fit(photo, config.max_image_dimension);

    let threshold = match config.threshold {
        Some(threshold) => threshold,
        None => LumaHistogram::from_surface(&resized).otsu_threshold(),
    };
    debug!("Using threshold {:.3}", threshold);

    let (marks, found_status) = match manual_marks {
        Some(marks) => (Some(marks), ScaleStatus::Manual),
        None if config.detect_scale => {
            let binary = apply_threshold(&resized, threshold, config.use_black_background);
            let detection = detect_scale_marks(
                &binary,
                config.scale_mark_min_pixels,
                config.scale_mark_max_pixels,
            );
            match detection {
                ScaleDetection::Found(marks) => (Some(marks), ScaleStatus::Detected),
                ScaleDetection::NotFound => (None, ScaleStatus::NotFound),
            }
        }
        None => (None, ScaleStatus::Disabled),
    };

    let Some(marks) = marks else {
        if found_status == ScaleStatus::NotFound {
            warn!("Scale not found, measuring in pixels only");
        }
        return Ok(PreparedImage {
            image: resized,
            threshold,
            scale_status: found_status,
            scale_marks: None,
            scale_mark_pixel_length: None,
        });
    };

    match correct_perspective(&resized, &marks, config.max_corrected_size) {
        Some(corrected) => {
            debug!(
                "Corrected to {}x{}, scale mark length {} px",
                corrected.image.width(),
                corrected.image.height(),
                corrected.scale_mark_pixel_length
            );
            Ok(PreparedImage {
                image: corrected.image,
                threshold,
                scale_status: found_status,
                scale_marks: Some(marks),
                scale_mark_pixel_length: Some(corrected.scale_mark_pixel_length),
            })
        }
        None => {
            warn!("Scale marks {:?} do not form a usable square", marks);
            Ok(PreparedImage {
                image: resized,
                threshold,
                scale_status: ScaleStatus::NotFound,
                scale_marks: None,
                scale_mark_pixel_length: None,
            })
        }
    }
}

/// Measure leaf area and herbivory on a prepared image
pub fn measure_prepared(
    prepared: &PreparedImage,
    config: &Config,
    request: &MeasurementRequest,
) -> Result<MeasurementReport> {
    let binary = apply_threshold(&prepared.image, prepared.threshold, config.use_black_background);

    let mut surface = LayeredSurface::new(&binary)?;
    if let Some(drawing) = &request.drawing {
        surface.add_layer(drawing)?;
    }

    let info = label_connected_components(&surface, &request.selection.points_to_identify());
    let outcome = classify_regions(&info, &request.selection);

    let areas = match (outcome.measurement(), prepared.scale_mark_pixel_length) {
        (Some(measurement), Some(scale_pixels)) => {
            let to_units = |pixels| pixels_to_units2(pixels, scale_pixels, config.scale_mark_length);
            Some(PhysicalAreas {
                leaf_area: to_units(measurement.leaf_area_pixels),
                consumed_area: to_units(measurement.consumed_area_pixels),
                leaf_area_including_consumed: to_units(
                    measurement.leaf_area_including_consumed_pixels(),
                ),
                unit: config.unit.clone(),
            })
        }
        _ => None,
    };

    match (&outcome, &areas) {
        (AreaOutcome::Measured(measurement), Some(areas)) => info!(
            "Leaf {:.3} {unit}2, consumed {:.3} {unit}2 ({:.2}%)",
            areas.leaf_area,
            areas.consumed_area,
            measurement.percent_consumed(),
            unit = areas.unit
        ),
        (AreaOutcome::Measured(measurement), None) => info!(
            "Leaf {} px, consumed {} px ({:.2}%)",
            measurement.leaf_area_pixels,
            measurement.consumed_area_pixels,
            measurement.percent_consumed()
        ),
        (AreaOutcome::NoLeafFound, _) => warn!("No leaf found, try adjusting the threshold"),
        (AreaOutcome::SolidImage, _) => warn!("Image is solid, nothing to measure"),
    }

    let visualization = config
        .save_visualization
        .then(|| render_visualization(prepared, config, request, &surface, &outcome));

    Ok(MeasurementReport {
        threshold: prepared.threshold,
        scale_status: prepared.scale_status,
        scale_marks: prepared.scale_marks,
        scale_mark_pixel_length: prepared.scale_mark_pixel_length,
        outcome,
        areas,
        visualization,
    })
}

/// Prepare and measure in one go
pub fn measure_leaf(photo: &RgbaImage, config: &Config, request: &MeasurementRequest) -> Result<MeasurementReport> {
    let prepared = prepare_image(photo, config, None)?;
    measure_prepared(&prepared, config, request)
}

fn render_visualization(
    prepared: &PreparedImage,
    config: &Config,
    request: &MeasurementRequest,
    surface: &LayeredSurface,
    outcome: &AreaOutcome,
) -> RgbaImage {
    let (width, height) = prepared.image.dimensions();
    let mut holes = RgbaImage::new(width, height);

    if let Some(measurement) = outcome.measurement() {
        let mut sink = OverlaySink::new(&mut holes, config.hole_fill_color_rgb);
        for hole in &measurement.holes {
            flood_fill(surface, hole.member_point, &mut sink);
        }

        let leaf = measurement.leaf_member_point;
        draw_marker(
            &mut holes,
            leaf.x as f32,
            leaf.y as f32,
            MARKER_ARM,
            config.marker_color_rgb,
        );
    }

    // A corrected image is the scale square, so its marks sit on the corners
    if prepared.scale_mark_pixel_length.is_some() {
        let (right, bottom) = ((width - 1) as f32, (height - 1) as f32);
        let corners = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
        draw_quadrilateral(&mut holes, &corners, config.marker_color_rgb);
        for (x, y) in corners {
            draw_marker(&mut holes, x, y, MARKER_ARM, config.marker_color_rgb);
        }
    }

    let mut overlays: Vec<&RgbaImage> = vec![&holes];
    if let Some(drawing) = &request.drawing {
        overlays.push(drawing);
    }
    compose_visualization(&prepared.image, &overlays)
}
