use std::fs;
use std::path::{Path, PathBuf};
use csv::Writer;
use serde::Serialize;

use crate::errors::Result;
use crate::homography::PointF;
use crate::labeling::Point;
use crate::pipeline::{MeasurementReport, PhysicalAreas, ScaleStatus};
use crate::regions::{AreaOutcome, HoleRegion};

pub const RESULTS_FILENAME: &str = "results.csv";

/// One row of the results table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    pub filename: String,
    /// `measured`, `no_leaf_found` or `solid_image`
    pub status: &'static str,
    pub threshold: f32,
    pub scale_status: ScaleStatus,
    pub leaf_area_pixels: u64,
    pub consumed_area_pixels: u64,
    pub background_area_pixels: u64,
    pub hole_count: usize,
    pub percent_consumed: f64,
    pub areas: Option<PhysicalAreas>,
}

impl ResultRecord {
    pub fn from_report(filename: &str, report: &MeasurementReport) -> Self {
        let status = match report.outcome {
            AreaOutcome::Measured(_) => "measured",
            AreaOutcome::NoLeafFound => "no_leaf_found",
            AreaOutcome::SolidImage => "solid_image",
        };
        let measurement = report.measurement();

        Self {
            filename: filename.to_string(),
            status,
            threshold: report.threshold,
            scale_status: report.scale_status,
            leaf_area_pixels: measurement.map_or(0, |m| m.leaf_area_pixels),
            consumed_area_pixels: measurement.map_or(0, |m| m.consumed_area_pixels),
            background_area_pixels: measurement.map_or(0, |m| m.background_area_pixels),
            hole_count: measurement.map_or(0, |m| m.holes.len()),
            percent_consumed: measurement.map_or(0.0, |m| m.percent_consumed()),
            areas: report.areas.clone(),
        }
    }
}

fn scale_status_name(status: ScaleStatus) -> &'static str {
    match status {
        ScaleStatus::Detected => "detected",
        ScaleStatus::Manual => "manual",
        ScaleStatus::NotFound => "not_found",
        ScaleStatus::Disabled => "disabled",
    }
}

/// Write all records to `results.csv` in `output_dir`. Physical areas are
/// left blank for images measured in pixels only.
pub fn write_results_csv<P: AsRef<Path>>(records: &[ResultRecord], output_dir: P) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(RESULTS_FILENAME);

    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(&output_path)?;

    writer.write_record([
        "Filename",
        "Status",
        "Threshold",
        "Scale_Status",
        "Leaf_Area_Pixels",
        "Consumed_Area_Pixels",
        "Background_Area_Pixels",
        "Hole_Count",
        "Percent_Consumed",
        "Leaf_Area",
        "Consumed_Area",
        "Leaf_Area_Including_Consumed",
        "Unit",
    ])?;

    for record in records {
        let (leaf_area, consumed_area, including, unit) = match &record.areas {
            Some(areas) => (
                format!("{:.6}", areas.leaf_area),
                format!("{:.6}", areas.consumed_area),
                format!("{:.6}", areas.leaf_area_including_consumed),
                areas.unit.clone(),
            ),
            None => (String::new(), String::new(), String::new(), String::new()),
        };

        writer.write_record(&[
            record.filename.clone(),
            record.status.to_string(),
            format!("{:.4}", record.threshold),
            scale_status_name(record.scale_status).to_string(),
            record.leaf_area_pixels.to_string(),
            record.consumed_area_pixels.to_string(),
            record.background_area_pixels.to_string(),
            record.hole_count.to_string(),
            format!("{:.4}", record.percent_consumed),
            leaf_area,
            consumed_area,
            including,
            unit,
        ])?;
    }

    writer.flush()?;

    Ok(output_path)
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    record: &'a ResultRecord,
    leaf_member_point: Option<Point>,
    holes: &'a [HoleRegion],
    scale_marks: Option<&'a [PointF; 4]>,
    scale_mark_pixel_length: Option<f64>,
}

/// Detailed per-image report as `<filename>.json` in `output_dir`
pub fn write_json_report<P: AsRef<Path>>(
    report: &MeasurementReport,
    filename: &str,
    output_dir: P,
) -> Result<PathBuf> {
    let output_path = output_dir.as_ref().join(format!("{}.json", filename));
    if let Some(parent) = output_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let record = ResultRecord::from_report(filename, report);
    let measurement = report.measurement();
    let json = JsonReport {
        record: &record,
        leaf_member_point: measurement.map(|m| m.leaf_member_point),
        holes: measurement.map(|m| m.holes.as_slice()).unwrap_or_default(),
        scale_marks: report.scale_marks.as_ref(),
        scale_mark_pixel_length: report.scale_mark_pixel_length,
    };

    fs::write(&output_path, serde_json::to_string_pretty(&json)?)?;
    Ok(output_path)
}
