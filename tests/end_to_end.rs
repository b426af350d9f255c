use assert_approx_eq::assert_approx_eq;
use image::{Rgba, RgbaImage};

use leaf_herbivory_rust_lib::{
    measure_leaf, measure_prepared, prepare_image, Config, Homography, MeasurementRequest, Point,
    PointF, RegionSelection, ScaleStatus,
};

const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

fn pixel_config() -> Config {
    Config {
        detect_scale: false,
        save_visualization: false,
        ..Config::default()
    }
}

fn inside(x: u32, y: u32, x0: u32, y0: u32, width: u32, height: u32) -> bool {
    (x0..x0 + width).contains(&x) && (y0..y0 + height).contains(&y)
}

#[test]
fn black_square_is_an_intact_leaf() {
    let photo = RgbaImage::from_fn(100, 100, |x, y| {
        if inside(x, y, 25, 25, 50, 50) { BLACK } else { WHITE }
    });

    let report = measure_leaf(&photo, &pixel_config(), &MeasurementRequest::default()).unwrap();
    let measurement = report.measurement().unwrap();

    assert_eq!(report.scale_status, ScaleStatus::Disabled);
    assert_eq!(measurement.leaf_area_pixels, 2500);
    assert_eq!(measurement.consumed_area_pixels, 0);
    assert_eq!(measurement.percent_consumed(), 0.0);
    assert!(measurement.holes.is_empty());
}

#[test]
fn hole_inside_the_square_is_consumed() {
    let photo = RgbaImage::from_fn(100, 100, |x, y| {
        let leaf = inside(x, y, 25, 25, 50, 50);
        let hole = inside(x, y, 45, 45, 10, 10);
        if leaf && !hole { BLACK } else { WHITE }
    });

    let report = measure_leaf(&photo, &pixel_config(), &MeasurementRequest::default()).unwrap();
    let measurement = report.measurement().unwrap();

    assert_eq!(measurement.leaf_area_pixels, 2400);
    assert_eq!(measurement.consumed_area_pixels, 100);
    assert_eq!(measurement.holes.len(), 1);
    assert_approx_eq!(measurement.percent_consumed(), 4.0, 1e-9);
}

#[test]
fn hole_in_2500_pixels_of_tissue() {
    // 50x52 block with a 10x10 hole leaves 2500 pixels of tissue
    let photo = RgbaImage::from_fn(100, 100, |x, y| {
        let leaf = inside(x, y, 25, 24, 50, 52);
        let hole = inside(x, y, 45, 45, 10, 10);
        if leaf && !hole { BLACK } else { WHITE }
    });

    let report = measure_leaf(&photo, &pixel_config(), &MeasurementRequest::default()).unwrap();
    let measurement = report.measurement().unwrap();

    assert_eq!(measurement.leaf_area_pixels, 2500);
    assert_eq!(measurement.consumed_area_pixels, 100);
    assert_approx_eq!(measurement.percent_consumed(), 100.0 / 26.0, 1e-9);
}

#[test]
fn areas_account_for_every_pixel() {
    // Two leaves, holes in both, a hole excluded by the user and a drawn edge
    let photo = RgbaImage::from_fn(120, 80, |x, y| {
        let big = inside(x, y, 5, 5, 60, 60) && !inside(x, y, 15, 15, 8, 8) && !inside(x, y, 40, 40, 5, 5);
        let small = inside(x, y, 80, 10, 30, 30) && !inside(x, y, 90, 20, 4, 4);
        if big || small { BLACK } else { WHITE }
    });
    let drawing = RgbaImage::from_fn(120, 80, |x, y| {
        if y == 70 && (10..60).contains(&x) { Rgba([0, 0, 255, 255]) } else { Rgba([0, 0, 0, 0]) }
    });

    let selections = [
        RegionSelection::default(),
        RegionSelection {
            leaf_point: None,
            excluded_points: vec![Point::new(41, 41)],
        },
        RegionSelection {
            leaf_point: Some(Point::new(85, 15)),
            excluded_points: Vec::new(),
        },
    ];

    for selection in selections {
        for drawn in [None, Some(drawing.clone())] {
            let request = MeasurementRequest { drawing: drawn, selection: selection.clone() };
            let report = measure_leaf(&photo, &pixel_config(), &request).unwrap();
            let measurement = report.measurement().unwrap();
            assert_eq!(measurement.total_area_pixels(), 120 * 80);
        }
    }

    let excluded = RegionSelection {
        leaf_point: None,
        excluded_points: vec![Point::new(41, 41)],
    };
    let report = measure_leaf(
        &photo,
        &pixel_config(),
        &MeasurementRequest { drawing: None, selection: excluded },
    )
    .unwrap();
    assert_eq!(report.measurement().unwrap().consumed_area_pixels, 64);
}

#[test]
fn skewed_photo_is_straightened_and_calibrated() {
    // Scale-mark centers of a 10 cm square photographed at an angle
    let corners = [
        PointF::new(40.0, 30.0),
        PointF::new(250.0, 45.0),
        PointF::new(240.0, 260.0),
        PointF::new(30.0, 250.0),
    ];
    let unit_square = [
        PointF::new(0.0, 0.0),
        PointF::new(1.0, 0.0),
        PointF::new(1.0, 1.0),
        PointF::new(0.0, 1.0),
    ];
    let to_square = Homography::solve(&corners, &unit_square).unwrap();

    // The leaf covers the middle 40% of the square on both axes
    let photo = RgbaImage::from_fn(300, 300, |x, y| {
        let leaf = to_square
            .project(PointF::new(x as f64 + 0.5, y as f64 + 0.5))
            .map_or(false, |p| (0.3..0.7).contains(&p.x) && (0.3..0.7).contains(&p.y));
        let mark = corners.iter().any(|c| {
            let (cx, cy) = (c.x as u32, c.y as u32);
            inside(x, y, cx - 3, cy - 3, 6, 6)
        });
        if leaf || mark { BLACK } else { WHITE }
    });

    let config = Config {
        detect_scale: true,
        save_visualization: true,
        scale_mark_length: 10.0,
        ..Config::default()
    };

    let prepared = prepare_image(&photo, &config, None).unwrap();
    assert_eq!(prepared.scale_status, ScaleStatus::Detected);
    // Shortest edge is the bottom one, about 210.2 px
    assert_eq!(prepared.image.dimensions(), (210, 210));
    assert_approx_eq!(prepared.scale_mark_pixel_length.unwrap(), 210.0, 1e-9);

    let mut found: Vec<(f64, f64)> = prepared
        .scale_marks
        .unwrap()
        .iter()
        .map(|p| (p.x + 0.5, p.y + 0.5))
        .collect();
    found.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mut expected: Vec<(f64, f64)> = corners.iter().map(|p| (p.x, p.y)).collect();
    expected.sort_by(|a, b| a.partial_cmp(b).unwrap());
    for (f, e) in found.iter().zip(&expected) {
        assert_approx_eq!(f.0, e.0, 1e-9);
        assert_approx_eq!(f.1, e.1, 1e-9);
    }

    let report = measure_prepared(&prepared, &config, &MeasurementRequest::default()).unwrap();
    let areas = report.areas.clone().unwrap();
    // 40% of a 10 cm square on each side
    assert!((areas.leaf_area - 16.0).abs() < 1.5, "leaf area {}", areas.leaf_area);
    assert_approx_eq!(areas.consumed_area, 0.0, 1e-12);
    assert_eq!(areas.unit, "cm");
    assert_eq!(report.visualization.unwrap().dimensions(), (210, 210));
}
