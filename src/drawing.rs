//! The user-edit layer and the overlays drawn on top of a photo.
//!
//! Strokes drawn by the user close gaps in a leaf's outline. They are
//! rasterized into their own transparent layer so the labeler can tell
//! drawn pixels apart from photographed tissue.

use bresenham::Bresenham;
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::errors::{HerbivoryError, Result};
use crate::labeling::Point;

pub type Stroke = Vec<Point>;

#[derive(Debug, Clone)]
pub struct DrawingLayer {
    image: RgbaImage,
    strokes: Vec<Stroke>,
    brush_width: u32,
    color: Rgba<u8>,
}

impl DrawingLayer {
    pub fn new(width: u32, height: u32, brush_width: u32, color: [u8; 3]) -> Self {
        Self {
            image: RgbaImage::new(width, height),
            strokes: Vec::new(),
            brush_width: brush_width.max(1),
            color: Rgba([color[0], color[1], color[2], 255]),
        }
    }

    /// Wrap an existing drawing, e.g. one saved as a PNG. Every visible
    /// pixel counts as drawn.
    pub fn from_image(image: RgbaImage, color: [u8; 3]) -> Self {
        Self {
            image,
            strokes: Vec::new(),
            brush_width: 1,
            color: Rgba([color[0], color[1], color[2], 255]),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn is_empty(&self) -> bool {
        self.image.pixels().all(|pixel| pixel[3] == 0)
    }

    /// Rasterize a stroke: consecutive points are joined by lines and a
    /// single point leaves a dot.
    pub fn add_stroke(&mut self, stroke: &[Point]) {
        if stroke.is_empty() {
            return;
        }
        self.rasterize(stroke);
        self.strokes.push(stroke.to_vec());
    }

    /// Remove the last stroke. Only strokes added through `add_stroke` can
    /// be undone; a loaded image stays as it was.
    pub fn undo(&mut self) -> bool {
        if self.strokes.pop().is_none() {
            return false;
        }

        let (width, height) = self.image.dimensions();
        self.image = RgbaImage::new(width, height);
        let strokes = std::mem::take(&mut self.strokes);
        for stroke in &strokes {
            self.rasterize(stroke);
        }
        self.strokes = strokes;
        true
    }

    pub fn clear(&mut self) {
        let (width, height) = self.image.dimensions();
        self.image = RgbaImage::new(width, height);
        self.strokes.clear();
    }

    /// Rescale to new dimensions, e.g. after the photo was resized
    pub fn resized(&self, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(HerbivoryError::InvalidDimensions { width, height });
        }
        let image = imageops::resize(&self.image, width, height, imageops::FilterType::Nearest);
        Ok(Self {
            image,
            strokes: Vec::new(),
            brush_width: self.brush_width,
            color: self.color,
        })
    }

    fn rasterize(&mut self, stroke: &[Point]) {
        if let [only] = stroke {
            self.stamp(only.x as isize, only.y as isize);
            return;
        }

        for segment in stroke.windows(2) {
            let (from, to) = (segment[0], segment[1]);
            let line = Bresenham::new(
                (from.x as isize, from.y as isize),
                (to.x as isize, to.y as isize),
            );
            for (x, y) in line {
                self.stamp(x, y);
            }
            // The iterator stops short of the end point
            self.stamp(to.x as isize, to.y as isize);
        }
    }

    fn stamp(&mut self, x: isize, y: isize) {
        let offset = (self.brush_width as isize - 1) / 2;
        let rect = Rect::at((x - offset) as i32, (y - offset) as i32)
            .of_size(self.brush_width, self.brush_width);
        draw_filled_rect_mut(&mut self.image, rect, self.color);
    }
}

/// A cross marking a point of interest (leaf, scale mark)
pub fn draw_marker(image: &mut RgbaImage, x: f32, y: f32, arm: f32, color: [u8; 3]) {
    let color = Rgba([color[0], color[1], color[2], 255]);
    draw_line_segment_mut(image, (x - arm, y), (x + arm, y), color);
    draw_line_segment_mut(image, (x, y - arm), (x, y + arm), color);
    draw_cross_mut(image, color, x.round() as i32, y.round() as i32);
}

/// Outline of the scale square through its four corners, in drawing order
pub fn draw_quadrilateral(image: &mut RgbaImage, corners: &[(f32, f32); 4], color: [u8; 3]) {
    let color = Rgba([color[0], color[1], color[2], 255]);
    for index in 0..corners.len() {
        let next = (index + 1) % corners.len();
        draw_line_segment_mut(image, corners[index], corners[next], color);
    }
}

/// Photo with overlays stacked on top, in order
pub fn compose_visualization(photo: &RgbaImage, overlays: &[&RgbaImage]) -> RgbaImage {
    let mut composed = photo.clone();
    for overlay in overlays {
        imageops::overlay(&mut composed, *overlay, 0, 0);
    }
    composed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawn_pixels(layer: &DrawingLayer) -> usize {
        layer.image().pixels().filter(|p| p[3] != 0).count()
    }

    #[test]
    fn single_point_leaves_a_dot() {
        let mut layer = DrawingLayer::new(10, 10, 1, [0, 0, 255]);
        layer.add_stroke(&[Point::new(4, 5)]);

        assert_eq!(drawn_pixels(&layer), 1);
        assert_eq!(layer.image().get_pixel(4, 5), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn stroke_includes_both_end_points() {
        let mut layer = DrawingLayer::new(10, 10, 1, [0, 0, 255]);
        layer.add_stroke(&[Point::new(1, 1), Point::new(8, 1), Point::new(8, 6)]);

        assert_eq!(drawn_pixels(&layer), 8 + 5);
        assert_eq!(layer.image().get_pixel(1, 1)[3], 255);
        assert_eq!(layer.image().get_pixel(8, 6)[3], 255);
    }

    #[test]
    fn wide_brush_is_clipped_at_the_edge() {
        let mut layer = DrawingLayer::new(10, 10, 3, [0, 0, 255]);
        layer.add_stroke(&[Point::new(0, 0)]);

        assert_eq!(drawn_pixels(&layer), 4);
    }

    #[test]
    fn undo_removes_only_the_last_stroke() {
        let mut layer = DrawingLayer::new(10, 10, 1, [0, 0, 255]);
        layer.add_stroke(&[Point::new(0, 0), Point::new(3, 0)]);
        layer.add_stroke(&[Point::new(0, 5), Point::new(0, 9)]);
        assert_eq!(drawn_pixels(&layer), 4 + 5);

        assert!(layer.undo());
        assert_eq!(drawn_pixels(&layer), 4);
        assert_eq!(layer.strokes().len(), 1);

        assert!(layer.undo());
        assert!(layer.is_empty());
        assert!(!layer.undo());
    }

    #[test]
    fn overlays_cover_the_photo() {
        let photo = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 255]));
        let mut holes = RgbaImage::new(3, 3);
        holes.put_pixel(1, 1, Rgba([144, 238, 144, 255]));

        let composed = compose_visualization(&photo, &[&holes]);
        let blended = composed.get_pixel(1, 1);
        for (channel, expected) in blended.0.iter().zip([144u8, 238, 144, 255]) {
            assert!((*channel as i32 - expected as i32).abs() <= 1, "{:?}", blended);
        }
        assert_eq!(composed.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }
}
