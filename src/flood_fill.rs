//! Scanline flood fill over the empty pixels of a layered surface.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use log::debug;
use std::collections::HashMap;

use crate::labeling::Point;
use crate::layered::LayeredSurface;

/// Inclusive horizontal run of pixels on one row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub y: u32,
    pub x_start: u32,
    pub x_end: u32,
}

impl Span {
    pub fn len(&self) -> u64 {
        (self.x_end - self.x_start + 1) as u64
    }

    pub fn contains(&self, x: u32) -> bool {
        x >= self.x_start && x <= self.x_end
    }
}

/// Receives filled spans
pub trait SpanSink {
    fn fill_span(&mut self, span: Span);
}

impl SpanSink for Vec<Span> {
    fn fill_span(&mut self, span: Span) {
        self.push(span);
    }
}

/// Paints spans onto an RGBA overlay in a single color
pub struct OverlaySink<'a> {
    canvas: &'a mut RgbaImage,
    color: Rgba<u8>,
}

impl<'a> OverlaySink<'a> {
    pub fn new(canvas: &'a mut RgbaImage, color: [u8; 3]) -> Self {
        Self {
            canvas,
            color: Rgba([color[0], color[1], color[2], 255]),
        }
    }
}

impl SpanSink for OverlaySink<'_> {
    fn fill_span(&mut self, span: Span) {
        let rect = Rect::at(span.x_start as i32, span.y as i32).of_size(span.len() as u32, 1);
        draw_filled_rect_mut(&mut *self.canvas, rect, self.color);
    }
}

/// Rows already filled, as inclusive x ranges
#[derive(Debug, Default)]
struct FilledRanges {
    rows: HashMap<u32, Vec<(u32, u32)>>,
}

impl FilledRanges {
    fn contains(&self, x: u32, y: u32) -> bool {
        self.rows
            .get(&y)
            .map_or(false, |ranges| ranges.iter().any(|&(start, end)| x >= start && x <= end))
    }

    fn insert(&mut self, span: &Span) {
        self.rows
            .entry(span.y)
            .or_default()
            .push((span.x_start, span.x_end));
    }
}

/// Fills the 4-connected empty region containing `seed`, reporting each
/// maximal row run to `sink`. Returns the number of pixels filled, which is
/// zero when the seed is outside the surface or on an occupied pixel.
pub fn flood_fill<S: SpanSink + ?Sized>(surface: &LayeredSurface, seed: Point, sink: &mut S) -> u64 {
    let (width, height) = (surface.width(), surface.height());
    if seed.x >= width || seed.y >= height || surface.is_occupied(seed.x, seed.y) {
        debug!("Flood fill seed ({}, {}) is not an empty pixel", seed.x, seed.y);
        return 0;
    }

    let mut filled = FilledRanges::default();
    let mut worklist = vec![seed];
    let mut pixels_filled = 0u64;

    while let Some(point) = worklist.pop() {
        if filled.contains(point.x, point.y) {
            continue;
        }

        let y = point.y;
        let mut x_start = point.x;
        while x_start > 0 && !surface.is_occupied(x_start - 1, y) {
            x_start -= 1;
        }
        let mut x_end = point.x;
        while x_end + 1 < width && !surface.is_occupied(x_end + 1, y) {
            x_end += 1;
        }

        let span = Span { y, x_start, x_end };
        filled.insert(&span);
        sink.fill_span(span);
        pixels_filled += span.len();

        // Seed each empty run above and below once, at the point where the
        // neighbouring row turns from occupied (or the span start) to empty
        let neighbor_rows = [y.checked_sub(1), Some(y + 1).filter(|&row| row < height)];
        for row in neighbor_rows.into_iter().flatten() {
            let mut previous_empty = false;
            for x in x_start..=x_end {
                let empty = !surface.is_occupied(x, row);
                if empty && !previous_empty && !filled.contains(x, row) {
                    worklist.push(Point::new(x, row));
                }
                previous_empty = empty;
            }
        }
    }

    pixels_filled
}
