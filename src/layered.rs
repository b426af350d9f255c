use crate::errors::{HerbivoryError, Result};
use crate::surface::PixelSurface;

/// Layer index of the thresholded photo
pub const STANDARD_LAYER: usize = 0;

/// Layer index of the user's drawn edits
pub const DRAWING_LAYER: usize = 1;

/// Stack of equally sized surfaces answering "is this pixel occupied, and by
/// which layer first?".
///
/// A pixel is occupied when any layer has a visible (alpha != 0) pixel
/// there. Layers are consulted in insertion order, so the base photo claims
/// a pixel before a drawing on top of it does.
pub struct LayeredSurface<'a> {
    width: u32,
    height: u32,
    layers: Vec<&'a dyn PixelSurface>,
}

impl<'a> LayeredSurface<'a> {
    pub fn new(base: &'a dyn PixelSurface) -> Result<Self> {
        let (width, height) = (base.width(), base.height());
        if width == 0 || height == 0 {
            return Err(HerbivoryError::InvalidDimensions { width, height });
        }

        Ok(Self {
            width,
            height,
            layers: vec![base],
        })
    }

    /// Stack another surface on top. It must match the base dimensions.
    pub fn add_layer(&mut self, layer: &'a dyn PixelSurface) -> Result<()> {
        if layer.width() != self.width || layer.height() != self.height {
            return Err(HerbivoryError::InvalidDimensions {
                width: layer.width(),
                height: layer.height(),
            });
        }
        self.layers.push(layer);
        Ok(())
    }

    pub fn with_layer(mut self, layer: &'a dyn PixelSurface) -> Result<Self> {
        self.add_layer(layer)?;
        Ok(self)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Index of the first layer with a visible pixel at (x, y)
    #[inline]
    pub fn layer_with_pixel(&self, x: u32, y: u32) -> Option<usize> {
        self.layers.iter().position(|layer| layer.is_visible(x, y))
    }

    #[inline]
    pub fn is_occupied(&self, x: u32, y: u32) -> bool {
        self.layer_with_pixel(x, y).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn base_layer_claims_first() {
        let mut base = RgbaImage::new(3, 1);
        base.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let mut drawing = RgbaImage::new(3, 1);
        drawing.put_pixel(0, 0, Rgba([0, 0, 255, 255]));
        drawing.put_pixel(1, 0, Rgba([0, 0, 255, 255]));

        let surface = LayeredSurface::new(&base).unwrap().with_layer(&drawing).unwrap();

        assert_eq!(surface.layer_with_pixel(0, 0), Some(STANDARD_LAYER));
        assert_eq!(surface.layer_with_pixel(1, 0), Some(DRAWING_LAYER));
        assert_eq!(surface.layer_with_pixel(2, 0), None);
        assert!(!surface.is_occupied(2, 0));
    }

    #[test]
    fn mismatched_layer_is_rejected() {
        let base = RgbaImage::new(4, 4);
        let drawing = RgbaImage::new(4, 5);
        let mut surface = LayeredSurface::new(&base).unwrap();

        assert!(surface.add_layer(&drawing).is_err());
        assert_eq!(surface.layer_count(), 1);
    }

    #[test]
    fn zero_area_base_is_rejected() {
        let base = RgbaImage::new(0, 3);
        assert!(matches!(
            LayeredSurface::new(&base),
            Err(HerbivoryError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn every_pixel_reports_its_lowest_visible_layer() {
        let base = RgbaImage::from_fn(4, 4, |x, _| Rgba([0, 0, 0, if x == 0 { 255 } else { 0 }]));
        let drawing = RgbaImage::from_fn(4, 4, |x, y| Rgba([0, 0, 255, if x <= y { 255 } else { 0 }]));
        let surface = LayeredSurface::new(&base).unwrap().with_layer(&drawing).unwrap();

        for y in 0..surface.height() {
            for x in 0..surface.width() {
                let expected = if x == 0 {
                    Some(STANDARD_LAYER)
                } else if x <= y {
                    Some(DRAWING_LAYER)
                } else {
                    None
                };
                assert_eq!(surface.layer_with_pixel(x, y), expected, "pixel ({}, {})", x, y);
                assert_eq!(surface.is_occupied(x, y), expected.is_some());
            }
        }
    }
}
