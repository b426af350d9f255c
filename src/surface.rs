use image::{Rgba, RgbaImage};

use crate::errors::{HerbivoryError, Result};

const BYTES_PER_PIXEL: usize = 4;

/// Read-only per-pixel access to a decoded image.
///
/// Coordinates are always within `0..width` x `0..height`; callers check
/// bounds before asking.
pub trait PixelSurface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn pixel(&self, x: u32, y: u32) -> Rgba<u8>;

    /// A pixel is visible when its alpha is non-zero
    #[inline]
    fn is_visible(&self, x: u32, y: u32) -> bool {
        self.pixel(x, y)[3] != 0
    }
}

impl PixelSurface for RgbaImage {
    #[inline]
    fn width(&self) -> u32 {
        self.dimensions().0
    }

    #[inline]
    fn height(&self) -> u32 {
        self.dimensions().1
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.get_pixel(x, y)
    }
}

impl<S: PixelSurface + ?Sized> PixelSurface for &S {
    #[inline]
    fn width(&self) -> u32 {
        (**self).width()
    }

    #[inline]
    fn height(&self) -> u32 {
        (**self).height()
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        (**self).pixel(x, y)
    }

    #[inline]
    fn is_visible(&self, x: u32, y: u32) -> bool {
        (**self).is_visible(x, y)
    }
}

/// A borrowed RGBA8 buffer as handed over by a camera or decoder, with an
/// explicit row stride that may include padding.
#[derive(Debug, Clone, Copy)]
pub struct RawRgbaSurface<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    bytes_per_row: usize,
}

impl<'a> RawRgbaSurface<'a> {
    pub fn new(data: &'a [u8], width: u32, height: u32, bytes_per_row: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(HerbivoryError::InvalidDimensions { width, height });
        }

        let row_len = width as usize * BYTES_PER_PIXEL;
        if bytes_per_row < row_len {
            return Err(HerbivoryError::BufferTooSmall {
                expected: row_len,
                actual: bytes_per_row,
            });
        }

        // The last row does not need its padding
        let expected = bytes_per_row * (height as usize - 1) + row_len;
        if data.len() < expected {
            return Err(HerbivoryError::BufferTooSmall {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            width,
            height,
            bytes_per_row,
        })
    }

    /// Copy into an owned, tightly packed image
    pub fn to_rgba_image(&self) -> RgbaImage {
        RgbaImage::from_fn(self.width, self.height, |x, y| self.pixel(x, y))
    }
}

impl PixelSurface for RawRgbaSurface<'_> {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        let offset = self.bytes_per_row * y as usize + BYTES_PER_PIXEL * x as usize;
        Rgba([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn honours_row_padding() {
        // 2x2 image with 4 bytes of padding per row
        let data = [
            1, 2, 3, 255, 4, 5, 6, 0, 9, 9, 9, 9, //
            7, 8, 9, 255, 10, 11, 12, 128,
        ];
        let surface = RawRgbaSurface::new(&data, 2, 2, 12).unwrap();

        assert_eq!(surface.pixel(1, 0), Rgba([4, 5, 6, 0]));
        assert_eq!(surface.pixel(0, 1), Rgba([7, 8, 9, 255]));
        assert!(!surface.is_visible(1, 0));
        assert!(surface.is_visible(1, 1));
        assert_eq!(surface.to_rgba_image().get_pixel(1, 1), &Rgba([10, 11, 12, 128]));
    }

    #[test]
    fn rejects_broken_contracts() {
        let data = [0u8; 16];
        assert!(matches!(
            RawRgbaSurface::new(&data, 0, 2, 8),
            Err(HerbivoryError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            RawRgbaSurface::new(&data, 2, 2, 4),
            Err(HerbivoryError::BufferTooSmall { .. })
        ));
        assert!(matches!(
            RawRgbaSurface::new(&data, 2, 3, 8),
            Err(HerbivoryError::BufferTooSmall { .. })
        ));
        assert!(RawRgbaSurface::new(&data, 2, 2, 8).is_ok());
    }
}
