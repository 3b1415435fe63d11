use std::fmt;
use std::sync::Arc;

use image::RgbaImage;

/// Bounding box a preview is scaled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: u32,
    pub height: u32,
}

impl Bounds {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }
}

/// A decoded, downscaled bitmap.
///
/// Cloning shares the pixel buffer; the memory is released when the last
/// holder (cache entry, Item, or display slot) drops its handle. Pixels are
/// never mutated after construction.
#[derive(Clone)]
pub struct PreviewImage {
    pixels: Arc<RgbaImage>,
}

impl PreviewImage {
    pub fn new(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// True when both handles point at the same decoded buffer.
    pub fn same_image(&self, other: &PreviewImage) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Number of live handles to the underlying buffer.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.pixels)
    }
}

impl fmt::Debug for PreviewImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewImage")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}
