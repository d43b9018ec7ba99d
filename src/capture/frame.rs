//! Frame data captured from a camera stream

use image::{DynamicImage, RgbaImage};
use std::time::Instant;

/// One camera frame as tightly packed RGBA8
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// `width * height * 4` bytes, row-major
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// When the snapshot was taken
    pub timestamp: Instant,
}

impl CapturedFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Render a decoded image onto an RGBA frame
    pub fn from_image(image: &DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(rgba.into_raw(), width, height)
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// View the frame as an RGBA image buffer, if the data matches the dimensions
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}
