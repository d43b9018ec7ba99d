//! Frame preprocessing before OCR
//!
//! VIN plates are small, often embossed or etched, and shot at an angle.
//! Upscaling and boosting contrast before recognition noticeably raises the
//! hit rate.

use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

use crate::capture::frame::CapturedFrame;
use crate::config::OcrPreprocessing;
use crate::error::OcrError;

/// Apply the configured filters and return the frame handed to the OCR engine
pub fn prepare_frame(frame: &CapturedFrame, settings: &OcrPreprocessing) -> Result<CapturedFrame, OcrError> {
    if !settings.enabled {
        return Ok(frame.clone());
    }

    let rgba = frame.to_rgba_image().ok_or_else(|| {
        OcrError::Image(format!(
            "frame buffer of {} bytes does not match {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;

    debug!(
        "Preprocessing {}x{} frame: scale={}, contrast={}, sharpen={}, grayscale={}, invert={}",
        frame.width, frame.height, settings.scale, settings.contrast, settings.sharpen, settings.grayscale, settings.invert
    );

    let mut image = DynamicImage::ImageRgba8(rgba);

    // Upscale first so the later filters work on the final resolution
    if settings.scale > 1 {
        image = image.resize_exact(
            frame.width * settings.scale,
            frame.height * settings.scale,
            FilterType::Triangle,
        );
    }

    if (settings.contrast - 1.0).abs() > 0.01 {
        // image expects a percentage where 0.0 leaves contrast unchanged
        image = image.adjust_contrast((settings.contrast - 1.0) * 100.0);
    }

    if settings.sharpen > 0.01 {
        image = image.unsharpen(settings.sharpen * 2.0, 1);
    }

    if settings.grayscale {
        image = DynamicImage::ImageLuma8(image.to_luma8());
    }

    if settings.invert {
        image.invert();
    }

    let mut prepared = CapturedFrame::from_image(&image);
    prepared.timestamp = frame.timestamp;
    Ok(prepared)
}
