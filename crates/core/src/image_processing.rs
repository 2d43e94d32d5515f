//! Image cropping and encoding utilities.
//!
//! # Coordinate Mapping
//!
//! Overlays report selections in logical pixels (e.g., 1920x1080) while the
//! captured frame is at physical resolution (e.g., 3840x2160). Crops are
//! scaled by the display's scale factor before touching pixels.

use crate::error::{AppError, Result};
use crate::geometry::Rect;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;

/// Image processing utilities for the capture workflow.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Crops `frame` to a logical `selection` on a display with `scale`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ImageProcessing`] if the clamped region is empty.
    pub fn crop_selection(frame: &DynamicImage, selection: Rect, scale: f32) -> Result<RgbaImage> {
        let region = selection
            .to_physical(scale)
            .clamp_to(frame.width(), frame.height());

        if region.is_empty() {
            return Err(AppError::image("selection lies outside the captured frame"));
        }

        // Crop the image (immutable operation, returns new image)
        Ok(frame
            .crop_imm(region.x, region.y, region.width, region.height)
            .to_rgba8())
    }

    /// Encodes an RGBA image as PNG bytes.
    ///
    /// PNG keeps annotated screenshots lossless.
    pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer: Vec<u8> = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| AppError::image(format!("Failed to encode image: {}", e)))?;
        Ok(buffer)
    }

    /// Decodes PNG bytes produced by [`Self::encode_png`].
    pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage> {
        let image = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
        Ok(image.to_rgba8())
    }
}
