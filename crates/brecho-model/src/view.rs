//! Decoded image views.

use std::io::Cursor;
use std::sync::Arc;

use base64::Engine;
use image::{imageops::FilterType, DynamicImage, ImageFormat, RgbImage};

use crate::error::{ModelError, ModelResult};

/// One decoded photograph of an item, as RGB8 pixels.
///
/// Cloning is cheap; the pixel buffer is shared.
#[derive(Debug, Clone)]
pub struct ImageView {
    pixels: Arc<RgbImage>,
}

impl ImageView {
    /// Decode PNG/JPEG/WebP bytes. Empty images are rejected.
    pub fn decode(bytes: &[u8]) -> ModelResult<Self> {
        if bytes.is_empty() {
            return Err(ModelError::image_decode("no image data"));
        }
        let decoded =
            image::load_from_memory(bytes).map_err(|e| ModelError::image_decode(e.to_string()))?;
        Self::from_rgb(decoded.to_rgb8())
    }

    /// Wrap an already decoded buffer. Empty images are rejected.
    pub fn from_rgb(pixels: RgbImage) -> ModelResult<Self> {
        let (width, height) = pixels.dimensions();
        if width == 0 || height == 0 {
            return Err(ModelError::EmptyImage { width, height });
        }
        Ok(Self {
            pixels: Arc::new(pixels),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Resize to exactly `width`x`height`, ignoring aspect ratio.
    pub fn resized(&self, width: u32, height: u32) -> RgbImage {
        image::imageops::resize(self.pixels.as_ref(), width, height, FilterType::Triangle)
    }

    /// Scale to cover `size`x`size` and center-crop.
    pub fn resized_to_fill(&self, size: u32) -> RgbImage {
        DynamicImage::ImageRgb8(self.pixels.as_ref().clone())
            .resize_to_fill(size, size, FilterType::Triangle)
            .to_rgb8()
    }

    /// Re-encode as JPEG and base64 it, for the multimodal oracle.
    pub fn to_jpeg_base64(&self) -> ModelResult<String> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(self.pixels.as_ref().clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .map_err(|e| ModelError::image_decode(format!("JPEG encoding failed: {}", e)))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(buf))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgb;

    /// PNG bytes of a solid-color image.
    pub(crate) fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(rgb));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_decode_png() {
        let view = ImageView::decode(&solid_png(8, 4, [200, 10, 10])).unwrap();
        assert_eq!((view.width(), view.height()), (8, 4));
        assert_eq!(view.pixels().get_pixel(0, 0).0, [200, 10, 10]);
    }

    #[test]
    fn test_decode_rejects_garbage_and_empty() {
        assert!(ImageView::decode(b"definitely not an image").unwrap_err().is_bad_image());
        assert!(ImageView::decode(&[]).unwrap_err().is_bad_image());
        assert!(matches!(
            ImageView::from_rgb(RgbImage::new(0, 5)),
            Err(ModelError::EmptyImage { .. })
        ));
    }

    #[test]
    fn test_jpeg_base64_decodes_back() {
        let view = ImageView::decode(&solid_png(16, 16, [0, 128, 255])).unwrap();
        let encoded = view.to_jpeg_base64().unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let back = ImageView::decode(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (16, 16));
    }

    #[test]
    fn test_resized_to_fill_is_square() {
        let view = ImageView::decode(&solid_png(40, 20, [1, 2, 3])).unwrap();
        let filled = view.resized_to_fill(10);
        assert_eq!(filled.dimensions(), (10, 10));
    }
}
