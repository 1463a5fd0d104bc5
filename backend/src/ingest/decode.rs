use image::RgbaImage;

use super::UploadedImage;
use crate::error::DiagnosisError;

/// Decoded RGBA pixels, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, DiagnosisError> {
        if width == 0 || height == 0 {
            return Err(DiagnosisError::DecodeFailure(format!(
                "image has empty dimensions {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(DiagnosisError::DecodeFailure(format!(
                "expected {} RGBA bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_rgba(image: RgbaImage) -> Result<Self, DiagnosisError> {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Decodes by content rather than by the declared MIME type.
pub fn decode(image: &UploadedImage) -> Result<PixelBuffer, DiagnosisError> {
    let decoded = image::load_from_memory(image.data())?;
    log::debug!(
        "Decoded {} ({} bytes) to {}x{}",
        image.file_name().unwrap_or("upload"),
        image.size(),
        decoded.width(),
        decoded.height()
    );
    PixelBuffer::from_rgba(decoded.to_rgba8())
}
