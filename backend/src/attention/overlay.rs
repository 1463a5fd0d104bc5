use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;

use crate::error::DiagnosisError;
use crate::ingest::{PixelBuffer, UploadedImage, decode};

pub const OVERLAY_JPEG_QUALITY: u8 = 80;

/// Gradient centre as fractions of width and height.
const CENTER: (f64, f64) = (0.6, 0.4);
/// Gradient radius as a fraction of the shorter side.
const RADIUS: f64 = 0.2;

/// (offset, [r, g, b, a]) with `a` in `[0, 1]`.
const STOPS: [(f64, [f64; 4]); 3] = [
    (0.0, [255.0, 0.0, 0.0, 0.6]),
    (0.7, [255.0, 100.0, 0.0, 0.3]),
    (1.0, [255.0, 255.0, 0.0, 0.1]),
];

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Premultiplied gradient colour at `t`; past the last stop the last colour holds.
fn gradient_at(t: f64) -> [f64; 4] {
    let t = t.clamp(0.0, 1.0);
    let premultiply = |c: [f64; 4]| [c[0] * c[3], c[1] * c[3], c[2] * c[3], c[3]];

    for window in STOPS.windows(2) {
        let (start, from) = window[0];
        let (end, to) = window[1];
        if t <= end {
            let local = if end > start { (t - start) / (end - start) } else { 0.0 };
            let (from, to) = (premultiply(from), premultiply(to));
            let mut out = [0.0; 4];
            for k in 0..4 {
                out[k] = from[k] + (to[k] - from[k]) * local;
            }
            return out;
        }
    }
    premultiply(STOPS[STOPS.len() - 1].1)
}

/// Paints the mock heatmap over the image at its original resolution and
/// re-encodes it as JPEG. The gradient is purely decorative and is not aligned
/// with the numeric attention grid.
pub fn generate_heatmap_overlay(pixels: &PixelBuffer) -> Result<EncodedImage, DiagnosisError> {
    let width = pixels.width();
    let height = pixels.height();
    let cx = width as f64 * CENTER.0;
    let cy = height as f64 * CENTER.1;
    let radius = (width.min(height) as f64 * RADIUS).max(f64::EPSILON);
    let data = pixels.data();

    let composite = RgbImage::from_fn(width, height, |x, y| {
        let idx = (y as usize * width as usize + x as usize) * 4;
        let distance = ((x as f64 + 0.5 - cx).powi(2) + (y as f64 + 0.5 - cy).powi(2)).sqrt();
        let [r, g, b, a] = gradient_at(distance / radius);
        let blend = |src: f64, dst: u8| (src + dst as f64 * (1.0 - a)).round().clamp(0.0, 255.0) as u8;
        image::Rgb([blend(r, data[idx]), blend(g, data[idx + 1]), blend(b, data[idx + 2])])
    });

    let mut bytes = Vec::new();
    composite
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, OVERLAY_JPEG_QUALITY))
        .map_err(|e| DiagnosisError::AssemblyFailure(format!("overlay encoding failed: {}", e)))?;

    Ok(EncodedImage {
        bytes,
        mime_type: "image/jpeg",
    })
}

pub fn overlay_from_upload(image: &UploadedImage) -> Result<EncodedImage, DiagnosisError> {
    generate_heatmap_overlay(&decode(image)?)
}
