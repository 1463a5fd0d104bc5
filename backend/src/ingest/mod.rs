//! Upload validation and image decoding.

mod decode;
mod upload;

pub use decode::{PixelBuffer, decode};
pub use upload::{UploadedImage, validate};

pub const ACCEPTED_MIME_TYPES: [&str; 3] = ["image/jpeg", "image/jpg", "image/png"];

/// 10 MiB.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
