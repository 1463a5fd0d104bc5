use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::ACCEPTED_MIME_TYPES;
use crate::error::DiagnosisError;

/// A user-selected file as received at the upload boundary.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    data: Arc<[u8]>,
    mime_type: String,
    file_name: Option<String>,
    digest: String,
}

impl UploadedImage {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, file_name: Option<String>) -> Self {
        let digest = Self::calculate_digest(&data);
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            file_name,
            digest,
        }
    }

    pub fn calculate_digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The same bytes as [`UploadedImage::data`], shared rather than copied.
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Checks the declared type first, then the size against `limit`.
pub fn validate(image: &UploadedImage, limit: usize) -> Result<(), DiagnosisError> {
    if !ACCEPTED_MIME_TYPES.contains(&image.mime_type()) {
        return Err(DiagnosisError::InvalidFileType(image.mime_type().to_string()));
    }
    if image.size() > limit {
        return Err(DiagnosisError::FileTooLarge {
            size: image.size(),
            limit,
        });
    }
    Ok(())
}
