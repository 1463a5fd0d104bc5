/// Failures scoped to a single analysis attempt.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosisError {
    #[error("Unsupported file type: {0}. Please upload only JPEG or PNG files.")]
    InvalidFileType(String),
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    FileTooLarge { size: usize, limit: usize },
    #[error("Image could not be decoded: {0}")]
    DecodeFailure(String),
    #[error("Diagnosis model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("Report assembly failed: {0}")]
    AssemblyFailure(String),
    #[error("Analysis cancelled")]
    Cancelled,
}

impl DiagnosisError {
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosisError::InvalidFileType(_) => "InvalidFileType",
            DiagnosisError::FileTooLarge { .. } => "FileTooLarge",
            DiagnosisError::DecodeFailure(_) => "DecodeFailure",
            DiagnosisError::ModelUnavailable(_) => "ModelUnavailable",
            DiagnosisError::AssemblyFailure(_) => "AssemblyFailure",
            DiagnosisError::Cancelled => "Cancelled",
        }
    }

    /// Validation errors are reported to the user as-is and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DiagnosisError::InvalidFileType(_) | DiagnosisError::FileTooLarge { .. }
        )
    }
}

impl From<image::ImageError> for DiagnosisError {
    fn from(err: image::ImageError) -> Self {
        DiagnosisError::DecodeFailure(err.to_string())
    }
}
