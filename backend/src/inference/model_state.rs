use shared::{ModelKind, ModelStatus};
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::{LatencyConfig, LatencyRange};

pub const MOCK_MODEL_ID: &str = "Mock Model (demo)";
pub const FALLBACK_MODEL_ID: &str = "Fallback Model (mock)";

/// Outcome of the startup model probe. Decided once and handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    /// No weights configured or present.
    Mock,
    /// Weights found and readable; inference runs in enhanced mode.
    Loaded { weights: PathBuf },
    /// Weights present but unusable; the mock scorer stands in.
    Unavailable { weights: PathBuf, reason: String },
}

impl ModelState {
    pub fn probe(weights: Option<&Path>) -> Self {
        let Some(path) = weights else {
            log::info!("No model weights configured, using mock inference");
            return ModelState::Mock;
        };

        match std::fs::metadata(path) {
            Err(_) => {
                log::info!(
                    "Model weights {} not found, using mock inference",
                    path.display()
                );
                ModelState::Mock
            }
            Ok(meta) if !meta.is_file() || meta.len() == 0 => {
                let reason = format!("{} is not a non-empty file", path.display());
                log::warn!("Model load failed: {}. Falling back to mock", reason);
                ModelState::Unavailable {
                    weights: path.to_path_buf(),
                    reason,
                }
            }
            Ok(meta) => match File::open(path) {
                Ok(_) => {
                    log::info!(
                        "Found model weights {} ({} bytes), enhanced inference enabled",
                        path.display(),
                        meta.len()
                    );
                    ModelState::Loaded {
                        weights: path.to_path_buf(),
                    }
                }
                Err(e) => {
                    log::warn!(
                        "Model weights {} unreadable: {}. Falling back to mock",
                        path.display(),
                        e
                    );
                    ModelState::Unavailable {
                        weights: path.to_path_buf(),
                        reason: e.to_string(),
                    }
                }
            },
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ModelState::Loaded { .. })
    }

    pub fn model_id(&self) -> String {
        match self {
            ModelState::Mock => MOCK_MODEL_ID.to_string(),
            ModelState::Loaded { weights } => {
                let file_name = weights
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| weights.display().to_string());
                format!("Swin Transformer ({})", file_name)
            }
            ModelState::Unavailable { .. } => FALLBACK_MODEL_ID.to_string(),
        }
    }

    pub fn latency(&self, config: &LatencyConfig) -> LatencyRange {
        if self.is_loaded() {
            config.loaded_model
        } else {
            config.mock_model
        }
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            loaded: self.is_loaded(),
            kind: if self.is_loaded() {
                ModelKind::Pytorch
            } else {
                ModelKind::Mock
            },
            ready: true,
            model: self.model_id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("retina-probe-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_weights_mean_mock() {
        assert_eq!(ModelState::probe(None), ModelState::Mock);
        let dir = scratch_dir("missing");
        let state = ModelState::probe(Some(&dir.join("swin.pt")));
        assert_eq!(state, ModelState::Mock);
        assert_eq!(state.model_id(), MOCK_MODEL_ID);
        assert!(!state.status().loaded);
    }

    #[test]
    fn present_weights_load() {
        let dir = scratch_dir("present");
        let path = dir.join("swin.pt");
        File::create(&path).unwrap().write_all(b"weights").unwrap();

        let state = ModelState::probe(Some(&path));
        assert!(state.is_loaded());
        assert_eq!(state.model_id(), "Swin Transformer (swin.pt)");
        let status = state.status();
        assert_eq!(status.kind, ModelKind::Pytorch);
        assert!(status.ready);
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn empty_weights_degrade_to_fallback() {
        let dir = scratch_dir("empty");
        let path = dir.join("swin.pt");
        File::create(&path).unwrap();

        let state = ModelState::probe(Some(&path));
        assert!(matches!(state, ModelState::Unavailable { .. }));
        assert_eq!(state.model_id(), FALLBACK_MODEL_ID);
        assert_eq!(state.latency(&LatencyConfig::default()), LatencyRange::new(800, 1200));
        std::fs::remove_dir_all(dir).ok();
    }
}
