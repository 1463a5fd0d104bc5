use shared::{ModelKind, ModelStatus};
use std::sync::Arc;

use super::model_state::ModelState;
use super::predictor::{PredictionSet, Predictor};
use super::remote::RemoteDiagnosisClient;
use super::scorer::Scorer;
use crate::config::{LatencyConfig, LatencyRange};
use crate::error::DiagnosisError;
use crate::ingest::UploadedImage;
use crate::preprocess::FeatureTensor;

#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub predictions: PredictionSet,
    pub advice: Option<String>,
}

/// The diagnosis capability. `Local` scores the feature tensor in-process;
/// `Remote` ships the raw upload to an external endpoint.
#[derive(Clone)]
pub enum DiagnosisBackend {
    Local {
        predictor: Predictor,
        model: ModelState,
    },
    Remote(RemoteDiagnosisClient),
}

impl DiagnosisBackend {
    pub fn local(scorer: Arc<dyn Scorer>, model: ModelState) -> Self {
        DiagnosisBackend::Local {
            predictor: Predictor::new(scorer),
            model,
        }
    }

    pub fn model_id(&self) -> String {
        match self {
            DiagnosisBackend::Local { model, .. } => model.model_id(),
            DiagnosisBackend::Remote(client) => client.model_id(),
        }
    }

    /// Enhanced runs attach an attention map to every retained prediction.
    pub fn is_enhanced(&self) -> bool {
        match self {
            DiagnosisBackend::Local { model, .. } => model.is_loaded(),
            DiagnosisBackend::Remote(_) => false,
        }
    }

    pub fn latency(&self, config: &LatencyConfig) -> LatencyRange {
        match self {
            DiagnosisBackend::Local { model, .. } => model.latency(config),
            DiagnosisBackend::Remote(_) => LatencyRange::none(),
        }
    }

    pub fn status(&self) -> ModelStatus {
        match self {
            DiagnosisBackend::Local { model, .. } => model.status(),
            DiagnosisBackend::Remote(client) => ModelStatus {
                loaded: true,
                kind: ModelKind::Remote,
                ready: true,
                model: client.model_id(),
            },
        }
    }

    pub async fn diagnose(
        &self,
        image: &UploadedImage,
        features: &FeatureTensor,
    ) -> Result<BackendOutcome, DiagnosisError> {
        match self {
            DiagnosisBackend::Local { predictor, .. } => Ok(BackendOutcome {
                predictions: predictor.predict(features)?,
                advice: None,
            }),
            DiagnosisBackend::Remote(client) => {
                let diagnosis = client.diagnose(image).await?;
                let predictions = diagnosis.into_prediction_set()?;
                Ok(BackendOutcome {
                    predictions,
                    advice: Some(diagnosis.advice),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::remote::fake_endpoint;
    use crate::inference::{RandomScorer, RemoteDiagnosisClient};
    use crate::ingest::PixelBuffer;
    use crate::preprocess::preprocess;
    use std::time::Duration;

    fn remote(path: &str) -> DiagnosisBackend {
        let endpoint = fake_endpoint::start().join(path).unwrap();
        DiagnosisBackend::Remote(RemoteDiagnosisClient::new(endpoint, Duration::from_secs(5)).unwrap())
    }

    fn inputs() -> (UploadedImage, FeatureTensor) {
        let image = UploadedImage::new(vec![0xFF, 0xD8, 0xFF], "image/jpeg", Some("eye.jpg".to_string()));
        let features = preprocess(&PixelBuffer::new(2, 2, vec![120; 16]).unwrap());
        (image, features)
    }

    #[actix_web::test]
    async fn remote_markdown_becomes_a_prediction_set() {
        let (image, features) = inputs();
        let outcome = remote("markdown").diagnose(&image, &features).await.unwrap();

        let primary = outcome.predictions.primary().unwrap();
        assert_eq!(primary.condition, "Glaucoma");
        assert!((primary.confidence - 0.875).abs() < 1e-9);
        assert_eq!(outcome.predictions.len(), 8);
        assert_eq!(
            outcome.advice.as_deref(),
            Some("Use prescribed drops.\nSee a specialist within 2 weeks.")
        );
    }

    #[actix_web::test]
    async fn remote_error_status_is_model_unavailable() {
        let (image, features) = inputs();
        let err = remote("fail").diagnose(&image, &features).await.unwrap_err();
        assert!(matches!(
            &err,
            DiagnosisError::ModelUnavailable(message) if message.contains("500") && message.contains("weights not loaded")
        ));
    }

    #[test]
    fn remote_backend_reports_no_latency_or_attention() {
        let backend = DiagnosisBackend::Remote(
            RemoteDiagnosisClient::new(url::Url::parse("http://10.0.0.5/diagnose").unwrap(), Duration::from_secs(1))
                .unwrap(),
        );
        assert!(!backend.is_enhanced());
        assert_eq!(backend.latency(&LatencyConfig::default()), LatencyRange::none());
        assert_eq!(backend.status().kind, ModelKind::Remote);

        let local = DiagnosisBackend::local(Arc::new(RandomScorer::seeded(1)), ModelState::Mock);
        assert_eq!(local.latency(&LatencyConfig::default()), LatencyConfig::default().mock_model);
    }
}
