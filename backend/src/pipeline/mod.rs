//! Orchestrates one analysis: ingest → preprocess → diagnose → attention → report.

mod cancel;

pub use cancel::CancelToken;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;

use crate::attention::{EncodedImage, generate_heatmap_overlay, synthesize_attention};
use crate::config::{AppConfig, BackendChoice, PipelineConfig};
use crate::error::DiagnosisError;
use crate::inference::{
    BackendOutcome, DiagnosisBackend, ModelState, RandomScorer, RemoteDiagnosisClient, RemoteError,
};
use crate::ingest::{self, UploadedImage};
use crate::preprocess::preprocess;
use crate::report::{self, DiagnosisReport, ReportContext};

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: DiagnosisReport,
    pub overlay: EncodedImage,
}

pub struct DiagnosisPipeline {
    backend: DiagnosisBackend,
    config: PipelineConfig,
    rng: Mutex<StdRng>,
}

impl DiagnosisPipeline {
    pub fn new(backend: DiagnosisBackend, config: PipelineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            backend,
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Probes the model (local) or builds the HTTP client (remote).
    pub fn from_config(config: &AppConfig) -> Result<Self, RemoteError> {
        let backend = match &config.backend {
            BackendChoice::Local => {
                let model = ModelState::probe(config.model_path.as_deref());
                let scorer = match config.pipeline.seed {
                    Some(seed) => RandomScorer::seeded(seed),
                    None => RandomScorer::new(),
                };
                DiagnosisBackend::local(Arc::new(scorer), model)
            }
            BackendChoice::Remote(url) => DiagnosisBackend::Remote(RemoteDiagnosisClient::new(
                url.clone(),
                config.pipeline.remote_timeout(),
            )?),
        };
        log::info!("Diagnosis backend ready: {}", backend.model_id());
        Ok(Self::new(backend, config.pipeline.clone()))
    }

    pub fn backend(&self) -> &DiagnosisBackend {
        &self.backend
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.config.max_upload_bytes
    }

    pub fn validate(&self, upload: &UploadedImage) -> Result<(), DiagnosisError> {
        ingest::validate(upload, self.config.max_upload_bytes)
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn run(
        &self,
        upload: &UploadedImage,
        cancel: &CancelToken,
    ) -> Result<AnalysisOutcome, DiagnosisError> {
        let started = Instant::now();

        self.validate(upload)?;
        cancel.check()?;

        let pixels = ingest::decode(upload)?;
        let overlay = generate_heatmap_overlay(&pixels)?;
        cancel.check()?;

        let features = preprocess(&pixels);
        drop(pixels);
        cancel.check()?;

        let BackendOutcome {
            mut predictions,
            advice,
        } = self.backend.diagnose(upload, &features).await?;

        let delay = {
            let unit: f64 = self.rng().random();
            self.backend.latency(&self.config.latency).sample(unit)
        };
        cancel.sleep(delay).await?;

        let primary_class = predictions
            .primary()
            .map(|p| p.class_id)
            .ok_or_else(|| DiagnosisError::AssemblyFailure("backend returned no predictions".to_string()))?;
        let attention = {
            let mut rng = self.rng();
            if self.backend.is_enhanced() {
                predictions.attach_attention(|class_id| synthesize_attention(class_id, &mut *rng));
            }
            synthesize_attention(primary_class, &mut *rng)
        };
        cancel.check()?;

        let report = report::assemble(
            predictions,
            attention,
            ReportContext {
                model_used: self.backend.model_id(),
                elapsed: started.elapsed(),
                advice,
                image_digest: upload.digest().to_string(),
            },
        )?;

        log::info!(
            "Analysis {} finished in {} ms: {} ({:.1}%) via {}",
            report.id(),
            report.processing_time_ms(),
            report.primary_diagnosis().condition,
            report.primary_diagnosis().confidence * 100.0,
            report.model_used()
        );

        Ok(AnalysisOutcome { report, overlay })
    }
}
