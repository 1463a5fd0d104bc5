//! Single-diagnosis sampler from the first demo release.
//!
//! Superseded by the ranked [`PredictionSet`](super::PredictionSet) contract;
//! kept so old report consumers can still be exercised against its output shape.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;

/// Reported accuracy of the decentralized-training model, in percent.
pub const LEGACY_ACCURACY: f64 = 96.1;

struct Prevalence {
    name: &'static str,
    probability: f64,
    base_confidence: f64,
}

const PREVALENCE: [Prevalence; 6] = [
    Prevalence { name: "Diabetic Retinopathy", probability: 0.25, base_confidence: 88.0 },
    Prevalence { name: "Glaucoma", probability: 0.15, base_confidence: 91.0 },
    Prevalence { name: "Cataract", probability: 0.20, base_confidence: 93.0 },
    Prevalence { name: "Age-related Macular Degeneration", probability: 0.12, base_confidence: 87.0 },
    Prevalence { name: "Hypertensive Retinopathy", probability: 0.08, base_confidence: 85.0 },
    Prevalence { name: "Normal", probability: 0.20, base_confidence: 96.0 },
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyDiagnosis {
    pub disease: String,
    /// Percent, within `[80, 99]`.
    pub confidence: f64,
    pub accuracy: f64,
}

#[deprecated(note = "use DiagnosisPipeline, which returns a ranked PredictionSet")]
pub fn sample_primary_diagnosis<R: Rng + ?Sized>(rng: &mut R) -> LegacyDiagnosis {
    let draw: f64 = rng.random();
    let mut cumulative = 0.0;
    let mut selected = &PREVALENCE[0];
    for entry in PREVALENCE.iter() {
        cumulative += entry.probability;
        if draw <= cumulative {
            selected = entry;
            break;
        }
    }

    let jitter = (rng.random::<f64>() - 0.5) * 8.0;
    LegacyDiagnosis {
        disease: selected.name.to_string(),
        confidence: (selected.base_confidence + jitter).clamp(80.0, 99.0),
        accuracy: LEGACY_ACCURACY,
    }
}

/// Simulated processing time grows with file size: `size / 500` ms within `[1500, 3000]`.
#[deprecated(note = "the pipeline draws latency from LatencyConfig")]
pub fn legacy_latency(file_size: usize) -> Duration {
    Duration::from_millis((file_size as u64 / 500).clamp(1500, 3000))
}
