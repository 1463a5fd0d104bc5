//! Final, immutable diagnosis report handed to the export collaborator.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::attention::AttentionMap;
use crate::error::DiagnosisError;
use crate::inference::{Prediction, PredictionSet};

pub const RETAINED_PREDICTIONS: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisReport {
    id: Uuid,
    created_at: DateTime<Utc>,
    model_used: String,
    processing_time_ms: u64,
    primary_diagnosis: Prediction,
    predictions: Vec<Prediction>,
    attention: AttentionMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    advice: Option<String>,
    image_digest: String,
}

impl DiagnosisReport {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn model_used(&self) -> &str {
        &self.model_used
    }

    pub fn processing_time_ms(&self) -> u64 {
        self.processing_time_ms
    }

    pub fn primary_diagnosis(&self) -> &Prediction {
        &self.primary_diagnosis
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn attention(&self) -> &AttentionMap {
        &self.attention
    }

    pub fn advice(&self) -> Option<&str> {
        self.advice.as_deref()
    }

    pub fn image_digest(&self) -> &str {
        &self.image_digest
    }
}

/// Everything the assembler needs besides the ranked predictions.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub model_used: String,
    pub elapsed: Duration,
    pub advice: Option<String>,
    pub image_digest: String,
}

pub fn assemble(
    predictions: PredictionSet,
    attention: AttentionMap,
    context: ReportContext,
) -> Result<DiagnosisReport, DiagnosisError> {
    let primary_diagnosis = predictions
        .primary()
        .cloned()
        .ok_or_else(|| DiagnosisError::AssemblyFailure("prediction set is empty".to_string()))?;

    Ok(DiagnosisReport {
        id: Uuid::new_v4(),
        created_at: Utc::now(),
        model_used: context.model_used,
        processing_time_ms: context.elapsed.as_millis() as u64,
        primary_diagnosis,
        predictions: predictions.top(RETAINED_PREDICTIONS),
        attention,
        advice: context.advice,
        image_digest: context.image_digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::synthesize_attention;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn context() -> ReportContext {
        ReportContext {
            model_used: "Mock Model (demo)".to_string(),
            elapsed: Duration::from_millis(1234),
            advice: None,
            image_digest: "abc123".to_string(),
        }
    }

    #[test]
    fn keeps_top_four_and_primary() {
        let set = PredictionSet::from_probabilities(&[0.02, 0.3, 0.05, 0.4, 0.1, 0.03, 0.06, 0.04]);
        let attention = synthesize_attention(3, &mut StdRng::seed_from_u64(0));
        let report = assemble(set, attention, context()).unwrap();

        assert_eq!(report.predictions().len(), 4);
        assert_eq!(report.primary_diagnosis().class_id, 3);
        assert_eq!(report.predictions()[0].class_id, 3);
        let ids: Vec<usize> = report.predictions().iter().map(|p| p.class_id).collect();
        assert_eq!(ids, vec![3, 1, 4, 6]);
        assert_eq!(report.processing_time_ms(), 1234);
        assert_eq!(report.model_used(), "Mock Model (demo)");
        assert_eq!(report.image_digest(), "abc123");
    }

    #[test]
    fn serializes_for_export() {
        let set = PredictionSet::from_primary(2, 0.9).unwrap();
        let attention = synthesize_attention(2, &mut StdRng::seed_from_u64(0));
        let report = assemble(set, attention, ReportContext {
            advice: Some("See a specialist".to_string()),
            ..context()
        })
        .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["primary_diagnosis"]["condition"], "Glaucoma");
        assert_eq!(json["predictions"].as_array().unwrap().len(), 4);
        assert_eq!(json["attention"].as_array().unwrap().len(), 14);
        assert_eq!(json["advice"], "See a specialist");
        assert_eq!(json["primary_diagnosis"]["severity"], "Severe");
    }
}
