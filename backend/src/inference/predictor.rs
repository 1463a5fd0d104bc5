use serde::Serialize;
use shared::Severity;
use std::sync::Arc;

use super::conditions::{CONDITION_COUNT, CONDITIONS, ConditionClass};
use super::scorer::Scorer;
use crate::attention::AttentionMap;
use crate::error::DiagnosisError;
use crate::preprocess::FeatureTensor;

/// Numerically stable softmax: the maximum is subtracted before exponentiating.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|score| (score - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|exp| exp / sum).collect()
}

pub fn severity_for(condition: &ConditionClass, confidence: f64) -> Severity {
    if condition.is_healthy() || confidence <= 0.1 {
        Severity::Normal
    } else if confidence > 0.7 {
        Severity::Severe
    } else if confidence > 0.4 {
        Severity::Moderate
    } else {
        Severity::Mild
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub class_id: usize,
    pub condition: String,
    pub confidence: f64,
    pub severity: Severity,
    pub description: String,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attention: Option<AttentionMap>,
}

impl Prediction {
    fn new(condition: &ConditionClass, confidence: f64) -> Self {
        Self {
            class_id: condition.id,
            condition: condition.name.to_string(),
            confidence,
            severity: severity_for(condition, confidence),
            description: condition.description.to_string(),
            recommendations: condition
                .recommendations
                .iter()
                .map(|r| r.to_string())
                .collect(),
            attention: None,
        }
    }
}

/// One confidence per condition, summing to 1, ranked highest first.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionSet {
    entries: Vec<Prediction>,
}

impl PredictionSet {
    pub fn from_probabilities(probabilities: &[f64; CONDITION_COUNT]) -> Self {
        let mut entries: Vec<Prediction> = CONDITIONS
            .iter()
            .zip(probabilities.iter())
            .map(|(condition, &p)| Prediction::new(condition, p))
            .collect();
        entries.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        Self { entries }
    }

    /// Gives `confidence` to one class and spreads the remainder evenly over the rest.
    ///
    /// The named class is never outranked: its share is floored at the uniform
    /// `1 / CONDITION_COUNT` and it wins ties.
    pub fn from_primary(class_id: usize, confidence: f64) -> Option<Self> {
        if class_id >= CONDITION_COUNT {
            return None;
        }
        let uniform = 1.0 / CONDITION_COUNT as f64;
        let confidence = if confidence.is_finite() {
            confidence.clamp(uniform, 1.0)
        } else {
            uniform
        };
        let rest = (1.0 - confidence) / (CONDITION_COUNT - 1) as f64;
        let mut probabilities = [rest; CONDITION_COUNT];
        probabilities[class_id] = confidence;

        let mut set = Self::from_probabilities(&probabilities);
        if let Some(pos) = set.entries.iter().position(|p| p.class_id == class_id) {
            let named = set.entries.remove(pos);
            set.entries.insert(0, named);
        }
        Some(set)
    }

    pub fn primary(&self) -> Option<&Prediction> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[Prediction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_confidence(&self) -> f64 {
        self.entries.iter().map(|p| p.confidence).sum()
    }

    pub fn top(&self, n: usize) -> Vec<Prediction> {
        self.entries.iter().take(n).cloned().collect()
    }

    pub fn attach_attention<F>(&mut self, mut synthesize: F)
    where
        F: FnMut(usize) -> AttentionMap,
    {
        for entry in self.entries.iter_mut() {
            entry.attention = Some(synthesize(entry.class_id));
        }
    }
}

/// Softmax, severity and ranking over an injected scorer.
#[derive(Clone)]
pub struct Predictor {
    scorer: Arc<dyn Scorer>,
}

impl Predictor {
    pub fn new(scorer: Arc<dyn Scorer>) -> Self {
        Self { scorer }
    }

    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }

    pub fn predict(&self, features: &FeatureTensor) -> Result<PredictionSet, DiagnosisError> {
        let scores = self
            .scorer
            .score(features)
            .map_err(|e| DiagnosisError::ModelUnavailable(e.to_string()))?;
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(DiagnosisError::ModelUnavailable(format!(
                "scorer '{}' produced non-finite logits",
                self.scorer.name()
            )));
        }

        let probabilities = softmax(&scores);
        let mut ranked = [0.0; CONDITION_COUNT];
        ranked.copy_from_slice(&probabilities);
        let set = PredictionSet::from_probabilities(&ranked);
        if let Some(primary) = set.primary() {
            log::debug!(
                "Primary prediction {} ({:.3}) from scorer '{}'",
                primary.condition,
                primary.confidence,
                self.scorer.name()
            );
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::scorer::{RandomScorer, RawScores, ScorerError};
    use crate::ingest::PixelBuffer;
    use crate::preprocess::preprocess;

    struct FixedScorer(RawScores);

    impl Scorer for FixedScorer {
        fn name(&self) -> &str {
            "fixed"
        }

        fn score(&self, _features: &FeatureTensor) -> Result<RawScores, ScorerError> {
            Ok(self.0)
        }
    }

    fn features() -> FeatureTensor {
        preprocess(&PixelBuffer::new(2, 2, vec![90; 16]).unwrap())
    }

    #[test]
    fn softmax_sums_to_one_and_survives_large_logits() {
        let probabilities = softmax(&[1000.0, 999.0, -1000.0]);
        let sum: f64 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(probabilities.iter().all(|p| p.is_finite()));
        assert!(probabilities[0] > probabilities[1]);
    }

    #[test]
    fn random_predictions_sum_to_one_and_are_sorted() {
        let predictor = Predictor::new(Arc::new(RandomScorer::seeded(3)));
        let features = features();
        for _ in 0..200 {
            let set = predictor.predict(&features).unwrap();
            assert_eq!(set.len(), CONDITION_COUNT);
            assert!((set.total_confidence() - 1.0).abs() < 1e-6);
            for pair in set.entries().windows(2) {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
            for entry in set.entries() {
                assert!((0.0..=1.0).contains(&entry.confidence));
            }
        }
    }

    #[test]
    fn healthy_class_is_always_normal() {
        let healthy = &CONDITIONS[0];
        for confidence in [0.0, 0.05, 0.3, 0.55, 0.95, 1.0] {
            assert_eq!(severity_for(healthy, confidence), Severity::Normal);
        }

        let mut scores = [-5.0; CONDITION_COUNT];
        scores[0] = 5.0;
        let set = Predictor::new(Arc::new(FixedScorer(scores)))
            .predict(&features())
            .unwrap();
        let primary = set.primary().unwrap();
        assert_eq!(primary.class_id, 0);
        assert!(primary.confidence > 0.7);
        assert_eq!(primary.severity, Severity::Normal);
    }

    #[test]
    fn severity_thresholds_for_other_classes() {
        let glaucoma = &CONDITIONS[2];
        assert_eq!(severity_for(glaucoma, 0.71), Severity::Severe);
        assert_eq!(severity_for(glaucoma, 0.7), Severity::Moderate);
        assert_eq!(severity_for(glaucoma, 0.41), Severity::Moderate);
        assert_eq!(severity_for(glaucoma, 0.4), Severity::Mild);
        assert_eq!(severity_for(glaucoma, 0.11), Severity::Mild);
        assert_eq!(severity_for(glaucoma, 0.1), Severity::Normal);
        assert_eq!(severity_for(glaucoma, 0.0), Severity::Normal);
    }

    #[test]
    fn non_finite_logits_make_the_model_unavailable() {
        let mut scores = [0.0; CONDITION_COUNT];
        scores[4] = f64::NAN;
        let result = Predictor::new(Arc::new(FixedScorer(scores))).predict(&features());
        assert!(matches!(result, Err(DiagnosisError::ModelUnavailable(_))));
    }

    #[test]
    fn primary_distribution_preserves_the_softmax_invariant() {
        let set = PredictionSet::from_primary(5, 0.86).unwrap();
        assert!((set.total_confidence() - 1.0).abs() < 1e-9);
        let primary = set.primary().unwrap();
        assert_eq!(primary.class_id, 5);
        assert_eq!(primary.severity, Severity::Severe);
        assert!(PredictionSet::from_primary(8, 0.5).is_none());
    }

    #[test]
    fn named_class_stays_on_top_with_low_confidence() {
        for confidence in [0.0, 0.05, f64::NAN] {
            let set = PredictionSet::from_primary(6, confidence).unwrap();
            assert_eq!(set.primary().unwrap().class_id, 6);
            assert!((set.total_confidence() - 1.0).abs() < 1e-9);
            for pair in set.entries().windows(2) {
                assert!(pair[0].confidence >= pair[1].confidence);
            }
        }
    }

    #[test]
    fn top_keeps_ranked_prefix() {
        let mut scores = [0.0; CONDITION_COUNT];
        for (i, score) in scores.iter_mut().enumerate() {
            *score = i as f64;
        }
        let set = Predictor::new(Arc::new(FixedScorer(scores)))
            .predict(&features())
            .unwrap();
        let ids: Vec<usize> = set.top(4).iter().map(|p| p.class_id).collect();
        assert_eq!(ids, vec![7, 6, 5, 4]);
    }
}
