use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

use super::conditions::CONDITION_COUNT;
use crate::preprocess::FeatureTensor;

/// Raw per-class logits, indexed by condition id.
pub type RawScores = [f64; CONDITION_COUNT];

pub const MOCK_SCORE_RANGE: std::ops::Range<f64> = -5.0..5.0;

#[derive(Debug, thiserror::Error)]
pub enum ScorerError {
    #[error("Scorer state is poisoned")]
    Poisoned,
    #[error("Scoring failed: {0}")]
    Failed(String),
}

/// The replaceable scoring step: a real model plugs in here without touching
/// softmax, ranking or severity.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, features: &FeatureTensor) -> Result<RawScores, ScorerError>;
}

/// Draws independent uniform logits and ignores the features entirely.
pub struct RandomScorer {
    rng: Mutex<StdRng>,
}

impl RandomScorer {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl Scorer for RandomScorer {
    fn name(&self) -> &str {
        "random"
    }

    fn score(&self, _features: &FeatureTensor) -> Result<RawScores, ScorerError> {
        let mut rng = self.rng.lock().map_err(|_| ScorerError::Poisoned)?;
        let mut scores = [0.0; CONDITION_COUNT];
        for score in scores.iter_mut() {
            *score = rng.random_range(MOCK_SCORE_RANGE);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::PixelBuffer;
    use crate::preprocess::preprocess;

    fn features() -> FeatureTensor {
        preprocess(&PixelBuffer::new(1, 1, vec![0, 0, 0, 255]).unwrap())
    }

    #[test]
    fn scores_are_within_the_mock_range() {
        let scorer = RandomScorer::new();
        let features = features();
        for _ in 0..50 {
            let scores = scorer.score(&features).unwrap();
            assert!(scores.iter().all(|s| MOCK_SCORE_RANGE.contains(s)));
        }
    }

    #[test]
    fn seeded_scorers_repeat() {
        let features = features();
        let a = RandomScorer::seeded(42).score(&features).unwrap();
        let b = RandomScorer::seeded(42).score(&features).unwrap();
        assert_eq!(a, b);
    }
}
