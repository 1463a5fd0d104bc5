//! Diagnosis backends: taxonomy, scoring, ranking and the remote translation boundary.

mod backend;
pub mod conditions;
pub mod legacy;
mod model_state;
mod predictor;
pub mod remote;
mod scorer;

pub use backend::{BackendOutcome, DiagnosisBackend};
pub use conditions::{CONDITION_COUNT, CONDITIONS, ConditionClass};
pub use model_state::{FALLBACK_MODEL_ID, MOCK_MODEL_ID, ModelState};
pub use predictor::{Prediction, PredictionSet, Predictor, severity_for, softmax};
pub use remote::{RemoteDiagnosisClient, RemoteError};
pub use scorer::{RandomScorer, RawScores, Scorer, ScorerError};
