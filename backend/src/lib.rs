//! Retinal fundus screening backend.
//!
//! An uploaded fundus photograph is validated, decoded, resampled into a
//! normalized feature tensor and scored against eight retinal conditions.
//! The ranked predictions are paired with an attention map and a heatmap
//! overlay and frozen into a [`report::DiagnosisReport`].
//!
//! - `ingest`: upload validation and decoding
//! - `preprocess`: 224×224 ImageNet-normalized tensor
//! - `inference`: scorer, predictor, model probe and the remote backend
//! - `attention`: attention grid synthesis and overlay rendering
//! - `report`: final report assembly
//! - `pipeline`: one analysis end to end, with cooperative cancellation
//! - `session`: per-user state machine and served image objects
//! - `routes`: HTTP surface

pub mod attention;
pub mod config;
pub mod error;
pub mod inference;
pub mod ingest;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod routes;
pub mod session;

pub use error::DiagnosisError;
pub use pipeline::{AnalysisOutcome, CancelToken, DiagnosisPipeline};
pub use report::DiagnosisReport;
