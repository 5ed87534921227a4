pub mod aggregate;
pub mod config;
pub mod core;
pub mod detection;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod reconcile;

pub use aggregate::{aggregate, ConfidenceAggregator, DEFAULT_CONFIDENCE_FLOOR};
pub use config::Config;
pub use detection::{BlobBackend, DetectionBackend, DetectionPool, FixedBackend, ImagePreprocessor, ImageValidator, NormalizedImage};
pub use error::PipelineError;
pub use models::{AggregatedResult, BoundingBox, Detection, ManualOverride, Provenance, ReconciledRecord};
pub use pipeline::{Analysis, CommitOutcome, Pipeline, Submission};
pub use reconcile::{reconcile, ReconciliationEngine};
