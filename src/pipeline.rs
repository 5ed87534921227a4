use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, error, info, warn};

use crate::aggregate::ConfidenceAggregator;
use crate::config::Config;
use crate::core::db::{CommittedRecordId, PatientRef, RecordRepository, SupplementRef};
use crate::detection::{
    check_contract, visualize, DetectionBackend, DetectionPool, ImagePreprocessor, ImageValidator,
    NormalizedImage,
};
use crate::error::PipelineError;
use crate::models::{AggregatedResult, ManualOverride, ReconciledRecord};
use crate::reconcile::ReconciliationEngine;

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

/// Output of the automated pass: the image the backend saw and what survived the floor
#[derive(Debug, Clone)]
pub struct Analysis {
    pub normalized: Arc<NormalizedImage>,
    pub result: AggregatedResult,
}

/// One health-worker action: a photo, a typed count, or both
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub image: Option<Vec<u8>>,
    pub manual: Option<ManualOverride>,
}

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub id: CommittedRecordId,
    pub record: ReconciledRecord,
}

/// Request-scoped detection and reconciliation chain.
///
/// Holds only immutable configuration plus shared handles (backend, worker pool), so one
/// instance can serve concurrent submissions.
pub struct Pipeline {
    validator: ImageValidator,
    preprocessor: ImagePreprocessor,
    backend: Arc<dyn DetectionBackend>,
    pool: DetectionPool,
    aggregator: ConfidenceAggregator,
    engine: ReconciliationEngine,
    timeout: Duration,
    debug: Option<DebugConfig>,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn DetectionBackend>) -> Self {
        Self {
            validator: ImageValidator::default(),
            preprocessor: ImagePreprocessor::default(),
            backend,
            pool: DetectionPool::default(),
            aggregator: ConfidenceAggregator::default(),
            engine: ReconciliationEngine::new(),
            timeout: Duration::from_secs(10),
            debug: None,
        }
    }

    pub fn from_config(config: &Config, backend: Arc<dyn DetectionBackend>) -> Self {
        Self {
            validator: ImageValidator::from_config(&config.image),
            preprocessor: ImagePreprocessor::from_config(&config.image),
            backend,
            pool: DetectionPool::new(config.pipeline.worker_count()),
            aggregator: ConfidenceAggregator::new(config.pipeline.confidence_floor),
            engine: ReconciliationEngine::new(),
            timeout: config.pipeline.detection_timeout(),
            debug: None,
        }
    }

    pub fn with_confidence_floor(mut self, floor: f64) -> Self {
        self.aggregator = ConfidenceAggregator::new(floor);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a worker pool between several pipelines
    pub fn with_pool(mut self, pool: DetectionPool) -> Self {
        self.pool = pool;
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        self.debug = Some(DebugConfig {
            output_dir,
            enabled: true,
        });

        Ok(self)
    }

    pub fn confidence_floor(&self) -> f64 {
        self.aggregator.floor()
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Validate, preprocess, detect and aggregate one photo
    pub async fn analyze(&self, bytes: &[u8]) -> Result<Analysis, PipelineError> {
        let started = Instant::now();

        let decoded = self.validator.accept(bytes).inspect_err(|e| {
            info!(error = %e, "image rejected");
        })?;
        debug!(width = decoded.width(), height = decoded.height(), "image accepted");
        self.save_debug("00_input", &decoded);

        let normalized = Arc::new(self.preprocessor.preprocess(&decoded));
        debug!(size = self.preprocessor.target_size, "image normalized");
        if self.debug_enabled() {
            self.save_debug("01_preprocessed", &normalized.to_dynamic());
        }

        let raw = self
            .pool
            .run(self.backend.clone(), normalized.clone(), self.timeout)
            .await
            .inspect_err(|e| match e {
                PipelineError::DetectionTimeout(limit) => warn!(
                    backend = self.backend.name(),
                    timeout_ms = limit.as_millis() as u64,
                    "detection timed out"
                ),
                other => error!(backend = self.backend.name(), error = %other, "detection failed"),
            })?;

        check_contract(&raw).map_err(|reason| {
            error!(backend = self.backend.name(), %reason, "backend broke its output contract");
            PipelineError::DetectionFailure(reason)
        })?;

        let raw_count = raw.len();
        let result = self.aggregator.aggregate(raw);
        if self.debug_enabled() {
            let annotated = visualize::annotate(&normalized, &result.detections);
            self.save_debug("02_annotated", &DynamicImage::ImageRgb8(annotated));
        }

        info!(
            backend = self.backend.name(),
            raw = raw_count,
            count = result.count,
            mean_confidence = result.mean_confidence,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "detection pass complete"
        );

        Ok(Analysis { normalized, result })
    }

    /// Aggregated AI count for one photo
    pub async fn count(&self, bytes: &[u8]) -> Result<AggregatedResult, PipelineError> {
        Ok(self.analyze(bytes).await?.result)
    }

    /// Run the AI pass when a photo is present, then reconcile with the manual count.
    /// The override is checked before any detection work starts.
    pub async fn submit(&self, submission: Submission) -> Result<ReconciledRecord, PipelineError> {
        if let Some(manual) = &submission.manual {
            crate::reconcile::validate_manual_count(manual.manual_count)?;
        }

        let aggregated = match &submission.image {
            Some(bytes) => Some(self.analyze(bytes).await?.result),
            None => None,
        };

        let record = self
            .engine
            .reconcile(aggregated.as_ref(), submission.manual.as_ref())?;
        debug!(provenance = %record.provenance, final_count = record.final_count, "reconciled");

        Ok(record)
    }

    /// Full chain through to persistence. Nothing is stored unless every stage succeeded.
    pub async fn submit_and_commit<R: RecordRepository>(
        &self,
        repository: &R,
        submission: Submission,
        patient: PatientRef,
        supplement: SupplementRef,
    ) -> Result<CommitOutcome, PipelineError> {
        let record = self.submit(submission).await?;
        let id = repository
            .commit(&record, patient, supplement)
            .await
            .map_err(PipelineError::Commit)?;
        info!(%id, %patient, %supplement, provenance = %record.provenance, "record committed");
        Ok(CommitOutcome { id, record })
    }

    fn debug_enabled(&self) -> bool {
        self.debug.as_ref().is_some_and(|d| d.enabled)
    }

    /// Debug output is diagnostic only; write failures are logged, not propagated
    fn save_debug(&self, stage: &str, image: &DynamicImage) {
        let Some(debug_config) = self.debug.as_ref().filter(|d| d.enabled) else {
            return;
        };
        if let Err(e) = save_stage_image(&debug_config.output_dir, stage, image) {
            warn!(stage, error = %e, "failed to save debug image");
        }
    }
}

fn save_stage_image(output_dir: &Path, stage: &str, image: &DynamicImage) -> Result<()> {
    let stage_dir = output_dir.join(stage);
    std::fs::create_dir_all(&stage_dir)?;
    let output_path = stage_dir.join("01.png");
    image
        .save(&output_path)
        .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))?;
    debug!(path = %output_path.display(), "debug image saved");
    Ok(())
}
