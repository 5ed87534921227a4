use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::detection::backend::DetectionBackend;
use crate::detection::preprocessing::NormalizedImage;
use crate::error::PipelineError;
use crate::models::Detection;

/// Bounds how many detection calls run at once across all requests
#[derive(Debug, Clone)]
pub struct DetectionPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl DetectionPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// One worker per available core
    pub fn for_available_parallelism() -> Self {
        let size = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(size)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `backend` on a blocking worker, bounded by `timeout` (queueing included).
    ///
    /// The permit moves into the worker, so a call that timed out keeps its slot until the
    /// backend actually returns.
    pub async fn run(
        &self,
        backend: Arc<dyn DetectionBackend>,
        image: Arc<NormalizedImage>,
        timeout: Duration,
    ) -> Result<Vec<Detection>, PipelineError> {
        let permits = self.permits.clone();
        let work = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PipelineError::DetectionFailure("detection pool closed".to_string()))?;

            let name = backend.name().to_string();
            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                backend.detect(&image)
            });

            match handle.await {
                Ok(Ok(detections)) => Ok(detections),
                Ok(Err(e)) => Err(PipelineError::DetectionFailure(format!("{}: {:#}", name, e))),
                Err(e) => Err(PipelineError::DetectionFailure(format!(
                    "{} backend aborted: {}",
                    name, e
                ))),
            }
        };

        match tokio::time::timeout(timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::DetectionTimeout(timeout)),
        }
    }
}

impl Default for DetectionPool {
    fn default() -> Self {
        Self::for_available_parallelism()
    }
}
