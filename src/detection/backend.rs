use crate::detection::preprocessing::NormalizedImage;
use crate::models::Detection;

/// Anything that can turn a normalized photo into candidate pill detections.
///
/// One instance is shared by every request, hence `Send + Sync` and `&self`.
pub trait DetectionBackend: Send + Sync {
    fn detect(&self, image: &NormalizedImage) -> anyhow::Result<Vec<Detection>>;

    /// Human-readable name (used in logs)
    fn name(&self) -> &str;
}

/// Replays a fixed list of detections regardless of the image
#[derive(Debug, Clone, Default)]
pub struct FixedBackend {
    detections: Vec<Detection>,
}

impl FixedBackend {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl DetectionBackend for FixedBackend {
    fn detect(&self, _image: &NormalizedImage) -> anyhow::Result<Vec<Detection>> {
        Ok(self.detections.clone())
    }

    fn name(&self) -> &str {
        "Fixed"
    }
}

/// Reject output that breaks the backend contract instead of clamping it
pub fn check_contract(detections: &[Detection]) -> Result<(), String> {
    for (idx, detection) in detections.iter().enumerate() {
        if !detection.confidence.is_finite() || !(0.0..=1.0).contains(&detection.confidence) {
            return Err(format!(
                "detection {} has confidence {} outside [0, 1]",
                idx, detection.confidence
            ));
        }
        if !detection.bbox.is_well_formed() {
            return Err(format!(
                "detection {} has malformed box {:?}",
                idx, detection.bbox
            ));
        }
    }
    Ok(())
}
