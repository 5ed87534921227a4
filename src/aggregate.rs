use crate::models::{AggregatedResult, Detection};

pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.5;

/// Applies the confidence floor and reduces detections to count + mean confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceAggregator {
    floor: f64,
}

impl ConfidenceAggregator {
    pub fn new(floor: f64) -> Self {
        Self { floor }
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn aggregate(&self, raw: Vec<Detection>) -> AggregatedResult {
        aggregate(raw, self.floor)
    }
}

impl Default for ConfidenceAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_FLOOR)
    }
}

/// Keep detections with `confidence >= floor`, in their original order.
/// The mean is exactly 0.0 when nothing survives. `class_id` never affects filtering.
pub fn aggregate(raw: Vec<Detection>, floor: f64) -> AggregatedResult {
    let detections: Vec<Detection> = raw
        .into_iter()
        .filter(|d| d.confidence >= floor)
        .collect();

    if detections.is_empty() {
        return AggregatedResult::empty();
    }

    let total: f64 = detections.iter().map(|d| d.confidence).sum();
    let mean_confidence = total / detections.len() as f64;

    AggregatedResult {
        count: detections.len() as u32,
        mean_confidence,
        detections,
    }
}
