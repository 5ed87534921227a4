use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Connected region found in a binarized image
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }

    /// Fraction of the bounding box covered by the region's pixels
    pub fn fill_ratio(&self) -> f32 {
        let box_area = (self.width() * self.height()) as f32;
        if box_area == 0.0 {
            return 0.0;
        }
        self.pixel_count as f32 / box_area
    }

    /// Short side over long side, 1.0 for a square box
    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width() as f32;
        let h = self.height() as f32;
        let long = w.max(h);
        if long == 0.0 {
            return 0.0;
        }
        w.min(h) / long
    }

    pub fn touches_border(&self, width: u32, height: u32) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x + 1 >= width || self.max_y + 1 >= height
    }

    /// Pixel-edge bounding box (max edges are exclusive)
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox {
            x1: self.min_x as f32,
            y1: self.min_y as f32,
            x2: (self.max_x + 1) as f32,
            y2: (self.max_y + 1) as f32,
        }
    }
}

/// Axis-aligned box in detection-image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Finite coordinates with x1 < x2 and y1 < y2
    pub fn is_well_formed(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 < self.x2
            && self.y1 < self.y2
    }
}

/// One candidate object emitted by a detection backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub class_id: u32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64, class_id: u32) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
        }
    }
}

/// Filtered detections reduced to a count and a mean confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub count: u32,
    pub mean_confidence: f64,
    pub detections: Vec<Detection>,
}

impl AggregatedResult {
    pub fn empty() -> Self {
        Self {
            count: 0,
            mean_confidence: 0.0,
            detections: Vec::new(),
        }
    }

    /// Bounding boxes in emission order, for drawing overlays
    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.detections.iter().map(|d| d.bbox).collect()
    }

    /// Count per class identifier, ascending by class
    pub fn counts_by_class(&self) -> Vec<(u32, u32)> {
        let mut counts = std::collections::BTreeMap::new();
        for detection in &self.detections {
            *counts.entry(detection.class_id).or_insert(0u32) += 1;
        }
        counts.into_iter().collect()
    }
}

/// A count typed in by a health worker, not yet checked
#[derive(Debug, Clone, PartialEq)]
pub struct ManualOverride {
    pub manual_count: i64,
    pub reason: String,
    pub created_at: OffsetDateTime,
}

impl ManualOverride {
    pub fn new(manual_count: i64, reason: impl Into<String>) -> Self {
        Self {
            manual_count,
            reason: reason.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Ai,
    Manual,
    AiWithManualOverride,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Ai => "ai",
            Provenance::Manual => "manual",
            Provenance::AiWithManualOverride => "ai_with_manual_override",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ai" => Ok(Provenance::Ai),
            "manual" => Ok(Provenance::Manual),
            "ai_with_manual_override" => Ok(Provenance::AiWithManualOverride),
            _ => Err(anyhow::anyhow!("Invalid provenance value: {}", value)),
        }
    }
}

/// The one authoritative count for a submission. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledRecord {
    pub final_count: u32,
    pub final_confidence: Option<f64>,
    pub provenance: Provenance,
    pub ai_count: Option<u32>,
    pub manual_reason: Option<String>,
}
