use std::f64::consts::FRAC_PI_4;

use tracing::debug;

use crate::config::BlobConfig;
use crate::detection::backend::DetectionBackend;
use crate::detection::{contours, preprocessing};
use crate::detection::preprocessing::NormalizedImage;
use crate::models::{Contour, Detection};

/// Class identifier for every blob; this backend does not tell pill types apart
pub const PILL_CLASS_ID: u32 = 0;

/// Deterministic classical-vision pill detector.
///
/// Grayscale, Gaussian blur, Otsu binarization with automatic polarity, then 8-connected
/// component labelling. Each region inside the size window becomes one detection whose
/// confidence reflects how pill-like (round or oblong, solidly filled) its shape is.
#[derive(Debug, Clone)]
pub struct BlobBackend {
    pub blur_sigma: f32,
    pub min_area_fraction: f32,
    pub max_area_fraction: f32,
}

impl BlobBackend {
    pub fn new() -> Self {
        Self::from_config(&BlobConfig::default())
    }

    pub fn from_config(config: &BlobConfig) -> Self {
        Self {
            blur_sigma: config.blur_sigma,
            min_area_fraction: config.min_area_fraction,
            max_area_fraction: config.max_area_fraction,
        }
    }

    /// Pill-shaped regions with their shape confidence, in reading order
    pub fn candidate_regions(&self, image: &NormalizedImage) -> Vec<(Contour, f64)> {
        let (width, height) = (image.width(), image.height());
        let frame_area = width as f32 * height as f32;
        let min_area = (frame_area * self.min_area_fraction).max(1.0) as u32;
        let max_area = (frame_area * self.max_area_fraction) as u32;

        let gray = preprocessing::to_grayscale(image.as_rgb());
        let blurred = preprocessing::apply_blur(&gray, self.blur_sigma);
        let mask = preprocessing::foreground_mask(&blurred);
        let regions = contours::find_contours(&mask, min_area);

        debug!(
            regions = regions.len(),
            min_area, max_area, "labelled foreground regions"
        );

        regions
            .into_iter()
            .filter(|c| c.area() <= max_area)
            // Regions cut by the frame edge are usually the bottle or tray, not a pill
            .filter(|c| !c.touches_border(width, height))
            .map(|c| {
                let confidence = shape_confidence(&c);
                (c, confidence)
            })
            .collect()
    }
}

impl Default for BlobBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionBackend for BlobBackend {
    fn detect(&self, image: &NormalizedImage) -> anyhow::Result<Vec<Detection>> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("empty image");
        }

        let detections: Vec<Detection> = self
            .candidate_regions(image)
            .into_iter()
            .map(|(contour, confidence)| Detection::new(contour.bbox(), confidence, PILL_CLASS_ID))
            .collect();

        debug!(detections = detections.len(), "blob detection finished");
        Ok(detections)
    }

    fn name(&self) -> &str {
        "Blob"
    }
}

/// Score in [0, 1]: half from squareness of the box, half from how close the fill ratio is
/// to that of an ellipse inscribed in it.
pub fn shape_confidence(contour: &Contour) -> f64 {
    let aspect = contour.aspect_ratio() as f64;
    let fill = contour.fill_ratio() as f64;
    let fill_score = (1.0 - (fill - FRAC_PI_4).abs() / FRAC_PI_4).clamp(0.0, 1.0);
    (0.5 * aspect + 0.5 * fill_score).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contour(width: u32, height: u32, pixel_count: u32) -> Contour {
        Contour {
            label: 1,
            min_x: 10,
            min_y: 10,
            max_x: 10 + width - 1,
            max_y: 10 + height - 1,
            pixel_count,
        }
    }

    #[test]
    fn round_blob_scores_high() {
        // 40x40 box filled like a disc
        let disc = contour(40, 40, 1257);
        assert!(shape_confidence(&disc) > 0.95);
    }

    #[test]
    fn thin_sliver_scores_low() {
        let sliver = contour(60, 3, 60);
        assert!(shape_confidence(&sliver) < 0.5);
    }
}
