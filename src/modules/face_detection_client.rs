use std::sync::Arc;
use anyhow::Error;
use image::RgbImage;
use log::{debug, warn};
use crate::config::config::FaceDetectionConfig;
use crate::utils::coordinate::{BoundingBox, Detection};

/// Contract of the face detection model.
pub trait FaceDetectionModel: Send + Sync {
    /// Returns zero or more face candidates with their probabilities.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, Error>;
}

#[derive(Clone)]
pub struct FaceDetectionClient {
    model: Arc<dyn FaceDetectionModel>,
    margin_ratio: f32,
}

impl FaceDetectionClient {
    pub fn new(model: Arc<dyn FaceDetectionModel>, config: FaceDetectionConfig) -> Self {
        FaceDetectionClient {
            model,
            margin_ratio: config.margin_ratio,
        }
    }

    /// locate finds the most probable face and returns its region grown by the
    /// configured margin.
    ///
    /// `Ok(None)` means no face was found. Model failures are returned as errors.
    ///
    /// # Arguments
    /// * `image` - RGB image
    ///
    /// # Returns
    /// * `Result<Option<Detection>, Error>`
    pub fn locate(&self, image: &RgbImage) -> Result<Option<Detection>, Error> {
        let candidates = self.model.detect(image)?;
        debug!("face detection returned {} candidate(s) for {}x{} image", candidates.len(), image.width(), image.height());

        let best = match select_most_probable(&candidates) {
            None => return Ok(None),
            Some(best) => best,
        };

        let expanded = expand_detection(&best, self.margin_ratio, image.width(), image.height());
        if expanded.bbox.area() <= 0.0 {
            warn!("selected face {:?} lies outside the {}x{} image", best.bbox, image.width(), image.height());
            return Ok(None)
        }
        debug!("selected face {:?} with probability {:.4}", expanded.bbox, expanded.probability);
        Ok(Some(expanded))
    }
}

/// select_most_probable picks the candidate with the highest probability,
/// ignoring candidates with an empty box or a non-finite probability. The
/// earliest candidate wins a tie.
pub fn select_most_probable(candidates: &[Detection]) -> Option<Detection> {
    candidates
        .iter()
        .filter(|d| d.probability.is_finite() && d.bbox.area() > 0.0)
        .copied()
        .reduce(|best, d| if d.probability > best.probability { d } else { best })
}

/// expand_detection truncates the box to whole pixels and grows it by
/// `margin_ratio` of its width on all four sides, clamped to the image.
pub fn expand_detection(detection: &Detection, margin_ratio: f32, width: u32, height: u32) -> Detection {
    let x1 = detection.bbox.x1.trunc();
    let y1 = detection.bbox.y1.trunc();
    let x2 = detection.bbox.x2.trunc();
    let y2 = detection.bbox.y2.trunc();
    let margin = (margin_ratio * (x2 - x1)).trunc();

    let bbox = BoundingBox::new(
        (x1 - margin).clamp(0.0, width as f32),
        (y1 - margin).clamp(0.0, height as f32),
        (x2 + margin).clamp(0.0, width as f32),
        (y2 + margin).clamp(0.0, height as f32),
    );
    Detection::new(bbox, detection.probability)
}
