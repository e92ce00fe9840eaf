use std::sync::Arc;
use anyhow::Error;
use image::{imageops, GrayImage, RgbImage};
use log::debug;
use nalgebra::Point2;
use crate::config::config::LandmarkConfig;
use crate::error::errors::LandmarkError;
use crate::utils::coordinate::Landmarks;

/// Contract of the 68-point landmark model. The whole input is treated as a
/// single face.
pub trait LandmarkModel: Send + Sync {
    fn predict(&self, face: &GrayImage) -> Result<Vec<Point2<f64>>, Error>;
}

#[derive(Clone)]
pub struct FaceLandmarkClient {
    model: Arc<dyn LandmarkModel>,
    min_face_size: u32,
}

impl FaceLandmarkClient {
    pub fn new(model: Arc<dyn LandmarkModel>, config: LandmarkConfig) -> Self {
        FaceLandmarkClient {
            model,
            min_face_size: config.min_face_size,
        }
    }

    /// extract predicts the facial landmarks of a face crop.
    ///
    /// # Arguments
    /// * `face` - RGB face crop
    ///
    /// # Returns
    /// * `Result<Landmarks, LandmarkError>` - 68 finite points in crop coordinates
    pub fn extract(&self, face: &RgbImage) -> Result<Landmarks, LandmarkError> {
        let (width, height) = face.dimensions();
        if width.min(height) < self.min_face_size {
            return Err(LandmarkError::CropTooSmall { width, height, min_side: self.min_face_size })
        }

        let gray = imageops::grayscale(face);
        let points = self.model.predict(&gray).map_err(LandmarkError::Model)?;
        debug!("landmark model returned {} point(s) for {}x{} crop", points.len(), width, height);

        Landmarks::new(points)
    }
}
