use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use log::debug;
use nalgebra::Point2;
use crate::error::errors::AlignError;
use crate::utils::coordinate::{mean_point, Detection, Landmarks};
use crate::utils::image::crop_region;

/// A face crop rotated so that its eye line is horizontal.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFace {
    image: RgbImage,
    angle: f64,
}

impl AlignedFace {
    pub fn new(image: RgbImage, angle: f64) -> Self {
        AlignedFace { image, angle }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Eye line angle in radians that was corrected.
    pub fn angle(&self) -> f64 {
        self.angle
    }
}

/// eye_centers returns the centroids of the left and right eye landmarks.
pub fn eye_centers(landmarks: &Landmarks) -> (Point2<f64>, Point2<f64>) {
    (mean_point(landmarks.left_eye()), mean_point(landmarks.right_eye()))
}

/// eye_line_angle is the angle in radians of the line from the left to the
/// right eye centre, positive when the right eye sits lower in the image.
pub fn eye_line_angle(landmarks: &Landmarks) -> f64 {
    let (left, right) = eye_centers(landmarks);
    let delta = right - left;
    delta.y.atan2(delta.x)
}

#[derive(Debug, Clone, Default)]
pub struct FaceHelper;

impl FaceHelper {
    pub fn new() -> Self {
        FaceHelper
    }

    /// crop_face cuts the detected region out of the image.
    pub fn crop_face(&self, img: &RgbImage, detection: &Detection) -> RgbImage {
        crop_region(img, &detection.bbox)
    }

    /// align rotates the face about its centre so the eyes are level.
    ///
    /// The output keeps the dimensions of the input, uncovered corners are
    /// filled black.
    ///
    /// # Arguments
    /// * `face` - RGB face crop
    /// * `landmarks` - landmarks in the coordinate space of `face`
    ///
    /// # Returns
    /// * `Result<AlignedFace, AlignError>`
    pub fn align(&self, face: &RgbImage, landmarks: &Landmarks) -> Result<AlignedFace, AlignError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(AlignError::EmptyFace)
        }
        let angle = eye_line_angle(landmarks);
        if !angle.is_finite() {
            return Err(AlignError::NonFiniteAngle)
        }
        debug!("aligning face by {:.2} degrees", angle.to_degrees());

        // rotate_about_center turns clockwise for positive angles
        let rotated = rotate_about_center(face, -(angle as f32), Interpolation::Bilinear, Rgb([0, 0, 0]));
        Ok(AlignedFace::new(rotated, angle))
    }
}
