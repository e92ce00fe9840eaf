//! Deterministic model fakes and synthetic faces shared by the unit tests.

use std::f64::consts::PI;
use std::thread;
use std::time::Duration;
use anyhow::Error;
use image::{GrayImage, Rgb, RgbImage};
use nalgebra::Point2;
use ndarray::{Array4, Axis};
use crate::modules::face_detection_client::FaceDetectionModel;
use crate::modules::face_id_client::EmbeddingModel;
use crate::modules::face_landmark_client::LandmarkModel;
use crate::utils::coordinate::{BoundingBox, Detection, Landmarks, CHIN, JAW, LEFT_EYE, NOSE_TIP, RIGHT_EYE};

pub struct FixedDetector {
    detections: Vec<Detection>,
}

impl FixedDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        FixedDetector { detections }
    }
}

impl FaceDetectionModel for FixedDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, Error> {
        Ok(self.detections.clone())
    }
}

/// Reports one face covering the middle half of the image.
pub struct CenteredDetector;

impl FaceDetectionModel for CenteredDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, Error> {
        let (w, h) = (image.width() as f32, image.height() as f32);
        Ok(vec![Detection::new(BoundingBox::new(w / 4.0, h / 4.0, w * 3.0 / 4.0, h * 3.0 / 4.0), 0.99)])
    }
}

pub struct FailingDetector;

impl FaceDetectionModel for FailingDetector {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<Detection>, Error> {
        Err(Error::msg("detector unavailable"))
    }
}

/// Blocks the calling thread before reporting a centred face.
pub struct SlowDetector {
    delay: Duration,
}

impl SlowDetector {
    pub fn new(delay: Duration) -> Self {
        SlowDetector { delay }
    }
}

impl FaceDetectionModel for SlowDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, Error> {
        thread::sleep(self.delay);
        CenteredDetector.detect(image)
    }
}

/// Returns `template_landmarks` scaled to the input.
pub struct TemplateLandmarks {
    eye_opening: f64,
}

impl TemplateLandmarks {
    pub fn new(eye_opening: f64) -> Self {
        TemplateLandmarks { eye_opening }
    }
}

impl LandmarkModel for TemplateLandmarks {
    fn predict(&self, face: &GrayImage) -> Result<Vec<Point2<f64>>, Error> {
        Ok(template_landmarks(face.width(), face.height(), self.eye_opening).points().to_vec())
    }
}

/// Returns 10 points instead of 68.
pub struct ShortLandmarks;

impl LandmarkModel for ShortLandmarks {
    fn predict(&self, _face: &GrayImage) -> Result<Vec<Point2<f64>>, Error> {
        Ok((0..10).map(|i| Point2::new(i as f64, i as f64)).collect())
    }
}

/// Embeds a face as the mean of each normalized channel.
pub struct ChannelMeanEmbedder;

impl EmbeddingModel for ChannelMeanEmbedder {
    fn infer(&self, tensor: &Array4<f32>) -> Result<Option<Vec<f32>>, Error> {
        let channels = tensor.index_axis(Axis(0), 0);
        let means = channels
            .axis_iter(Axis(0))
            .map(|channel| channel.mean().unwrap_or(0.0))
            .collect();
        Ok(Some(means))
    }
}

pub struct NoFaceEmbedder;

impl EmbeddingModel for NoFaceEmbedder {
    fn infer(&self, _tensor: &Array4<f32>) -> Result<Option<Vec<f32>>, Error> {
        Ok(None)
    }
}

pub struct FixedEmbedder {
    values: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(values: Vec<f32>) -> Self {
        FixedEmbedder { values }
    }
}

impl EmbeddingModel for FixedEmbedder {
    fn infer(&self, _tensor: &Array4<f32>) -> Result<Option<Vec<f32>>, Error> {
        Ok(Some(self.values.clone()))
    }
}

fn noise(x: u32, y: u32) -> u8 {
    let mut v = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77) ^ 0x2545_F491;
    v ^= v << 13;
    v ^= v >> 17;
    v ^= v << 5;
    ((v >> 8) % 128) as u8
}

/// textured_face is grey noise in `[0, 128)` on top of half the tint.
pub fn textured_face(width: u32, height: u32, tint: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let n = noise(x, y);
        Rgb([tint[0] / 2 + n, tint[1] / 2 + n, tint[2] / 2 + n])
    })
}

pub fn flat_face(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// template_landmarks lays out an upright frontal face in a `width x height`
/// crop. Both eyes have an aspect ratio of exactly `eye_opening`.
pub fn template_landmarks(width: u32, height: u32, eye_opening: f64) -> Landmarks {
    let (w, h) = (width as f64, height as f64);
    let mut points = vec![Point2::new(0.5 * w, 0.6 * h); 68];

    for i in JAW {
        let t = i as f64 / 16.0;
        points[i] = Point2::new(0.1 * w + 0.8 * w * t, 0.5 * h + 0.35 * h * (PI * t).sin());
    }
    points[CHIN] = Point2::new(0.5 * w, 0.85 * h);
    points[NOSE_TIP] = Point2::new(0.5 * w, 0.5 * h);

    let a = 0.08 * w;
    let e = eye_opening * a;
    for (range, cx) in [(LEFT_EYE, 0.35 * w), (RIGHT_EYE, 0.65 * w)] {
        let cy = 0.4 * h;
        let eye = [
            (cx - a, cy),
            (cx - a / 2.0, cy - e),
            (cx + a / 2.0, cy - e),
            (cx + a, cy),
            (cx + a / 2.0, cy + e),
            (cx - a / 2.0, cy + e),
        ];
        for (k, (x, y)) in eye.iter().enumerate() {
            points[range.start + k] = Point2::new(*x, *y);
        }
    }

    Landmarks::new(points).unwrap()
}
