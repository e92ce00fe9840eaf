use std::ops::Range;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use crate::error::errors::LandmarkError;

/// Number of points in the 68-point facial landmark scheme.
pub const NUM_LANDMARKS: usize = 68;

pub const JAW: Range<usize> = 0..17;
pub const LEFT_BROW: Range<usize> = 17..22;
pub const RIGHT_BROW: Range<usize> = 22..27;
pub const NOSE: Range<usize> = 27..36;
pub const LEFT_EYE: Range<usize> = 36..42;
pub const RIGHT_EYE: Range<usize> = 42..48;
pub const MOUTH: Range<usize> = 48..68;

pub const JAW_LEFT: usize = 0;
pub const CHIN: usize = 8;
pub const JAW_RIGHT: usize = 16;
pub const NOSE_TIP: usize = 30;

/// Axis aligned box in pixel coordinates, `(x1, y1)` top left and `(x2, y2)` bottom right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        BoundingBox { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

/// A face candidate produced by the detection model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub probability: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, probability: f32) -> Self {
        Detection { bbox, probability }
    }
}

/// The 68 facial keypoints of a single face, in the pixel space of the crop
/// they were predicted on.
#[derive(Debug, Clone, PartialEq)]
pub struct Landmarks {
    points: Vec<Point2<f64>>,
}

impl Landmarks {
    pub fn new(points: Vec<Point2<f64>>) -> Result<Self, LandmarkError> {
        if points.len() != NUM_LANDMARKS {
            return Err(LandmarkError::WrongPointCount { expected: NUM_LANDMARKS, found: points.len() })
        }
        if let Some(index) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(LandmarkError::NonFinite { index })
        }
        Ok(Landmarks { points })
    }

    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn left_eye(&self) -> &[Point2<f64>] {
        &self.points[LEFT_EYE]
    }

    pub fn right_eye(&self) -> &[Point2<f64>] {
        &self.points[RIGHT_EYE]
    }

    pub fn nose_tip(&self) -> Point2<f64> {
        self.points[NOSE_TIP]
    }

    pub fn chin(&self) -> Point2<f64> {
        self.points[CHIN]
    }

    pub fn jaw_left(&self) -> Point2<f64> {
        self.points[JAW_LEFT]
    }

    pub fn jaw_right(&self) -> Point2<f64> {
        self.points[JAW_RIGHT]
    }
}

/// mean_point returns the centroid of the points, or the origin for an empty slice.
pub fn mean_point(points: &[Point2<f64>]) -> Point2<f64> {
    if points.is_empty() {
        return Point2::origin()
    }
    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / points.len() as f64)
}
