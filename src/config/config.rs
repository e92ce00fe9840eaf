use std::f64::consts::FRAC_PI_4;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceDetectionConfig {
    /// Fraction of the box width added on every side of the selected face.
    pub margin_ratio: f32,
}

impl FaceDetectionConfig {
    pub fn new() -> Self {
        FaceDetectionConfig {
            margin_ratio: 0.2,
        }
    }
}

impl Default for FaceDetectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LandmarkConfig {
    pub min_face_size: u32,
}

impl LandmarkConfig {
    pub fn new() -> Self {
        LandmarkConfig {
            min_face_size: 8,
        }
    }
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LivenessConfig {
    pub texture_threshold: f64,
    pub eye_aspect_ratio_threshold: f64,
    /// Radians, applied to both the vertical and the horizontal head angle.
    pub max_head_angle: f64,
    pub artifact_variance_scale: f64,
    pub artifact_threshold: f64,
    pub min_passing_checks: usize,
    /// When false the head pose check is reported but always counted as passing.
    pub count_head_pose: bool,
}

impl LivenessConfig {
    pub fn new() -> Self {
        LivenessConfig {
            texture_threshold: 25.0,
            eye_aspect_ratio_threshold: 0.15,
            max_head_angle: FRAC_PI_4,
            artifact_variance_scale: 500.0,
            artifact_threshold: 0.85,
            min_passing_checks: 3,
            count_head_pose: false,
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FaceIDConfig {
    pub model_name: String,
    pub mean: f32,
    pub scale: f32,
    pub imsize: (u32, u32),
    /// Expected embedding length, `0` accepts whatever the model returns.
    pub embedding_size: usize,
    pub threshold_same_person: f64,
}

impl FaceIDConfig {
    pub fn new() -> Self {
        FaceIDConfig {
            model_name: "facenet-vggface2".to_string(),
            mean: 127.5,
            scale: 0.0078125,
            imsize: (160, 160),
            embedding_size: 512,
            threshold_same_person: 0.85,
        }
    }
}

impl Default for FaceIDConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
}

impl StoreConfig {
    pub fn new() -> Self {
        StoreConfig {
            root: PathBuf::from("face_data"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
