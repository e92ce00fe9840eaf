use std::f64::consts::PI;
use image::{imageops, GrayImage, RgbImage};
use imageproc::filter::laplacian_filter;
use log::{error, info, warn};
use nalgebra::{distance, Point2};
use ndarray::Array2;
use serde::Serialize;
use crate::config::config::LivenessConfig;
use crate::error::errors::LivenessError;
use crate::utils::coordinate::Landmarks;
use crate::utils::image::gray_to_array;

/// Raw scores of the four liveness heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LivenessReport {
    pub texture_score: f64,
    pub eye_aspect_ratio: f64,
    pub head_pose_valid: bool,
    pub artifact_score: f64,
}

/// Pass or fail of each heuristic against the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessChecks {
    pub texture: bool,
    pub eye: bool,
    pub head_pose: bool,
    pub artifact: bool,
}

impl LivenessChecks {
    /// passing counts the checks that passed. An uncounted head pose check is
    /// always treated as passing.
    pub fn passing(&self, count_head_pose: bool) -> usize {
        let head_pose = !count_head_pose || self.head_pose;
        [self.texture, self.eye, head_pose, self.artifact]
            .iter()
            .filter(|passed| **passed)
            .count()
    }

    /// failed names the checks that failed and are counted.
    pub fn failed(&self, count_head_pose: bool) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if !self.texture {
            failed.push("texture");
        }
        if !self.eye {
            failed.push("eye_ratio");
        }
        if count_head_pose && !self.head_pose {
            failed.push("head_pose");
        }
        if !self.artifact {
            failed.push("artifacts");
        }
        failed
    }
}

#[derive(Clone, Debug)]
pub struct FaceAntiSpoofing {
    config: LivenessConfig,
}

impl FaceAntiSpoofing {
    pub fn new(config: LivenessConfig) -> Self {
        FaceAntiSpoofing {
            config,
        }
    }

    /// evaluate computes the liveness scores of a face crop.
    ///
    /// # Arguments
    /// * `face` - RGB face crop
    /// * `landmarks` - 68 landmarks in the coordinate space of `face`
    ///
    /// # Returns
    /// * `Result<LivenessReport, LivenessError>`
    pub fn evaluate(&self, face: &RgbImage, landmarks: &Landmarks) -> Result<LivenessReport, LivenessError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(LivenessError::EmptyFace)
        }
        let gray = imageops::grayscale(face);

        let texture_score = texture_score(&gray);
        if !texture_score.is_finite() {
            return Err(LivenessError::NonFinite("texture"))
        }

        let left = eye_aspect_ratio(landmarks.left_eye())?;
        let right = eye_aspect_ratio(landmarks.right_eye())?;
        let eye_aspect_ratio = (left + right) / 2.0;
        if !eye_aspect_ratio.is_finite() {
            return Err(LivenessError::NonFinite("eye aspect ratio"))
        }

        let (vertical, horizontal) = head_pose_angles(landmarks);
        let head_pose_valid = vertical < self.config.max_head_angle && horizontal < self.config.max_head_angle;

        let artifact_score = artifact_score(&gray, self.config.artifact_variance_scale);
        if !artifact_score.is_finite() {
            return Err(LivenessError::NonFinite("artifact"))
        }

        info!(
            "liveness scores - texture: {:.4}, eye ratio: {:.4}, head pose valid: {}, artifact: {:.4}",
            texture_score, eye_aspect_ratio, head_pose_valid, artifact_score
        );

        Ok(LivenessReport {
            texture_score,
            eye_aspect_ratio,
            head_pose_valid,
            artifact_score,
        })
    }

    pub fn checks(&self, report: &LivenessReport) -> LivenessChecks {
        LivenessChecks {
            texture: report.texture_score > self.config.texture_threshold,
            eye: report.eye_aspect_ratio > self.config.eye_aspect_ratio_threshold,
            head_pose: report.head_pose_valid,
            artifact: report.artifact_score < self.config.artifact_threshold,
        }
    }

    /// is_live applies the voting rule to a report.
    pub fn is_live(&self, report: &LivenessReport) -> bool {
        let checks = self.checks(report);
        let live = checks.passing(self.config.count_head_pose) >= self.config.min_passing_checks;
        if !live {
            warn!("liveness check failed - possible spoofing attempt");
            warn!("failed checks: {}", checks.failed(self.config.count_head_pose).join(" "));
        }
        live
    }

    /// check evaluates and votes in one step. Any evaluation error counts as
    /// not live.
    pub fn check(&self, face: &RgbImage, landmarks: &Landmarks) -> bool {
        match self.evaluate(face, landmarks) {
            Ok(report) => self.is_live(&report),
            Err(e) => {
                error!("error in liveness detection: {}", e);
                false
            }
        }
    }
}

/// local_binary_pattern computes radius 1, 8 neighbour LBP codes.
///
/// Neighbour `k` sits at angle `2πk/8`, offset `+cos` along rows and `-sin`
/// along columns, sampled bilinearly. Bit `k` is set when the neighbour is
/// brighter than the centre. Border pixels keep code 0.
pub fn local_binary_pattern(gray: &GrayImage) -> Array2<f64> {
    let pixels = gray_to_array(gray);
    let (rows, cols) = pixels.dim();
    let mut codes = Array2::<f64>::zeros((rows, cols));
    if rows < 3 || cols < 3 {
        return codes
    }

    let offsets: Vec<(f64, f64)> = (0..8)
        .map(|k| {
            let angle = 2.0 * PI * k as f64 / 8.0;
            (angle.cos(), -angle.sin())
        })
        .collect();

    for i in 1..rows - 1 {
        for j in 1..cols - 1 {
            let center = pixels[[i, j]];
            let mut pattern = 0u32;
            for (k, (dx, dy)) in offsets.iter().enumerate() {
                let x = i as f64 + dx;
                let y = j as f64 + dy;
                let (x1, x2) = (x.floor() as usize, x.ceil() as usize);
                let (y1, y2) = (y.floor() as usize, y.ceil() as usize);
                let tx = x - x1 as f64;
                let ty = y - y1 as f64;

                let top = pixels[[x1, y1]] + ty * (pixels[[x1, y2]] - pixels[[x1, y1]]);
                let bottom = pixels[[x2, y1]] + ty * (pixels[[x2, y2]] - pixels[[x2, y1]]);
                let neighbour = top + tx * (bottom - top);

                if neighbour > center {
                    pattern |= 1 << k;
                }
            }
            codes[[i, j]] = pattern as f64;
        }
    }
    codes
}

/// texture_score is the population standard deviation of the LBP codes.
pub fn texture_score(gray: &GrayImage) -> f64 {
    local_binary_pattern(gray).std(0.0)
}

/// eye_aspect_ratio of six eye points ordered p1..p6.
pub fn eye_aspect_ratio(eye: &[Point2<f64>]) -> Result<f64, LivenessError> {
    if eye.len() != 6 {
        return Err(LivenessError::DegenerateEye)
    }
    let horizontal = distance(&eye[0], &eye[3]);
    if horizontal <= f64::EPSILON {
        return Err(LivenessError::DegenerateEye)
    }
    let vertical = distance(&eye[1], &eye[5]) + distance(&eye[2], &eye[4]);
    Ok(vertical / (2.0 * horizontal))
}

/// head_pose_angles returns the absolute angles in radians of the nose to chin
/// line and of the jaw line.
pub fn head_pose_angles(landmarks: &Landmarks) -> (f64, f64) {
    let vertical = landmarks.chin() - landmarks.nose_tip();
    let horizontal = landmarks.jaw_right() - landmarks.jaw_left();
    (vertical.y.atan2(vertical.x).abs(), horizontal.y.atan2(horizontal.x).abs())
}

/// artifact_score is the variance of the Laplacian response divided by `scale`,
/// clamped to `[0, 1]`.
///
/// Borders are handled by replicating edge pixels, and the variance is taken
/// over every pixel of the response.
pub fn artifact_score(gray: &GrayImage, scale: f64) -> f64 {
    if gray.width() == 0 || gray.height() == 0 {
        return 0.0
    }
    let response = laplacian_filter(gray);
    let n = response.pixels().count() as f64;
    let mean = response.pixels().map(|p| p[0] as f64).sum::<f64>() / n;
    let variance = response.pixels().map(|p| (p[0] as f64 - mean).powi(2)).sum::<f64>() / n;
    (variance / scale).clamp(0.0, 1.0)
}
