use serde::Serialize;
use crate::modules::face_id_client::Embedding;

pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.85;

/// Outcome of comparing a live embedding with an enrolled one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Verification {
    pub similarity: f64,
    pub matched: bool,
}

/// similarity returns the cosine similarity of two embeddings in `[-1, 1]`.
///
/// Embeddings of different lengths, empty or zero-norm embeddings, and
/// non-finite results all score 0.
pub fn similarity(a: &Embedding, b: &Embedding) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0
    }
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0
    }

    let dot: f64 = a.values().iter()
        .zip(b.values().iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum();
    let score = dot / (norm_a * norm_b);
    if score.is_finite() {
        score.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FaceMatcher {
    threshold: f64,
}

impl FaceMatcher {
    pub fn new(threshold: f64) -> Self {
        FaceMatcher {
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// matches is true when the similarity is strictly above the threshold.
    pub fn matches(&self, a: &Embedding, b: &Embedding) -> bool {
        self.compare(a, b).matched
    }

    pub fn compare(&self, live: &Embedding, enrolled: &Embedding) -> Verification {
        let similarity = similarity(live, enrolled);
        Verification {
            similarity,
            matched: similarity > self.threshold,
        }
    }
}

impl Default for FaceMatcher {
    fn default() -> Self {
        FaceMatcher::new(DEFAULT_MATCH_THRESHOLD)
    }
}
