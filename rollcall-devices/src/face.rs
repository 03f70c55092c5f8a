use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A point in the face-embedding space produced by the driver's extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Result of asking the camera side for one probe.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceProbe {
    Features(FeatureVector),
    NoFaceDetected,
}

pub trait FaceSource {
    /// Grabs one frame and returns a feature vector for every usable face in it.
    fn detect_faces(&mut self) -> Result<Vec<FeatureVector>>;

    /// One probe for matching. Extra detections in the same frame are ignored.
    fn capture_face_probe(&mut self) -> Result<FaceProbe> {
        let mut faces = self.detect_faces()?;
        if faces.len() > 1 {
            log::debug!("{} faces in frame, using the first", faces.len());
        }
        if faces.is_empty() {
            Ok(FaceProbe::NoFaceDetected)
        } else {
            Ok(FaceProbe::Features(faces.swap_remove(0)))
        }
    }
}

pub fn euclidean_distance(a: &FeatureVector, b: &FeatureVector) -> f32 {
    a.values
        .iter()
        .zip(b.values.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// `1 - cosine similarity`, in `[0, 2]`. Zero-norm vectors are maximally distant.
pub fn cosine_distance(a: &FeatureVector, b: &FeatureVector) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.values.iter().zip(b.values.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return 2.0;
    }
    1.0 - (dot / denom).clamp(-1.0, 1.0)
}
