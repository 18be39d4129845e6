//! Service traits and wire types.

use async_trait::async_trait;
use revid_models::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::error::MlClientResult;

/// One detection from the object-detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub class_id: u32,
    pub confidence: f32,
}

impl Detection {
    /// Center point of the detection bbox.
    pub fn center(&self) -> (f64, f64) {
        self.bbox.center()
    }

    /// Pixel area of the detection bbox.
    pub fn area(&self) -> f64 {
        self.bbox.area()
    }
}

/// The object-detection service: bbox + class + confidence per frame.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Run detection on a JPEG/PNG-encoded frame.
    async fn detect(&self, frame: &[u8], confidence_threshold: f32) -> MlClientResult<Vec<Detection>>;
}

/// The ReID embedding service: fixed-length appearance vector per crop.
#[async_trait]
pub trait ReidEmbedder: Send + Sync {
    /// Embed a JPEG/PNG-encoded crop. The returned vector is L2-normalized;
    /// the client normalizes if the service did not.
    async fn embed(&self, crop: &[u8]) -> MlClientResult<Vec<f32>>;
}

/// L2-normalize a vector in place. No-op for zero vectors.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity between two L2-normalized vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
