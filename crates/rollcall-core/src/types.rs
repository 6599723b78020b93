use serde::{Deserialize, Serialize};

/// One detected face within an image, as pixel offsets from the image
/// edges: (top, right, bottom, left).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Face area in pixels.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// True when the region encloses no pixels.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Fixed-length face embedding in a metric space where Euclidean distance
/// approximates dissimilarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEmbedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "face_resnet_128").
    pub model_version: Option<String>,
}

impl FaceEmbedding {
    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &FaceEmbedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// True when the vector is non-empty and every component is finite.
    pub fn is_well_formed(&self) -> bool {
        !self.values.is_empty() && self.values.iter().all(|v| v.is_finite())
    }
}

/// Outcome of comparing a candidate embedding against a stored reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub is_match: bool,
    /// Degree of match in [0, 1]; saturates at 0 for distances beyond 1.
    pub similarity: f32,
    pub distance: f32,
    /// Threshold the decision was taken against.
    pub threshold: f32,
    /// Present when the matcher fell back to a safe no-match on malformed
    /// input rather than failing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_dimensions() {
        let r = FaceRegion { top: 10, right: 110, bottom: 90, left: 30 };
        assert_eq!(r.width(), 80);
        assert_eq!(r.height(), 80);
        assert_eq!(r.area(), 6400);
        assert!(!r.is_degenerate());
    }

    #[test]
    fn test_region_degenerate() {
        let r = FaceRegion { top: 10, right: 30, bottom: 10, left: 30 };
        assert!(r.is_degenerate());
        assert_eq!(r.area(), 0);
    }

    #[test]
    fn test_region_inverted_offsets_saturate() {
        // right < left must not underflow
        let r = FaceRegion { top: 0, right: 5, bottom: 10, left: 20 };
        assert_eq!(r.width(), 0);
        assert!(r.is_degenerate());
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let e = FaceEmbedding { values: vec![0.5; 128], model_version: None };
        assert_eq!(e.euclidean_distance(&e), 0.0);
    }

    #[test]
    fn test_euclidean_distance_unit_apart() {
        let a = FaceEmbedding { values: vec![0.0, 0.0], model_version: None };
        let b = FaceEmbedding { values: vec![0.6, 0.8], model_version: None };
        assert!((a.euclidean_distance(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_well_formed() {
        let ok = FaceEmbedding { values: vec![1.0, -2.0], model_version: None };
        assert!(ok.is_well_formed());

        let empty = FaceEmbedding { values: vec![], model_version: None };
        assert!(!empty.is_well_formed());

        let nan = FaceEmbedding { values: vec![1.0, f32::NAN], model_version: None };
        assert!(!nan.is_well_formed());
    }
}
