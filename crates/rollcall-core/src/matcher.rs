//! Embedding comparison and accept/reject policy.
//!
//! A verification failure must never be mistaken for a system crash by the
//! caller, so `compare` never fails: malformed input degrades to a safe
//! no-match with a diagnostic instead of an error.

use crate::types::{FaceEmbedding, MatchResult};

/// Empirical operating point for the 128-dim embedding space in use.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Euclidean-distance matcher over encoder embeddings.
///
/// Holds the deployment threshold as an explicit value passed in at
/// startup; there is no per-call threshold in the common path.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    threshold: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Compare a candidate embedding against a stored reference.
    ///
    /// `distance` is the Euclidean norm of the element-wise difference,
    /// `similarity = max(0, 1 - distance)` (saturating so it stays
    /// interpretable as "degree of match"), and the decision is
    /// `distance <= threshold`.
    pub fn compare(&self, reference: &FaceEmbedding, candidate: &FaceEmbedding) -> MatchResult {
        // Both embeddings originate from the same encoder, so a length
        // mismatch is a programming error rather than a runtime rejection
        // path; it still degrades to the safe no-match below.
        if let Some(diagnostic) = Self::validate(reference, candidate) {
            tracing::warn!(diagnostic, "matcher received malformed embeddings; returning no-match");
            return self.no_match(diagnostic);
        }

        let distance = reference.euclidean_distance(candidate);
        let similarity = (1.0 - distance).max(0.0);
        let is_match = distance <= self.threshold;

        tracing::debug!(
            distance,
            similarity,
            threshold = self.threshold,
            is_match,
            "embedding comparison"
        );

        MatchResult {
            is_match,
            similarity,
            distance,
            threshold: self.threshold,
            diagnostic: None,
        }
    }

    fn validate(reference: &FaceEmbedding, candidate: &FaceEmbedding) -> Option<String> {
        if !reference.is_well_formed() {
            return Some("reference embedding is empty or non-finite".into());
        }
        if !candidate.is_well_formed() {
            return Some("candidate embedding is empty or non-finite".into());
        }
        if reference.dim() != candidate.dim() {
            return Some(format!(
                "embedding dimension mismatch: reference {} vs candidate {}",
                reference.dim(),
                candidate.dim()
            ));
        }
        None
    }

    fn no_match(&self, diagnostic: String) -> MatchResult {
        MatchResult {
            is_match: false,
            similarity: 0.0,
            distance: 1.0,
            threshold: self.threshold,
            diagnostic: Some(diagnostic),
        }
    }
}
