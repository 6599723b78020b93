//! Model seams for face location and embedding extraction.
//!
//! Both models are black boxes with a fixed contract (image region in,
//! fixed-length float vector out); any pretrained model can sit behind
//! these traits without changing the matcher or the pipeline.

use crate::types::{FaceEmbedding, FaceRegion};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds candidate face regions in a canonical RGB image.
pub trait FaceLocator {
    /// Returns zero or more face regions, best detection first.
    fn locate(&mut self, image: &RgbImage) -> Result<Vec<FaceRegion>, ModelError>;
}

/// Produces a fixed-length embedding for one located face region.
pub trait FaceEmbedder {
    /// Returns `Ok(None)` when the model yields no encoding for a region
    /// the locator accepted — the two may disagree internally, and that is
    /// a recoverable per-call condition, not a crash.
    fn embed(
        &mut self,
        image: &RgbImage,
        region: &FaceRegion,
    ) -> Result<Option<FaceEmbedding>, ModelError>;

    /// Fixed embedding length this model produces.
    fn dim(&self) -> usize;
}
